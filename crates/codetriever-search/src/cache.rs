//! QueryCache (spec §4.13): context-keyed LRU+TTL cache, scope-partitioned
//! for the orchestrator's context-consistency gate (spec §4.14).

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

/// `H(scope_id || mode || lower(trim(query)) || index_revision ||
/// engine_config_hash || [sources_digest])`, truncated to the first 16 hex
/// characters (spec §4.13).
#[must_use]
pub fn cache_key(
    scope_id: &str,
    mode: &str,
    query: &str,
    index_revision: &str,
    engine_config_hash: &str,
    sources_digest: Option<&str>,
) -> String {
    let normalized_query = query.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(scope_id.as_bytes());
    hasher.update(b"|");
    hasher.update(mode.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_query.as_bytes());
    hasher.update(b"|");
    hasher.update(index_revision.as_bytes());
    hasher.update(b"|");
    hasher.update(engine_config_hash.as_bytes());
    if let Some(digest) = sources_digest {
        hasher.update(b"|");
        hasher.update(digest.as_bytes());
    }
    hasher.finalize().iter().take(8).map(|b| format!("{b:02x}")).collect()
}

struct Entry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
    scope_id: String,
}

/// LRU-evicted, per-entry-TTL cache keyed by [`cache_key`]. Generic over the
/// stored value so the orchestrator can cache its own response type without
/// this crate needing to know its shape.
///
/// `cache_key` already folds `index_revision` into the key, so an LRU hit can
/// never itself carry a stale revision for the request that produced the
/// key — a mismatch can only be observed by comparing the *request's* claimed
/// revision against the last one actually seen for the scope, independent of
/// whether this particular key is a hit or a miss. `known_revisions` is that
/// side index (spec §4.14's context-consistency gate).
pub struct QueryCache<T: Clone> {
    inner: Mutex<LruCache<String, Entry<T>>>,
    known_revisions: Mutex<HashMap<String, String>>,
}

impl<T: Clone> QueryCache<T> {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        #[allow(clippy::expect_used)] // max_size is an engine config invariant, not user input
        let capacity = NonZeroUsize::new(max_size).expect("cache.max_size must be greater than zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            known_revisions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live (non-expired) entry, evicting it if its TTL has elapsed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        #[allow(clippy::expect_used)] // lock is held briefly, never across an await point
        let mut inner = self.inner.lock().expect("query cache mutex poisoned");
        let expired = matches!(inner.peek(key), Some(entry) if entry.inserted_at.elapsed() > entry.ttl);
        if expired {
            inner.pop(key);
            return None;
        }
        inner.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, unless `confidence` is below `min_confidence`
    /// (spec §4.13: "entries with confidence < 0.3 are not stored").
    pub fn put(&self, key: String, value: T, scope_id: &str, ttl: Duration, confidence: f64, min_confidence: f64) {
        if confidence < min_confidence {
            return;
        }
        #[allow(clippy::expect_used)] // lock is held briefly, never across an await point
        let mut inner = self.inner.lock().expect("query cache mutex poisoned");
        inner.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                scope_id: scope_id.to_string(),
            },
        );
    }

    /// Evict every entry belonging to `scope_id`. Called by the orchestrator
    /// on a context-consistency mismatch (spec §4.14).
    pub fn invalidate_scope(&self, scope_id: &str) {
        #[allow(clippy::expect_used)] // lock is held briefly, never across an await point
        let mut inner = self.inner.lock().expect("query cache mutex poisoned");
        let stale: Vec<String> = inner
            .iter()
            .filter(|(_, entry)| entry.scope_id == scope_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            inner.pop(&key);
        }
    }

    /// Number of live entries belonging to `scope_id`, used by tests and
    /// telemetry to assert cache-size invariants after invalidation.
    #[must_use]
    pub fn scope_size(&self, scope_id: &str) -> usize {
        #[allow(clippy::expect_used)] // lock is held briefly, never across an await point
        let inner = self.inner.lock().expect("query cache mutex poisoned");
        inner.iter().filter(|(_, entry)| entry.scope_id == scope_id).count()
    }

    /// Record the `index_revision` a request claims for `scope_id`, and
    /// report the previously recorded one if it differs. Checked on *every*
    /// query — cache-hit or miss — so the context-consistency gate can
    /// actually fire: since `cache_key` already embeds `index_revision`, a
    /// keyed lookup alone can never disagree with its own key, but the scope
    /// can still have moved on to a new revision that this particular
    /// request hasn't heard about yet (spec §8 Scenario 1).
    pub fn observe_revision(&self, scope_id: &str, index_revision: &str) -> Option<String> {
        #[allow(clippy::expect_used)] // lock is held briefly, never across an await point
        let mut known = self.known_revisions.lock().expect("query cache mutex poisoned");
        match known.insert(scope_id.to_string(), index_revision.to_string()) {
            Some(previous) if previous != index_revision => Some(previous),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn cache_key_is_stable_and_16_hex_chars() {
        let key = cache_key("core", "instant", "  What Is X  ", "rev-1", "cfg-1", Some("src-1"));
        assert_eq!(key.len(), 16);
        assert_eq!(key, cache_key("core", "instant", "what is x", "rev-1", "cfg-1", Some("src-1")));
    }

    #[test]
    fn cache_key_differs_on_index_revision() {
        let a = cache_key("core", "instant", "q", "rev-1", "cfg-1", None);
        let b = cache_key("core", "instant", "q", "rev-2", "cfg-1", None);
        assert_ne!(a, b);
    }

    #[test]
    fn low_confidence_entries_are_not_stored() {
        let cache: QueryCache<String> = QueryCache::new(10);
        cache.put("k".to_string(), "v".to_string(), "core", Duration::from_secs(60), 0.29, 0.3);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: QueryCache<String> = QueryCache::new(10);
        cache.put("k".to_string(), "v".to_string(), "core", Duration::from_millis(1), 0.9, 0.3);
        sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn observe_revision_is_silent_on_first_sighting_and_on_repeats() {
        let cache: QueryCache<String> = QueryCache::new(10);
        assert_eq!(cache.observe_revision("core", "rev-1"), None);
        assert_eq!(cache.observe_revision("core", "rev-1"), None);
    }

    #[test]
    fn observe_revision_reports_the_previous_revision_on_change() {
        let cache: QueryCache<String> = QueryCache::new(10);
        cache.observe_revision("core", "rev-1");
        assert_eq!(cache.observe_revision("core", "rev-2"), Some("rev-1".to_string()));
        // The new revision is now the recorded one.
        assert_eq!(cache.observe_revision("core", "rev-2"), None);
    }

    #[test]
    fn invalidate_scope_clears_only_that_scope() {
        let cache: QueryCache<String> = QueryCache::new(10);
        cache.put("a".to_string(), "va".to_string(), "core", Duration::from_secs(60), 0.9, 0.3);
        cache.put("b".to_string(), "vb".to_string(), "other", Duration::from_secs(60), 0.9, 0.3);
        cache.invalidate_scope("core");
        assert_eq!(cache.scope_size("core"), 0);
        assert_eq!(cache.scope_size("other"), 1);
    }
}
