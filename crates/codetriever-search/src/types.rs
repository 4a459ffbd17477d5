//! Shared request/response vocabulary for the query engine (C9–C16):
//! the orchestration mode, the context-consistency envelope every request
//! carries (spec §4.14), and the retrieval telemetry the gatherer emits
//! and the orchestrator independently re-derives `index_revision` and
//! `engine_config_hash` for, rather than trusting the caller's claim.

use codetriever_meta_data::StalenessLevel;

/// The three response modes described in spec §4.14, each with its own
/// decomposition depth, completeness strategy, and cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    Instant,
    Auto,
    Thinking,
}

impl QueryMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Auto => "auto",
            Self::Thinking => "thinking",
        }
    }

    /// Maximum sub-queries the decomposer may return for this mode
    /// (instant never decomposes).
    #[must_use]
    pub fn max_subqueries(self, auto_max: usize, thinking_max: usize) -> usize {
        match self {
            Self::Instant => 1,
            Self::Auto => auto_max,
            Self::Thinking => thinking_max,
        }
    }

    /// Evidence-guarantee top-k (spec §4.9).
    #[must_use]
    pub fn evidence_top_k(self, auto_k: usize, thinking_k: usize) -> usize {
        match self {
            Self::Instant | Self::Auto => auto_k,
            Self::Thinking => thinking_k,
        }
    }
}

/// The context-consistency envelope every request carries (spec §4.14).
/// The orchestrator checks `index_revision` and `engine_config_hash`
/// against telemetry it derives independently from what was actually
/// retrieved — on a cache hit via a side index keyed on `scope_id` alone
/// (a keyed hit can't disagree with its own key, since [`cache_key`] folds
/// these fields in), and on a fresh gather via the chunks and config the
/// orchestrator itself read. `sources_digest` is carried through as-is:
/// the query engine has no independent way to re-derive it, so a mismatch
/// there is only ever caught by the cache key missing outright.
///
/// [`cache_key`]: crate::cache::cache_key
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub scope_id: String,
    pub index_revision: String,
    pub engine_config_hash: String,
    pub sources_digest: Option<String>,
}

/// Per-request telemetry aggregated across every sub-query's gather (spec
/// §4.9's aggregation rules: worst staleness wins, freshness/fail_closed
/// are OR'd, counters summed, confidence floor is the minimum observed).
#[derive(Debug, Clone)]
pub struct RetrievalTelemetry {
    /// Majority `index_revision` among the retrieved chunks, not the
    /// request's claimed revision — this is what the orchestrator checks
    /// the request against.
    pub index_revision: String,
    /// The orchestrator's own live `EngineConfig::engine_config_hash()`,
    /// not the request's claimed hash.
    pub engine_config_hash: String,
    /// Carried from the request context; the query engine has no
    /// independent source to re-derive this against.
    pub sources_digest: String,
    pub staleness: StalenessLevel,
    pub freshness_applied: bool,
    pub boosted_count: usize,
    pub conflict_count: usize,
    pub confidence_floor: f64,
    pub fail_closed: bool,
}

impl RetrievalTelemetry {
    /// Merge `other` into `self` per spec §4.9's aggregation rules.
    pub fn absorb(&mut self, other: &Self) {
        self.staleness = self.staleness.worst(other.staleness);
        self.freshness_applied |= other.freshness_applied;
        self.boosted_count += other.boosted_count;
        self.conflict_count += other.conflict_count;
        self.confidence_floor = self.confidence_floor.min(other.confidence_floor);
        self.fail_closed |= other.fail_closed;
    }
}
