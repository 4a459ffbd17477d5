//! Parallel Chunking stage (C8 stage 3): drive the right [`Chunker`] for
//! each filtered file through the [`MemoryAwareQueue`], continuing past
//! per-file errors up to a configured budget (spec §4.3).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use codetriever_parsing::chunker::ChunkerRegistry;
use codetriever_vector_data::chunk::{Chunk, ChunkKind, ChunkMetadata, Span, generate_chunk_id};
use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::{IndexerError, IndexerResult};
use crate::filtering::FilteredFile;
use crate::memory::MemoryAwareQueue;

const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "ini", "cfg"];

fn infer_kind(path: &str, language: Option<&str>) -> ChunkKind {
    let lower = path.to_lowercase();
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    if ext == "md" || ext == "markdown" || ext == "mdx" || ext == "rst" || ext == "adoc" {
        if lower.contains("/adr/") || lower.contains("/decisions/") {
            return ChunkKind::Adr;
        }
        return ChunkKind::Docs;
    }
    if CONFIG_EXTENSIONS.contains(&ext.as_str()) {
        return ChunkKind::Config;
    }
    if lower.contains("test") || lower.contains("spec.") || lower.contains("_spec") {
        return ChunkKind::Test;
    }
    if language.is_some() {
        return ChunkKind::Code;
    }
    ChunkKind::Other
}

/// Chunk one file, tagging every chunk with shared per-file metadata
/// (`file_hash`, `file_mtime`, `index_revision`).
///
/// Errors from a single file are returned to the caller rather than
/// panicking, so the pipeline can account them against `max_errors` and keep
/// going.
fn chunk_one_file(
    registry: &ChunkerRegistry,
    file: &FilteredFile,
    index_revision: &str,
    indexed_at: chrono::DateTime<Utc>,
) -> IndexerResult<Vec<Chunk>> {
    let ext = Path::new(&file.path).extension().and_then(|e| e.to_str()).unwrap_or_default();
    let chunker = registry.select(&file.path, file.size, ext)?;

    let language = codetriever_parsing::parsing::get_language_from_extension(
        &ext.trim_start_matches('.').to_lowercase(),
    );
    let kind = infer_kind(&file.path, language);

    let mut chunks = Vec::new();
    for (index, span) in chunker.stream(&file.path, &file.content).enumerate() {
        let span = span?;
        if span.text.trim().is_empty() {
            continue;
        }

        let mut metadata = ChunkMetadata::new(
            kind,
            language.map(str::to_string),
            file.hash.clone(),
            file.mtime,
            index_revision.to_string(),
            indexed_at,
        );
        if kind == ChunkKind::Docs || kind == ChunkKind::Adr {
            metadata.doc_id = Some(file.path.clone());
            if let Some(title) = span.metadata.get("doc_title") {
                metadata.doc_title = Some(title.clone());
            }
            if let Some(section) = span.metadata.get("doc_section_path") {
                metadata.doc_section_path = Some(section.clone());
            }
            if let Some(topic) = span.metadata.get("topic_key") {
                metadata.topic_key = Some(topic.clone());
            }
        }
        metadata.extra.insert("chunk_kind_label".to_string(), span.kind.clone().into());
        if let Some(name) = &span.name {
            metadata.extra.insert("name".to_string(), name.clone().into());
        }

        let line_span = Span::new(span.start_line, span.end_line);
        let chunk_id = generate_chunk_id(&file.path, &file.path, line_span, index);

        chunks.push(Chunk {
            chunk_id,
            scope_id: String::new(), // filled in by the caller, which knows the scope
            source_id: file.path.clone(),
            path: file.path.clone(),
            span: line_span,
            text: span.text,
            score: 0.0,
            metadata,
            embedding: Vec::new(),
        });
    }

    Ok(chunks)
}

/// Memory-byte estimate for admission: chunking holds the whole file's
/// content plus its chunked output in memory at once.
fn estimate_bytes(file: &FilteredFile) -> u64 {
    (file.content.len() as u64).saturating_mul(2).max(1024)
}

/// Chunk every filtered file, bounded by the memory-aware queue's admission
/// policy, continuing past per-file errors until `max_errors` is exceeded.
///
/// # Errors
/// Returns [`IndexerError::TooManyErrors`] once accumulated per-file errors
/// exceed `max_errors`.
pub async fn chunk_files(
    registry: Arc<ChunkerRegistry>,
    queue: MemoryAwareQueue,
    files: Vec<FilteredFile>,
    scope_id: &str,
    index_revision: &str,
    max_errors: usize,
) -> IndexerResult<(Vec<Chunk>, Vec<(String, String)>)> {
    let indexed_at = Utc::now();
    let mut tasks = FuturesUnordered::new();

    for file in files {
        let registry = Arc::clone(&registry);
        let queue = queue.clone();
        let index_revision = index_revision.to_string();
        tasks.push(tokio::spawn(async move {
            let permit = queue.admit(estimate_bytes(&file)).await;
            let result = chunk_one_file(&registry, &file, &index_revision, indexed_at);
            drop(permit);
            (file.path, result)
        }));
    }

    let mut all_chunks = Vec::new();
    let mut errors = Vec::new();

    while let Some(joined) = tasks.next().await {
        let (path, result) = joined.map_err(|e| IndexerError::Other(e.to_string()))?;
        match result {
            Ok(mut chunks) => {
                for chunk in &mut chunks {
                    chunk.scope_id = scope_id.to_string();
                }
                all_chunks.extend(chunks);
            }
            Err(e) => {
                errors.push((path, e.to_string()));
                if errors.len() > max_errors {
                    return Err(IndexerError::TooManyErrors(errors.len()));
                }
            }
        }
    }

    Ok((all_chunks, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMonitor;
    use chrono::DateTime;
    use codetriever_config::MemoryConfig;

    fn mem_config() -> MemoryConfig {
        MemoryConfig {
            safe_threshold: 0.9,
            reserve_mb: 0,
            heap_limit_mb: 4096,
            min_concurrency: 4,
            check_interval_ms: 5,
        }
    }

    fn filtered(path: &str, content: &str) -> FilteredFile {
        FilteredFile {
            path: path.to_string(),
            content: content.to_string(),
            mtime: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            size: content.len() as u64,
            hash: "h".to_string(),
            state: codetriever_meta_data::FileState::New,
        }
    }

    #[tokio::test]
    async fn chunks_multiple_files_and_tags_scope() {
        let registry = Arc::new(ChunkerRegistry::default());
        let monitor = Arc::new(MemoryMonitor::from_config(&mem_config()));
        let queue = MemoryAwareQueue::new(monitor, &mem_config());

        let files = vec![
            filtered("a.rs", "fn a() {}\nfn b() {}\n"),
            filtered("README.md", "# Title\ncontent\n"),
        ];

        let (chunks, errors) =
            chunk_files(registry, queue, files, "scope-1", "rev-1", 100).await.unwrap();
        assert!(errors.is_empty());
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.scope_id == "scope-1"));
    }

    #[test]
    fn infer_kind_detects_docs_and_config_and_tests() {
        assert_eq!(infer_kind("README.md", None), ChunkKind::Docs);
        assert_eq!(infer_kind("config.yaml", None), ChunkKind::Config);
        assert_eq!(infer_kind("src/foo_test.rs", Some("rust")), ChunkKind::Test);
        assert_eq!(infer_kind("src/foo.rs", Some("rust")), ChunkKind::Code);
        assert_eq!(infer_kind("docs/adr/0001-x.md", None), ChunkKind::Adr);
    }
}
