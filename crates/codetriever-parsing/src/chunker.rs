//! `ChunkerRegistry`: select a chunker per file and stream semantic chunks
//!
//! Dispatches on file extension: tree-sitter-backed languages go through
//! [`CodeChunker`], markdown/docs extensions go through the heading-aware
//! [`DocsChunker`], and everything else falls back to a plain line-window
//! [`FallbackChunker`]. All three sit behind the [`Chunker`] trait object so
//! new languages can be added without touching callers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ParsingResult;
use crate::error::ParsingError;
use crate::parsing::code_parser::CodeParser;
use crate::parsing::languages::{get_language_config, get_language_from_extension};

/// Maximum file size this registry will read before rejecting it outright.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// A span of source text produced by a chunker, with enough metadata for the
/// indexing pipeline to turn it into a storable chunk.
#[derive(Debug, Clone)]
pub struct ChunkedSpan {
    /// 1-indexed start line
    pub start_line: usize,
    /// 1-indexed end line (inclusive)
    pub end_line: usize,
    /// The chunk's text content
    pub text: String,
    /// Semantic kind, e.g. "function", "class", "heading", "lines"
    pub kind: String,
    /// Optional identifier (function/class/heading name)
    pub name: Option<String>,
    /// Open metadata map; docs chunkers populate doc_id/doc_title/doc_section_path/topic_key
    pub metadata: HashMap<String, String>,
}

/// Trait implemented by every chunking strategy.
///
/// `stream` returns a lazy iterator rather than a materialized `Vec` so
/// line-window chunkers never have to hold the whole file's chunk set in
/// memory at once; tree-sitter-backed chunkers still need a full AST parse
/// internally (tree-sitter has no incremental/streaming parse API we use
/// here), so they rely on the registry's size gate to bound that cost.
pub trait Chunker: Send + Sync {
    /// Name of this chunking strategy, for logging/diagnostics
    fn name(&self) -> &str;

    /// Stream chunks for the given file content
    fn stream<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = ParsingResult<ChunkedSpan>> + 'a>;
}

/// Tree-sitter/heuristic chunker for source code, backed by [`CodeParser`]
pub struct CodeChunker {
    parser: CodeParser,
    language: String,
}

impl CodeChunker {
    /// Create a code chunker for the given language, with a token budget
    /// matching the caller's embedding model limits.
    pub fn new(language: &str, max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            parser: CodeParser::new(None, true, max_tokens, overlap_tokens),
            language: language.to_string(),
        }
    }
}

impl Chunker for CodeChunker {
    fn name(&self) -> &str {
        "code"
    }

    fn stream<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = ParsingResult<ChunkedSpan>> + 'a> {
        let result = self.parser.parse(content, &self.language, path);
        let spans: Vec<ParsingResult<ChunkedSpan>> = match result {
            Ok(chunks) => chunks
                .into_iter()
                .map(|c| {
                    Ok(ChunkedSpan {
                        start_line: c.start_line,
                        end_line: c.end_line,
                        text: c.content,
                        kind: c.kind.unwrap_or_else(|| "code".to_string()),
                        name: c.name,
                        metadata: HashMap::new(),
                    })
                })
                .collect(),
            Err(e) => vec![Err(e)],
        };
        Box::new(spans.into_iter())
    }
}

/// Plain line-window chunker used for extensions with no language config
pub struct FallbackChunker {
    max_lines: usize,
    min_lines: usize,
    overlap_lines: usize,
}

impl FallbackChunker {
    /// Create a fallback chunker from explicit line-window parameters
    pub fn new(max_lines: usize, overlap_lines: usize) -> Self {
        Self {
            max_lines,
            min_lines: max_lines / 4,
            overlap_lines,
        }
    }

    /// Fallback chunker for source-ish content: 120 line windows, 20 line overlap
    pub fn code_default() -> Self {
        Self::new(120, 20)
    }

    /// Fallback chunker for prose-ish content: 80 line windows, 20 line overlap
    pub fn docs_default() -> Self {
        Self::new(80, 20)
    }
}

impl Chunker for FallbackChunker {
    fn name(&self) -> &str {
        "fallback"
    }

    fn stream<'a>(
        &'a self,
        _path: &'a str,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = ParsingResult<ChunkedSpan>> + 'a> {
        Box::new(LineWindowIter {
            lines: content.lines().collect(),
            pos: 0,
            max_lines: self.max_lines,
            min_lines: self.min_lines,
            overlap_lines: self.overlap_lines,
            done: false,
        })
    }
}

struct LineWindowIter<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    max_lines: usize,
    min_lines: usize,
    overlap_lines: usize,
    done: bool,
}

impl Iterator for LineWindowIter<'_> {
    type Item = ParsingResult<ChunkedSpan>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.lines.len() {
            return None;
        }

        let remaining = self.lines.len() - self.pos;
        // Avoid leaving a trailing sliver smaller than min_lines by folding
        // it into the current window when there's nothing left to overlap into.
        let window_len = if remaining <= self.max_lines {
            remaining
        } else if remaining - self.max_lines < self.min_lines {
            remaining
        } else {
            self.max_lines
        };

        let start = self.pos;
        let end = start + window_len;
        let text = self.lines[start..end].join("\n");

        let start_line = start + 1;
        let end_line = end;

        let next_pos = end.saturating_sub(self.overlap_lines);
        if next_pos <= self.pos || end >= self.lines.len() {
            self.done = true;
        } else {
            self.pos = next_pos;
        }

        Some(Ok(ChunkedSpan {
            start_line,
            end_line,
            text,
            kind: "lines".to_string(),
            name: None,
            metadata: HashMap::new(),
        }))
    }
}

/// Heading-aware chunker for markdown/docs content
pub struct DocsChunker {
    doc_id: String,
}

impl DocsChunker {
    /// Create a docs chunker; `doc_id` is typically the file's normalized path
    pub fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
        }
    }

    fn heading_level(line: &str) -> Option<(usize, &str)> {
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if hashes == 0 || hashes > 6 {
            return None;
        }
        let rest = trimmed[hashes..].trim_start();
        if rest.is_empty() {
            return None;
        }
        Some((hashes, rest))
    }

    fn topic_key(section_path: &str) -> String {
        section_path
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl Chunker for DocsChunker {
    fn name(&self) -> &str {
        "docs"
    }

    fn stream<'a>(
        &'a self,
        _path: &'a str,
        content: &'a str,
    ) -> Box<dyn Iterator<Item = ParsingResult<ChunkedSpan>> + 'a> {
        let lines: Vec<&str> = content.lines().collect();
        let mut spans = Vec::new();
        let mut heading_stack: Vec<(usize, String)> = Vec::new();
        let mut doc_title: Option<String> = None;

        let mut section_start = 0usize;
        let mut section_lines: Vec<&str> = Vec::new();

        let flush = |start: usize,
                     end: usize,
                     body: &[&str],
                     heading_stack: &[(usize, String)],
                     doc_title: &Option<String>,
                     doc_id: &str,
                     spans: &mut Vec<ParsingResult<ChunkedSpan>>| {
            if body.is_empty() {
                return;
            }
            let section_path = heading_stack
                .iter()
                .map(|(_, title)| title.as_str())
                .collect::<Vec<_>>()
                .join(" > ");
            let section_name = heading_stack.last().map(|(_, t)| t.clone());

            let mut metadata = HashMap::new();
            metadata.insert("doc_id".to_string(), doc_id.to_string());
            if let Some(title) = doc_title {
                metadata.insert("doc_title".to_string(), title.clone());
            }
            metadata.insert("doc_section_path".to_string(), section_path.clone());
            metadata.insert("topic_key".to_string(), Self::topic_key(&section_path));

            spans.push(Ok(ChunkedSpan {
                start_line: start + 1,
                end_line: end,
                text: body.join("\n"),
                kind: "heading".to_string(),
                name: section_name,
                metadata,
            }));
        };

        for (i, line) in lines.iter().enumerate() {
            if let Some((level, title)) = Self::heading_level(line) {
                flush(
                    section_start,
                    i,
                    &section_lines,
                    &heading_stack,
                    &doc_title,
                    &self.doc_id,
                    &mut spans,
                );
                section_lines.clear();
                section_start = i;

                if doc_title.is_none() && level == 1 {
                    doc_title = Some(title.to_string());
                }

                heading_stack.retain(|(l, _)| *l < level);
                heading_stack.push((level, title.to_string()));
            }
            section_lines.push(*line);
        }

        flush(
            section_start,
            lines.len(),
            &section_lines,
            &heading_stack,
            &doc_title,
            &self.doc_id,
            &mut spans,
        );

        if spans.is_empty() && !content.is_empty() {
            let mut metadata = HashMap::new();
            metadata.insert("doc_id".to_string(), self.doc_id.clone());
            spans.push(Ok(ChunkedSpan {
                start_line: 1,
                end_line: lines.len().max(1),
                text: content.to_string(),
                kind: "heading".to_string(),
                name: None,
                metadata,
            }));
        }

        Box::new(spans.into_iter())
    }
}

const DOCS_EXTENSIONS: &[&str] = &["md", "markdown", "mdx", "rst", "adoc"];

/// Selects and dispatches to the right [`Chunker`] for a file.
pub struct ChunkerRegistry {
    max_tokens: usize,
    overlap_tokens: usize,
    max_lines_code: usize,
    max_lines_docs: usize,
    overlap_lines: usize,
}

impl Default for ChunkerRegistry {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 128,
            max_lines_code: 120,
            max_lines_docs: 80,
            overlap_lines: 20,
        }
    }
}

impl ChunkerRegistry {
    /// Create a registry with explicit tunables, typically sourced from
    /// `EngineConfig::chunking` and `EngineConfig::embedding`.
    pub fn new(
        max_tokens: usize,
        overlap_tokens: usize,
        max_lines_code: usize,
        max_lines_docs: usize,
        overlap_lines: usize,
    ) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
            max_lines_code,
            max_lines_docs,
            overlap_lines,
        }
    }

    /// Reject files that are too large to chunk at all.
    ///
    /// # Errors
    /// Returns [`ParsingError::ChunkingError`] if `size` exceeds [`MAX_FILE_BYTES`].
    pub fn check_size(&self, size: u64) -> ParsingResult<()> {
        if size > MAX_FILE_BYTES {
            return Err(ParsingError::chunking_error(format!(
                "file size {size} bytes exceeds the {MAX_FILE_BYTES} byte safety limit"
            )));
        }
        Ok(())
    }

    /// If loaded content exceeds the safety limit (e.g. a file that grew
    /// between stat and read), truncate it and let the caller log a warning.
    pub fn truncate_if_oversized(&self, content: String) -> (String, bool) {
        if content.len() as u64 <= MAX_FILE_BYTES {
            return (content, false);
        }
        let mut truncated = content;
        truncated.truncate(MAX_FILE_BYTES as usize);
        (truncated, true)
    }

    /// Select the chunker for a file by extension/path, without reading it.
    ///
    /// # Errors
    /// Returns [`ParsingError::ChunkingError`] if `size` exceeds the safety limit.
    pub fn select(&self, path: &str, size: u64, ext: &str) -> ParsingResult<Arc<dyn Chunker>> {
        self.check_size(size)?;

        let ext_lower = ext.trim_start_matches('.').to_lowercase();
        if DOCS_EXTENSIONS.contains(&ext_lower.as_str()) {
            return Ok(Arc::new(DocsChunker::new(path)));
        }

        if let Some(language) = get_language_from_extension(&ext_lower)
            && get_language_config(language).is_some()
        {
            return Ok(Arc::new(CodeChunker::new(
                language,
                self.max_tokens,
                self.overlap_tokens,
            )));
        }

        Ok(Arc::new(FallbackChunker::new(
            self.max_lines_code.min(self.max_lines_docs).max(1),
            self.overlap_lines,
        )))
    }

    /// Chunker to use for markdown/docs-style fallback (when a caller already
    /// knows the file is prose but has no language config).
    pub fn docs_fallback(&self) -> Arc<dyn Chunker> {
        Arc::new(FallbackChunker::new(self.max_lines_docs, self.overlap_lines))
    }

    /// Chunker to use for code-style fallback.
    pub fn code_fallback(&self) -> Arc<dyn Chunker> {
        Arc::new(FallbackChunker::new(self.max_lines_code, self.overlap_lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_rejects_oversized_files() {
        let registry = ChunkerRegistry::default();
        let err = registry.select("big.rs", MAX_FILE_BYTES + 1, "rs").unwrap_err();
        assert!(matches!(err, ParsingError::ChunkingError(_)));
    }

    #[test]
    fn select_routes_known_language_to_code_chunker() {
        let registry = ChunkerRegistry::default();
        let chunker = registry.select("main.rs", 100, "rs").expect("should select a chunker");
        assert_eq!(chunker.name(), "code");
    }

    #[test]
    fn select_routes_markdown_to_docs_chunker() {
        let registry = ChunkerRegistry::default();
        let chunker = registry.select("README.md", 100, "md").expect("should select a chunker");
        assert_eq!(chunker.name(), "docs");
    }

    #[test]
    fn select_routes_unknown_extension_to_fallback() {
        let registry = ChunkerRegistry::default();
        let chunker = registry.select("data.xyz123", 100, "xyz123").expect("should select a chunker");
        assert_eq!(chunker.name(), "fallback");
    }

    #[test]
    fn fallback_chunker_respects_overlap_and_terminates() {
        let chunker = FallbackChunker::new(10, 3);
        let content = (0..35).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let chunks: Vec<_> = chunker
            .stream("file.txt", &content)
            .collect::<ParsingResult<Vec<_>>>()
            .expect("streaming should not fail");

        assert!(!chunks.is_empty());
        // Every window after the first should start before the previous one ended,
        // proving overlap was applied, and the iterator must still terminate.
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line);
        }
        assert_eq!(chunks.last().unwrap().end_line, 35);
    }

    #[test]
    fn docs_chunker_produces_section_metadata() {
        let chunker = DocsChunker::new("docs/guide.md");
        let content = "# Guide\n\nIntro text.\n\n## Setup\n\nDo the setup.\n\n### Detail\n\nFine print.\n";
        let chunks: Vec<_> = chunker
            .stream("docs/guide.md", content)
            .collect::<ParsingResult<Vec<_>>>()
            .expect("streaming should not fail");

        assert!(!chunks.is_empty());
        let setup_chunk = chunks
            .iter()
            .find(|c| c.metadata.get("doc_section_path").is_some_and(|p| p.contains("Setup")))
            .expect("should find the Setup section");
        assert_eq!(setup_chunk.metadata.get("doc_title").map(String::as_str), Some("Guide"));
        assert!(setup_chunk.metadata.contains_key("topic_key"));
    }

    #[test]
    fn truncate_if_oversized_flags_truncation() {
        let registry = ChunkerRegistry::default();
        let huge = "a".repeat(MAX_FILE_BYTES as usize + 10);
        let (content, truncated) = registry.truncate_if_oversized(huge);
        assert!(truncated);
        assert_eq!(content.len() as u64, MAX_FILE_BYTES);
    }
}
