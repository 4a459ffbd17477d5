//! Code parsing module for extracting meaningful code elements using tree-sitter and heuristics

use crate::ParsingResult;
use crate::error::ParsingError;
use crate::parsing::languages::get_language_config;
use crate::parsing::traits::ContentParser;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tree_sitter::{Language, Parser, Query, QueryCursor, StreamingIteratorMut};

/// Represents a chunk of code extracted by the parser
#[derive(Debug, Clone)]
pub struct CodeChunk {
    /// Path to the source file
    pub file_path: String,
    /// The actual code content
    pub content: String,
    /// Starting line number (1-indexed)
    pub start_line: usize,
    /// Ending line number (1-indexed)
    pub end_line: usize,
    /// Byte offset from start of file
    pub byte_start: usize,
    /// Byte offset of end (exclusive)
    pub byte_end: usize,
    /// Optional type/kind of code chunk (e.g., "function", "class", "impl")
    pub kind: Option<String>,
    /// Language of the code
    pub language: String,
    /// Optional function/class/method name if applicable
    pub name: Option<String>,
    /// Number of tokens in this chunk (if calculated)
    pub token_count: Option<usize>,
    /// Optional embedding vector (populated during indexing)
    pub embedding: Option<Vec<f32>>,
}

// Global cache for compiled tree-sitter queries - queries are expensive to
// compile but reused across every parse call for a given language.
type QueryCacheMap = HashMap<(usize, String), Arc<Query>>; // (language_id, query_string) -> compiled_query
static QUERY_CACHE: Lazy<std::sync::Mutex<QueryCacheMap>> =
    Lazy::new(|| std::sync::Mutex::new(HashMap::new()));

/// Get a cached tree-sitter query, compiling it only once per (language, query_str) pair
fn get_cached_query(language: &Language, query_str: &str) -> ParsingResult<Arc<Query>> {
    // Use the language pointer address as the cache key component
    let lang_ptr = language as *const Language as usize;
    let key = (lang_ptr, query_str.to_string());

    {
        let cache = QUERY_CACHE
            .lock()
            .map_err(|_| ParsingError::cache_error("query cache lock poisoned".to_string()))?;
        if let Some(cached_query) = cache.get(&key) {
            return Ok(cached_query.clone());
        }
    }

    let query = Query::new(language, query_str)
        .map_err(|e| ParsingError::QueryCompilationError(e.to_string()))?;
    let arc_query = Arc::new(query);

    {
        let mut cache = QUERY_CACHE
            .lock()
            .map_err(|_| ParsingError::cache_error("query cache lock poisoned".to_string()))?;
        cache.insert(key, arc_query.clone());
    }

    Ok(arc_query)
}

/// A code parser that uses Tree-sitter and heuristics to extract meaningful elements from source code
pub struct CodeParser {
    tokenizer: Option<Arc<Tokenizer>>,
    split_large_units: bool,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new(None, true, 512, 128)
    }
}

impl CodeParser {
    /// Creates a new `CodeParser` with optional tokenizer for token counting
    pub fn new(
        tokenizer: Option<Arc<Tokenizer>>,
        split_large_units: bool,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Self {
        Self {
            tokenizer,
            split_large_units,
            max_tokens,
            overlap_tokens,
        }
    }

    /// Count tokens in a text using the tokenizer if available
    fn count_tokens(&self, text: &str) -> Option<usize> {
        self.tokenizer.as_ref().and_then(|tokenizer| {
            tokenizer
                .encode(text, false)
                .ok()
                .map(|encoding| encoding.len())
        })
    }

    /// Helper to create a `CodeChunk` with token counting
    fn create_chunk(
        &self,
        file_path: &str,
        content: String,
        start_line: usize,
        end_line: usize,
        kind: Option<String>,
        language: &str,
        name: Option<String>,
    ) -> CodeChunk {
        let content_len = content.len();
        self.create_chunk_with_byte_offsets(
            file_path,
            content,
            start_line,
            end_line,
            0, // For non-tree-sitter parsing we don't have accurate byte offsets
            content_len,
            kind,
            language,
            name,
        )
    }

    /// Helper to create a `CodeChunk` with token counting and explicit byte offsets
    #[allow(clippy::too_many_arguments)]
    fn create_chunk_with_byte_offsets(
        &self,
        file_path: &str,
        content: String,
        start_line: usize,
        end_line: usize,
        byte_start: usize,
        byte_end: usize,
        kind: Option<String>,
        language: &str,
        name: Option<String>,
    ) -> CodeChunk {
        let token_count = self.count_tokens(&content);

        if let Some(count) = token_count
            && count > self.max_tokens
        {
            tracing::warn!(
                max_tokens = self.max_tokens,
                count,
                file_path,
                start_line,
                end_line,
                "chunk exceeds configured token limit"
            );
        }

        CodeChunk {
            file_path: file_path.to_string(),
            content,
            start_line,
            end_line,
            byte_start,
            byte_end,
            kind,
            language: language.to_string(),
            name,
            token_count,
            embedding: None,
        }
    }

    /// Creates a parser for the given language
    fn create_parser_for_language(language: &tree_sitter::Language) -> Option<Parser> {
        let mut parser = Parser::new();
        if parser.set_language(language).is_ok() {
            Some(parser)
        } else {
            None
        }
    }

    /// Split content into token-based chunks with overlap
    fn split_by_tokens(
        &self,
        content: &str,
        file_path: &str,
        language: &str,
        kind: &str,
        name: Option<String>,
        start_line: usize,
    ) -> Option<Vec<CodeChunk>> {
        let tokenizer = self.tokenizer.as_ref()?;
        let encoding = tokenizer.encode(content, false).ok()?;
        let tokens = encoding.get_ids().to_vec();
        let total_tokens = tokens.len();

        if total_tokens <= self.max_tokens {
            return None;
        }

        let mut chunks = Vec::new();
        let mut chunk_start = 0;
        let mut part_num = 1;

        let original_lines: Vec<&str> = content.lines().collect();
        let total_lines = original_lines.len();

        while chunk_start < total_tokens {
            let chunk_end = (chunk_start + self.max_tokens).min(total_tokens);
            let chunk_tokens = &tokens[chunk_start..chunk_end];

            if let Ok(chunk_text) = tokenizer.decode(chunk_tokens, false) {
                let chunk_line_count = chunk_text.lines().count();

                let estimated_start_line = start_line + (chunk_start * total_lines / total_tokens);
                let estimated_end_line = estimated_start_line + chunk_line_count;

                chunks.push(self.create_chunk(
                    file_path,
                    chunk_text,
                    estimated_start_line,
                    estimated_end_line,
                    Some(format!("{kind}_part{part_num}")),
                    language,
                    name.clone(),
                ));
                part_num += 1;
            }

            let next_start = chunk_end.saturating_sub(self.overlap_tokens);

            if next_start >= chunk_end || next_start <= chunk_start {
                chunk_start = chunk_end;
            } else {
                chunk_start = next_start;
            }

            if chunk_start >= total_tokens {
                break;
            }
        }

        Some(chunks)
    }

    /// Split content by lines (fallback when no tokenizer)
    fn split_by_lines(
        &self,
        content: &str,
        file_path: &str,
        language: &str,
        kind: &str,
        name: Option<String>,
        start_line: usize,
    ) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        let mid_point = lines.len() / 2;
        let overlap = 10.min(lines.len() / 10);

        vec![
            self.create_chunk(
                file_path,
                lines[..mid_point + overlap].join("\n"),
                start_line,
                start_line + mid_point + overlap,
                Some(format!("{kind}_part1")),
                language,
                name.clone(),
            ),
            self.create_chunk(
                file_path,
                lines[mid_point..].join("\n"),
                start_line + mid_point,
                start_line + lines.len() - 1,
                Some(format!("{kind}_part2")),
                language,
                name.clone(),
            ),
        ]
    }

    /// Smart splitting for chunks that exceed token limits
    fn split_large_chunk(
        &self,
        content: &str,
        file_path: &str,
        language: &str,
        kind: &str,
        name: Option<String>,
        start_line: usize,
    ) -> Vec<CodeChunk> {
        let mut chunks = Vec::new();

        if kind == "class" || kind == "struct" || kind == "impl" {
            let lines: Vec<&str> = content.lines().collect();
            let mut class_header = Vec::new();
            let mut in_body = false;
            let mut current_method = Vec::new();
            let mut method_start_line = start_line;

            for (i, line) in lines.iter().enumerate() {
                let line_num = start_line + i;

                if !in_body {
                    class_header.push(*line);
                    if line.contains('{') || (i > 0 && line.starts_with("    ")) {
                        in_body = true;
                        method_start_line = line_num + 1;
                    }
                } else {
                    current_method.push(*line);

                    let current_content = format!(
                        "{}\n    // ... (continued)\n{}",
                        class_header.join("\n"),
                        current_method.join("\n")
                    );

                    if let Some(token_count) = self.count_tokens(&current_content)
                        && token_count >= self.max_tokens - self.overlap_tokens
                    {
                        chunks.push(self.create_chunk(
                            file_path,
                            current_content,
                            method_start_line,
                            line_num,
                            Some(format!("{kind}_part")),
                            language,
                            name.clone(),
                        ));
                        current_method.clear();
                        method_start_line = line_num + 1;
                    }
                }
            }

            if !current_method.is_empty() {
                let final_content = format!(
                    "{}\n    // ... (continued)\n{}",
                    class_header.join("\n"),
                    current_method.join("\n")
                );
                chunks.push(self.create_chunk(
                    file_path,
                    final_content,
                    method_start_line,
                    start_line + lines.len() - 1,
                    Some(format!("{kind}_part")),
                    language,
                    name.clone(),
                ));
            }
        } else {
            if let Some(token_chunks) =
                self.split_by_tokens(content, file_path, language, kind, name.clone(), start_line)
            {
                return token_chunks;
            }

            return self.split_by_lines(content, file_path, language, kind, name.clone(), start_line);
        }

        if chunks.is_empty() {
            chunks.push(self.create_chunk(
                file_path,
                content.to_string(),
                start_line,
                start_line + content.lines().count(),
                Some(kind.to_string()),
                language,
                name.clone(),
            ));
        }

        chunks
    }

    /// Parses source code and extracts meaningful code chunks
    pub fn parse(&self, code: &str, language: &str, file_path: &str) -> ParsingResult<Vec<CodeChunk>> {
        // Normalize line endings to LF so brace/indentation heuristics see a
        // consistent view regardless of how the file was saved.
        let normalized_code = code.replace("\r\n", "\n").replace('\r', "\n");
        let code = normalized_code.as_str();

        let config = get_language_config(language);

        if let Some(lang_config) = config
            && let Some(tree_sitter_language) = &lang_config.tree_sitter_language
            && let Some(query_str) = lang_config.tree_sitter_query
            && let Ok(chunks) =
                self.parse_with_tree_sitter(code, language, file_path, tree_sitter_language, query_str)
            && !chunks.is_empty()
        {
            return Ok(chunks);
        }

        self.parse_with_heuristics(code, language, file_path, config)
    }

    fn parse_with_tree_sitter(
        &self,
        code: &str,
        language: &str,
        file_path: &str,
        tree_sitter_language: &tree_sitter::Language,
        query_str: &str,
    ) -> ParsingResult<Vec<CodeChunk>> {
        let mut parser = Self::create_parser_for_language(tree_sitter_language)
            .ok_or_else(|| ParsingError::tree_sitter_error("failed to create parser for language".into()))?;

        let tree = parser
            .parse(code, None)
            .ok_or_else(|| ParsingError::tree_sitter_error("failed to parse code".into()))?;

        let root = tree.root_node();
        let mut chunks = Vec::new();

        let query = get_cached_query(tree_sitter_language, query_str)?;

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, code.as_bytes());

        while let Some(match_) = matches.next_mut() {
            for capture in match_.captures {
                let node = capture.node;
                let start_line = node.start_position().row + 1;
                let end_line = node.end_position().row + 1;
                let byte_range = node.byte_range();
                let content = &code[byte_range.clone()];

                let name = self.extract_name_from_node(&node, code);
                let content_str = content.to_string();

                if let Some(token_count) = self.count_tokens(&content_str) {
                    if self.split_large_units && token_count > self.max_tokens {
                        tracing::debug!(
                            kind = node.kind(),
                            name = name.as_deref().unwrap_or("<unnamed>"),
                            token_count,
                            max_tokens = self.max_tokens,
                            "splitting oversized node into smaller chunks"
                        );
                        let split_chunks = self.split_large_chunk(
                            &content_str,
                            file_path,
                            language,
                            node.kind(),
                            name,
                            start_line,
                        );
                        chunks.extend(split_chunks);
                    } else {
                        chunks.push(self.create_chunk_with_byte_offsets(
                            file_path,
                            content_str,
                            start_line,
                            end_line,
                            byte_range.start,
                            byte_range.end,
                            Some(node.kind().to_string()),
                            language,
                            name,
                        ));
                    }
                } else {
                    chunks.push(self.create_chunk_with_byte_offsets(
                        file_path,
                        content_str,
                        start_line,
                        end_line,
                        byte_range.start,
                        byte_range.end,
                        Some(node.kind().to_string()),
                        language,
                        name,
                    ));
                }
            }
        }

        if chunks.is_empty() {
            self.extract_top_level_items(&root, code, file_path, language, &mut chunks);
        }

        Ok(chunks)
    }

    fn parse_with_heuristics(
        &self,
        code: &str,
        language: &str,
        file_path: &str,
        config: Option<&'static crate::parsing::languages::LanguageConfig>,
    ) -> ParsingResult<Vec<CodeChunk>> {
        let mut chunks = Vec::new();
        let line_ending = "\n";
        let lines: Vec<&str> = code.lines().collect();

        if lines.is_empty() {
            return Ok(chunks);
        }

        let mut current_chunk = Vec::new();
        let mut current_start = 1;
        let mut brace_depth = 0;
        let mut indent_depth = 0;
        let mut in_function = false;
        let mut in_class = false;
        let mut current_name: Option<String> = None;

        let uses_braces = config.is_none_or(|c| c.uses_braces);
        let uses_indentation = config.is_some_and(|c| c.uses_indentation);

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            let line_num = i + 1;
            let current_indent = line.len() - line.trim_start().len();

            if self.is_definition_start(trimmed, config) {
                if !current_chunk.is_empty() && (in_function || in_class) {
                    let content = current_chunk.join(line_ending);
                    chunks.push(self.create_chunk(
                        file_path,
                        content,
                        current_start,
                        i,
                        Some(if in_class { "class".to_string() } else { "function".to_string() }),
                        language,
                        current_name.clone(),
                    ));
                    current_chunk.clear();
                }

                current_start = line_num;
                in_function = self.is_function_start(trimmed, config);
                in_class = self.is_class_start(trimmed, config);
                current_name = self.extract_name_from_line(trimmed);
                brace_depth = 0;
                indent_depth = current_indent;
            }

            current_chunk.push(*line);

            if uses_braces {
                for ch in line.chars() {
                    match ch {
                        '{' | '(' | '[' => brace_depth += 1,
                        '}' | ')' | ']' => {
                            brace_depth -= 1;
                            if brace_depth == 0 && (in_function || in_class) {
                                let content = current_chunk.join(line_ending);
                                chunks.push(self.create_chunk(
                                    file_path,
                                    content,
                                    current_start,
                                    line_num,
                                    Some(if in_class { "class".to_string() } else { "function".to_string() }),
                                    language,
                                    current_name.clone(),
                                ));
                                current_chunk.clear();
                                in_function = false;
                                in_class = false;
                                current_name = None;
                                current_start = line_num + 1;
                            }
                        }
                        _ => {}
                    }
                }
            } else if uses_indentation
                && (in_function || in_class)
                && current_indent <= indent_depth
                && !trimmed.is_empty()
            {
                let content = current_chunk[..current_chunk.len() - 1].join(line_ending);
                chunks.push(self.create_chunk(
                    file_path,
                    content,
                    current_start,
                    i,
                    Some(if in_class { "class".to_string() } else { "function".to_string() }),
                    language,
                    current_name.clone(),
                ));
                current_chunk = vec![*line];
                in_function = false;
                in_class = false;
                current_name = None;
                current_start = line_num;
            }

            if !in_function && !in_class && !current_chunk.is_empty() {
                let current_content = current_chunk.join(line_ending);
                if let Some(token_count) = self.count_tokens(&current_content)
                    && token_count >= self.max_tokens - self.overlap_tokens
                {
                    chunks.push(self.create_chunk(
                        file_path,
                        current_content,
                        current_start,
                        line_num,
                        None,
                        language,
                        None,
                    ));

                    let mut overlap_lines = Vec::new();
                    let mut overlap_tokens = 0;

                    for line in current_chunk.iter().rev() {
                        if let Some(line_tokens) = self.count_tokens(line) {
                            if overlap_tokens + line_tokens > self.overlap_tokens {
                                break;
                            }
                            overlap_tokens += line_tokens;
                            overlap_lines.insert(0, *line);
                        }
                    }

                    current_chunk = overlap_lines;
                    current_start = line_num - current_chunk.len() + 1;
                }
            }
        }

        if !current_chunk.is_empty() {
            let content = current_chunk.join(line_ending);
            let kind = if in_function {
                Some("function".to_string())
            } else if in_class {
                Some("class".to_string())
            } else {
                None
            };
            let name = if in_function || in_class { current_name } else { None };
            chunks.push(self.create_chunk(file_path, content, current_start, lines.len(), kind, language, name));
        }

        Ok(chunks)
    }

    fn is_definition_start(
        &self,
        line: &str,
        config: Option<&'static crate::parsing::languages::LanguageConfig>,
    ) -> bool {
        self.is_function_start(line, config) || self.is_class_start(line, config)
    }

    fn is_function_start(
        &self,
        line: &str,
        config: Option<&'static crate::parsing::languages::LanguageConfig>,
    ) -> bool {
        if let Some(cfg) = config {
            cfg.function_keywords.iter().any(|&keyword| line.starts_with(keyword))
        } else {
            let patterns = [
                "fn ", "def ", "function ", "func ", "public ", "private ", "protected ",
                "async fn", "async function", "async def", "pub fn", "pub(crate) fn",
            ];
            patterns.iter().any(|p| line.starts_with(p))
        }
    }

    fn is_class_start(
        &self,
        line: &str,
        config: Option<&'static crate::parsing::languages::LanguageConfig>,
    ) -> bool {
        if let Some(cfg) = config {
            cfg.class_keywords.iter().any(|&keyword| line.starts_with(keyword))
        } else {
            let patterns = ["class ", "struct ", "enum ", "interface ", "impl ", "trait ", "type "];
            patterns.iter().any(|p| line.starts_with(p))
        }
    }

    fn extract_name_from_node(&self, node: &tree_sitter::Node, code: &str) -> Option<String> {
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "identifier" | "name" | "property_identifier") {
                return Some(code[child.byte_range()].to_string());
            }
        }

        None
    }

    fn extract_name_from_line(&self, line: &str) -> Option<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        for (i, token) in tokens.iter().enumerate() {
            if matches!(
                *token,
                "def" | "fn" | "function" | "func" | "class" | "struct" | "interface" | "impl" | "trait"
            ) && let Some(next) = tokens.get(i + 1)
            {
                let name = next
                    .trim_end_matches('(')
                    .trim_end_matches(':')
                    .trim_end_matches('{')
                    .trim_end_matches('<');
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }

        None
    }

    fn extract_top_level_items(
        &self,
        root: &tree_sitter::Node,
        code: &str,
        file_path: &str,
        language: &str,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            if child.kind() == "comment" || child.byte_range().len() < 10 {
                continue;
            }

            let start_line = child.start_position().row + 1;
            let end_line = child.end_position().row + 1;
            let byte_range = child.byte_range();
            let content = &code[byte_range.clone()];

            let chunk = self.create_chunk_with_byte_offsets(
                file_path,
                content.to_string(),
                start_line,
                end_line,
                byte_range.start,
                byte_range.end,
                Some(child.kind().to_string()),
                language,
                self.extract_name_from_node(&child, code),
            );
            chunks.push(chunk);
        }
    }
}

impl ContentParser for CodeParser {
    fn name(&self) -> &str {
        "tree-sitter-parser"
    }

    fn parse(&self, content: &str, language: &str, file_path: &str) -> ParsingResult<Vec<CodeChunk>> {
        CodeParser::parse(self, content, language, file_path)
    }

    fn supports_language(&self, language: &str) -> bool {
        get_language_config(language).is_some()
    }

    fn supported_languages(&self) -> Vec<&str> {
        vec![
            "rust", "python", "javascript", "typescript", "go", "c", "cpp", "java", "csharp",
            "ruby", "php", "swift", "kotlin", "scala", "haskell", "elixir", "json", "xml", "yaml",
            "toml", "html", "css", "sql", "bash", "powershell", "dockerfile",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_initialization() {
        let _parser = CodeParser::new(None, true, 512, 128);
    }

    #[test]
    fn test_rust_parsing() {
        let parser = CodeParser::new(None, true, 512, 128);
        let code = r#"
fn main() {
    println!("Hello, world!");
}

fn add(a: i32, b: i32) -> i32 {
    a + b
}

struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
"#;

        let chunks = parser.parse(code, "rust", "test.rs").expect("parse should succeed");
        assert!(!chunks.is_empty());

        let function_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind.as_ref().is_some_and(|k| k.contains("function")))
            .collect();
        assert!(function_chunks.len() >= 2);

        let main_chunk = chunks.iter().find(|c| c.name.as_ref().is_some_and(|n| n == "main"));
        assert!(main_chunk.is_some());
    }

    #[test]
    fn test_python_parsing() {
        let parser = CodeParser::new(None, true, 512, 128);
        let code = r#"
def hello():
    print("Hello, world!")

class MyClass:
    def __init__(self):
        self.value = 42

    def get_value(self):
        return self.value

async def async_function():
    await some_operation()
"#;

        let chunks = parser.parse(code, "python", "test.py").expect("parse should succeed");
        assert!(!chunks.is_empty());

        let class_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind.as_ref().is_some_and(|k| k.contains("class")))
            .collect();
        assert!(!class_chunks.is_empty());
    }

    #[test]
    fn test_heuristic_fallback() {
        let parser = CodeParser::new(None, true, 512, 128);
        let code = r#"
function test() {
    // Some code
}

class Example {
    method() {
        return 42;
    }
}
"#;

        let chunks = parser.parse(code, "unknown", "test.txt").expect("parse should succeed");
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_chunk_metadata() {
        let parser = CodeParser::new(None, true, 512, 128);
        let code = "fn test() {\n    println!(\"test\");\n}";

        let chunks = parser.parse(code, "rust", "/path/to/file.rs").expect("parse should succeed");
        assert!(!chunks.is_empty());

        let chunk = &chunks[0];
        assert_eq!(chunk.file_path, "/path/to/file.rs");
        assert_eq!(chunk.language, "rust");
        assert!(chunk.start_line > 0);
        assert!(chunk.end_line >= chunk.start_line);
        assert!(chunk.content.contains("fn test"));
    }
}
