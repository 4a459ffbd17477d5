//! Source parsing: tree-sitter AST extraction plus heuristic fallbacks

pub mod code_parser;
pub mod languages;
pub mod traits;

pub use code_parser::{CodeChunk, CodeParser};
pub use languages::{LanguageConfig, get_language_config, get_language_from_extension};
pub use traits::{CompositeParser, ContentParser};
