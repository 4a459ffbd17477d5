//! LLM collaborator interface (spec §6): `complete(prompt, options) → text`,
//! plus a tolerant JSON-mode extractor for callers that need structured
//! output from a model that doesn't reliably emit strict JSON.
//!
//! Grounded on `codetriever-embeddings::embedding::traits::EmbeddingProvider`
//! for the "pluggable collaborator behind a trait, `Arc`-shared, swappable
//! for a test double" shape; the HTTP implementation follows the teacher's
//! `reqwest` usage in `codetriever-api`'s embedding/storage clients.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Options accepted by [`LlmProvider::complete`] (spec §6).
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            system: None,
            max_tokens: 1024,
            temperature: 0.2,
            stop: Vec::new(),
        }
    }
}

/// Errors an LLM collaborator call can produce. Every variant maps to the
/// external `LLM_ERROR` code (spec §6); recoverability is decided by the
/// caller (network/timeout errors are retried, parse failures are not).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    #[error("LLM response could not be parsed as JSON: {0}")]
    UnparsableJson(String),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// A chat/completion collaborator (spec §6). Implementations wrap a
/// specific vendor API; callers never depend on the vendor shape directly.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> LlmResult<String>;

    /// Model identifier, surfaced in telemetry/logging only.
    fn model_name(&self) -> &str;
}

/// Parse `raw` as the JSON-mode helper described in spec §6: strict JSON
/// first, then a fenced ` ```json ` block, then the first balanced `{...}`
/// substring. Returns [`LlmError::UnparsableJson`] if none of the three
/// stages produce a value deserializable as `T`.
///
/// # Errors
/// Returns [`LlmError::UnparsableJson`] if no stage parses.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> LlmResult<T> {
    if let Ok(value) = serde_json::from_str::<T>(raw.trim()) {
        return Ok(value);
    }

    if let Some(fenced) = extract_fenced_block(raw)
        && let Ok(value) = serde_json::from_str::<T>(fenced.trim())
    {
        return Ok(value);
    }

    if let Some(balanced) = extract_balanced_braces(raw)
        && let Ok(value) = serde_json::from_str::<T>(&balanced)
    {
        return Ok(value);
    }

    Err(LlmError::UnparsableJson(raw.chars().take(200).collect()))
}

fn extract_fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let after_fence = after_fence.strip_prefix('\n').unwrap_or(after_fence);
    let end = after_fence.find("```")?;
    Some(&after_fence[..end])
}

/// Scan for the first top-level balanced `{...}` substring, tolerating
/// braces inside string literals.
fn extract_balanced_braces(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;
    let mut depth = 0_i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..=offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// HTTP-backed [`LlmProvider`] speaking an OpenAI-compatible `/chat/completions`
/// endpoint, the common denominator across self-hosted and hosted providers
/// this engine is deployed against.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl HttpLlmProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: &'a [String],
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> LlmResult<String> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: &options.stop,
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout.as_millis() as u64)
            } else {
                LlmError::Request(e.to_string())
            }
        })?;

        let response = response
            .error_for_status()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Request("empty choices array".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Probe {
        complete: bool,
        confidence: f64,
    }

    #[test]
    fn parses_strict_json() {
        let raw = r#"{"complete": true, "confidence": 0.9}"#;
        let parsed: Probe = parse_json_response(raw).unwrap();
        assert_eq!(
            parsed,
            Probe {
                complete: true,
                confidence: 0.9
            }
        );
    }

    #[test]
    fn parses_fenced_json_block() {
        let raw = "Here you go:\n```json\n{\"complete\": false, \"confidence\": 0.2}\n```\nthanks";
        let parsed: Probe = parse_json_response(raw).unwrap();
        assert_eq!(
            parsed,
            Probe {
                complete: false,
                confidence: 0.2
            }
        );
    }

    #[test]
    fn parses_balanced_braces_among_prose() {
        let raw = "Sure, the result is {\"complete\": true, \"confidence\": 0.75} as requested.";
        let parsed: Probe = parse_json_response(raw).unwrap();
        assert_eq!(
            parsed,
            Probe {
                complete: true,
                confidence: 0.75
            }
        );
    }

    #[test]
    fn balanced_braces_tolerates_nested_string_braces() {
        let raw = r#"noise {"complete": true, "confidence": 0.5, "note": "a { b } c"} trailing"#;
        let parsed: Probe = parse_json_response(raw).unwrap();
        assert_eq!(parsed.complete, true);
    }

    #[test]
    fn unparsable_input_is_an_error() {
        let result: LlmResult<Probe> = parse_json_response("not json at all");
        assert!(matches!(result, Err(LlmError::UnparsableJson(_))));
    }
}
