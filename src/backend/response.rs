//! Normalized backend responses
//!
//! Models are asked to answer with a JSON object using only the optional keys
//! `text` and `code`. Anything else is a malformed response: the renderer
//! depends on knowing which part is prose and which is source code.

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Structured answer content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ResponseContent {
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
        blank(&self.text) && blank(&self.code)
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// What every backend returns
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub content: ResponseContent,
    /// The JSON text exactly as the model produced it
    pub raw: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl BackendResponse {
    /// Validate raw model output and assemble a response
    pub fn from_raw(raw: &str, tool_calls: Vec<ToolCall>, usage: Usage) -> Result<Self, InferenceError> {
        let content = parse_content(raw, !tool_calls.is_empty())?;
        Ok(Self {
            content,
            raw: strip_fence(raw).to_string(),
            tool_calls,
            usage,
        })
    }

    /// Display text: prose first, then code in a fenced block
    pub fn body(&self) -> String {
        let mut parts = Vec::new();

        if let Some(text) = self.content.text.as_deref().filter(|t| !t.trim().is_empty()) {
            parts.push(text.trim().to_string());
        }
        if let Some(code) = self.content.code.as_deref().filter(|c| !c.trim().is_empty()) {
            parts.push(format!("```\n{}\n```", code.trim_end()));
        }

        parts.join("\n\n")
    }
}

/// Parse model output into the closed content shape
///
/// Empty output is only accepted when the model asked for tools instead.
pub fn parse_content(raw: &str, has_tool_calls: bool) -> Result<ResponseContent, InferenceError> {
    let body = strip_fence(raw);

    if body.is_empty() {
        return if has_tool_calls {
            Ok(ResponseContent::default())
        } else {
            Err(InferenceError::MalformedResponse("empty response".to_string()))
        };
    }

    let content: ResponseContent =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse(format!("{}: {}", e, preview(body))))?;

    if content.is_empty() && !has_tool_calls {
        return Err(InferenceError::MalformedResponse(
            "response has neither text nor code".to_string(),
        ));
    }

    Ok(content)
}

/// Drop a surrounding ``` or ```json fence
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // skip the info string on the opening line
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text() {
        let content = parse_content(r#"{"text": "foo"}"#, false).unwrap();
        assert_eq!(content.text.as_deref(), Some("foo"));
        assert!(content.code.is_none());
    }

    #[test]
    fn test_parse_text_and_code() {
        let raw = r#"{"text": "Here's the answer", "code": "print('hello')"}"#;
        let response = BackendResponse::from_raw(raw, Vec::new(), Usage::new(10, 5)).unwrap();

        assert_eq!(response.body(), "Here's the answer\n\n```\nprint('hello')\n```");
        assert_eq!(response.raw, raw);
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn test_null_code_ignored() {
        let response = BackendResponse::from_raw(r#"{"text": "hi", "code": null}"#, Vec::new(), Usage::default()).unwrap();
        assert_eq!(response.body(), "hi");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_content(r#"{"result": "bar"}"#, false).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[test]
    fn test_plain_text_rejected() {
        let err = parse_content("just words", false).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(parse_content(r#"["Madrid", "Barcelona"]"#, false).is_err());
        assert!(parse_content(r#""quoted""#, false).is_err());
    }

    #[test]
    fn test_empty_requires_tool_calls() {
        assert!(parse_content("", false).is_err());
        assert!(parse_content("{}", false).is_err());
        assert_eq!(parse_content("", true).unwrap(), ResponseContent::default());
        assert_eq!(parse_content("{}", true).unwrap(), ResponseContent::default());
    }

    #[test]
    fn test_fenced_json_accepted() {
        let raw = "```json\n{\"text\": \"fenced\"}\n```";
        let response = BackendResponse::from_raw(raw, Vec::new(), Usage::default()).unwrap();
        assert_eq!(response.body(), "fenced");
        assert_eq!(response.raw, "{\"text\": \"fenced\"}");
    }

    #[test]
    fn test_usage_add() {
        let mut total = Usage::default();
        total.add(&Usage::new(3, 4));
        total.add(&Usage::new(1, 1));
        assert_eq!(total, Usage::new(4, 5));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).len(), 83);
        assert_eq!(preview("short"), "short");
    }
}
