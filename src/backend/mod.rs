//! Model backends
//!
//! Every backend turns an ordered list of messages into one inference call and
//! returns a [`BackendResponse`]. Transport details stay inside each variant;
//! callers only ever see [`InferenceError`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod llama_cpp;
pub mod ollama;
pub mod response;
pub mod window;

pub use response::{BackendResponse, ToolCall, Usage};

use crate::config::{BackendKind, BackendsConfig};
use crate::error::{ConfigError, InferenceError};
use crate::tools::ToolDefinition;

/// Context length assumed when a backend cannot report one
pub const DEFAULT_CONTEXT_WINDOW: usize = 2048;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona prompt, only ever in outgoing requests
    System,
    /// The operator
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One request message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Per-call generation options
#[derive(Debug, Clone, PartialEq)]
pub struct InferOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    /// Ask the backend to constrain output to JSON
    pub json_mode: bool,
    pub timeout: Duration,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            stop: Vec::new(),
            json_mode: true,
            timeout: Duration::from_secs(120),
        }
    }
}

/// A pluggable inference transport
pub trait Backend: Send + Sync {
    /// Variant name, e.g. "ollama"
    fn name(&self) -> &str;

    fn current_model(&self) -> &str;

    /// Maximum context length in tokens
    fn context_window(&self) -> usize;

    fn available_models(&self) -> Vec<String> {
        vec![self.current_model().to_string()]
    }

    /// Run one blocking inference call
    fn infer(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &InferOptions,
    ) -> Result<BackendResponse, InferenceError>;
}

/// Construct the backend selected by `kind`
pub fn build(kind: BackendKind, config: &BackendsConfig, timeout: Duration) -> Result<Arc<dyn Backend>, ConfigError> {
    log::info!("Building backend '{}'", kind.as_str());

    match kind {
        BackendKind::Ollama => Ok(Arc::new(ollama::OllamaBackend::new(&config.ollama, timeout)?)),
        BackendKind::LlamaCpp => build_llama_cpp(config),
    }
}

#[cfg(feature = "llama")]
fn build_llama_cpp(config: &BackendsConfig) -> Result<Arc<dyn Backend>, ConfigError> {
    Ok(Arc::new(llama_cpp::LlamaCppBackend::new(&config.llama_cpp)?))
}

#[cfg(not(feature = "llama"))]
fn build_llama_cpp(_config: &BackendsConfig) -> Result<Arc<dyn Backend>, ConfigError> {
    Err(ConfigError::FeatureDisabled {
        backend: BackendKind::LlamaCpp.as_str().to_string(),
        feature: "llama".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn test_default_options() {
        let options = InferOptions::default();
        assert!(options.json_mode);
        assert!(options.max_tokens.is_none());
        assert_eq!(options.timeout, Duration::from_secs(120));
    }

    #[cfg(not(feature = "llama"))]
    #[test]
    fn test_llama_cpp_needs_feature() {
        let result = build(BackendKind::LlamaCpp, &BackendsConfig::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::FeatureDisabled { .. })));
    }

    #[test]
    fn test_build_ollama_without_model_fails() {
        let mut config = BackendsConfig::default();
        config.ollama.model = String::new();
        let result = build(BackendKind::Ollama, &config, Duration::from_secs(1));
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }
}
