//! Error types for ada.
//!
//! Domain errors are typed so the agent can decide per kind whether a failure
//! is shown and recovered or ends the session. The application edge (`main`
//! and `commands`) wraps them in `eyre::Report`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Persona lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersonaError {
    /// The operator referenced a persona that is not registered
    #[error("unknown persona: {name}")]
    Unknown { name: String },
}

/// A single memory fragment could not be read.
#[derive(Error, Debug)]
#[error("failed to read memory {path}: {source}")]
pub struct MemoryReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure of a backend inference call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// The call did not finish within the configured timeout
    #[error("inference timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Connection refused, HTTP status, I/O or runtime failure
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The model answered with something other than the structured content shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// History plus system prompt cannot fit the model's context window
    #[error("context overflow: {required} tokens required, window is {window}")]
    ContextOverflow { required: usize, window: usize },
}

/// The change watcher could not be established.
#[derive(Error, Debug)]
#[error("cannot watch {root}: {reason}")]
pub struct WatchSetupError {
    pub root: PathBuf,
    pub reason: String,
}

/// Writing the conversation log failed.
#[derive(Error, Debug)]
#[error("failed to persist conversation to {path}: {source}")]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Invalid backend or agent configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is missing or empty
    #[error("backend '{backend}' requires '{field}'")]
    Missing { backend: String, field: String },

    /// The selected backend was compiled out
    #[error("backend '{backend}' needs the '{feature}' cargo feature")]
    FeatureDisabled { backend: String, feature: String },

    /// The backend could not be initialised
    #[cfg_attr(not(feature = "llama"), allow(dead_code))]
    #[error("failed to initialise backend '{backend}': {reason}")]
    Init { backend: String, reason: String },
}

/// Tool invocation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The model asked for a tool that is not registered
    #[error("unknown tool: {0}")]
    Unknown(String),

    /// Arguments did not match the tool's parameters
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}
