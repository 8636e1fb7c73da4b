use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main ada configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Which entry of `backends` is active
    pub backend: BackendKind,
    pub backends: BackendsConfig,
    pub inference: InferenceConfig,
    pub persona: PersonaConfig,
    pub paths: PathsConfig,
    pub conversation: ConversationConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Backend variants
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process GGUF model through llama.cpp
    LlamaCpp,
    /// Separately running Ollama server
    #[default]
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "llama_cpp",
            BackendKind::Ollama => "ollama",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('-', "_").as_str() {
            "llama_cpp" | "llamacpp" | "llama" => Some(Self::LlamaCpp),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub llama_cpp: LlamaCppConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlamaCppConfig {
    /// Path to a GGUF model file
    pub model_path: PathBuf,
    pub threads: u32,
    /// Overrides the context length read from model metadata
    pub context: Option<usize>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub url: String,
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Stop the session on the first inference failure
    pub unrecoverable: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Persona active at startup
    pub default: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub memories: PathBuf,
    pub personas: PathBuf,
    pub conversations: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Persist the conversation after every append
    pub record: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            backend: BackendKind::default(),
            backends: BackendsConfig::default(),
            inference: InferenceConfig::default(),
            persona: PersonaConfig::default(),
            paths: PathsConfig::default(),
            conversation: ConversationConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for LlamaCppConfig {
    fn default() -> Self {
        Self {
            model_path: Config::ada_dir().join("models").join("model.gguf"),
            threads: 4,
            context: None,
            verbose: false,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            url: "http://localhost:11434".to_string(),
            verbose: false,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            temperature: 0.7,
            max_tokens: None,
            unrecoverable: false,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            default: "default".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let ada_dir = Config::ada_dir();
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("ada");

        Self {
            memories: ada_dir.join("memories"),
            personas: ada_dir.join("personas"),
            conversations: data_dir.join("conversations"),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { record: true }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(10))
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("ADA_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from ADA_CONFIG: {}", e);
                    }
                }
            }
        }

        if let Ok(ada_dir) = std::env::var("ADA_DIR") {
            let path = PathBuf::from(ada_dir).join("ada.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from ADA_DIR: {}", e);
                    }
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("ada").join("ada.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // ./ada.yaml for development
        let local_config = PathBuf::from("ada.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Get the ada directory (memories, personas and models live here)
    pub fn ada_dir() -> PathBuf {
        std::env::var("ADA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ada"))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}
