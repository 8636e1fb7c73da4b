//! Ollama backend
//!
//! Talks to a separately running `ollama serve` over its HTTP API:
//! `/api/chat` for inference, `/api/show` for the context window and
//! `/api/tags` for the installed models.

use serde_json::{Value, json};
use std::time::Duration;

use super::window;
use super::{Backend, BackendResponse, DEFAULT_CONTEXT_WINDOW, InferOptions, Message, ToolCall, Usage};
use crate::config::OllamaConfig;
use crate::error::{ConfigError, InferenceError};
use crate::tools::ToolDefinition;

pub struct OllamaBackend {
    model: String,
    url: String,
    agent: ureq::Agent,
    timeout: Duration,
    context_window: usize,
    verbose: bool,
}

impl OllamaBackend {
    /// Connect settings and read the model's context window from the server
    ///
    /// An unreachable server is not fatal here; the window falls back to the
    /// default and the first chat call reports the transport failure.
    pub fn new(config: &OllamaConfig, timeout: Duration) -> Result<Self, ConfigError> {
        if config.model.trim().is_empty() {
            return Err(ConfigError::Missing {
                backend: "ollama".to_string(),
                field: "model".to_string(),
            });
        }
        if config.url.trim().is_empty() {
            return Err(ConfigError::Missing {
                backend: "ollama".to_string(),
                field: "url".to_string(),
            });
        }

        // error statuses carry an `{"error": ...}` body worth reporting
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let mut backend = Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            agent,
            timeout,
            context_window: DEFAULT_CONTEXT_WINDOW,
            verbose: config.verbose,
        };
        backend.context_window = backend.fetch_context_window();

        log::info!(
            "Initialized Ollama backend with model: {}, url: {}, context window: {}",
            backend.model,
            backend.url,
            backend.context_window
        );
        Ok(backend)
    }

    fn fetch_context_window(&self) -> usize {
        match self.post("/api/show", &json!({ "model": self.model })) {
            Ok(info) => context_window_from_show(&info).unwrap_or_else(|| {
                log::debug!("No context length in model metadata, defaulting to {}", DEFAULT_CONTEXT_WINDOW);
                DEFAULT_CONTEXT_WINDOW
            }),
            Err(e) => {
                log::warn!(
                    "Failed to get context window from Ollama: {}, defaulting to {}",
                    e,
                    DEFAULT_CONTEXT_WINDOW
                );
                DEFAULT_CONTEXT_WINDOW
            }
        }
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, InferenceError> {
        let url = format!("{}{}", self.url, path);
        let payload = serde_json::to_string(body).map_err(|e| InferenceError::TransportFailure(e.to_string()))?;

        if self.verbose {
            log::debug!("POST {} {}", url, payload);
        }

        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(payload.as_bytes())
            .map_err(|e| self.transport_error(e))?;

        self.read_json(path, response)
    }

    fn get(&self, path: &str) -> Result<Value, InferenceError> {
        let url = format!("{}{}", self.url, path);

        let response = self.agent.get(&url).call().map_err(|e| self.transport_error(e))?;
        self.read_json(path, response)
    }

    fn read_json(&self, path: &str, mut response: ureq::http::Response<ureq::Body>) -> Result<Value, InferenceError> {
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| self.transport_error(e))?;

        if status >= 400 {
            return Err(status_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| InferenceError::MalformedResponse(format!("invalid JSON from {}: {}", path, e)))
    }

    fn transport_error(&self, error: ureq::Error) -> InferenceError {
        match error {
            ureq::Error::Timeout(_) => InferenceError::Timeout(self.timeout),
            ureq::Error::StatusCode(code) => InferenceError::TransportFailure(format!("ollama returned HTTP {}", code)),
            other => InferenceError::TransportFailure(other.to_string()),
        }
    }

    /// Body for `/api/chat`
    pub fn chat_request(&self, messages: &[Message], tools: &[ToolDefinition], options: &InferOptions) -> Value {
        let mut generation = json!({ "temperature": options.temperature });
        if !options.stop.is_empty() {
            generation["stop"] = json!(options.stop);
        }
        // Ollama calls it num_predict
        if let Some(max_tokens) = options.max_tokens {
            generation["num_predict"] = json!(max_tokens);
        }

        let mut request = json!({
            "model": self.model,
            "messages": messages,
            "options": generation,
            "stream": false,
        });
        if !tools.is_empty() {
            request["tools"] = json!(tools);
        }
        if options.json_mode {
            request["format"] = json!("json");
        }
        request
    }
}

impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn current_model(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn available_models(&self) -> Vec<String> {
        match self.get("/api/tags") {
            Ok(tags) => {
                let models: Vec<String> = tags["models"]
                    .as_array()
                    .map(|models| {
                        models
                            .iter()
                            .filter_map(|m| m["name"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                if models.is_empty() { vec![self.model.clone()] } else { models }
            }
            Err(e) => {
                log::warn!("Failed to list models from Ollama server: {}", e);
                vec![self.model.clone()]
            }
        }
    }

    fn infer(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &InferOptions,
    ) -> Result<BackendResponse, InferenceError> {
        let reserve = window::completion_reserve(self.context_window, options.max_tokens);
        let fitted = window::fit(messages, self.context_window, reserve, window::estimate_tokens)?;

        log::debug!("Generating completion with {} messages", fitted.len());

        let response = self.post("/api/chat", &self.chat_request(&fitted, tools, options))?;
        convert_response(&response)
    }
}

/// Error for a non-success HTTP status, using Ollama's `error` message when present
pub fn status_error(status: u16, body: &str) -> InferenceError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        InferenceError::TransportFailure(format!("ollama returned HTTP {}", status))
    } else {
        InferenceError::TransportFailure(format!("ollama returned HTTP {}: {}", status, message))
    }
}

/// Normalize an `/api/chat` response
pub fn convert_response(response: &Value) -> Result<BackendResponse, InferenceError> {
    if let Some(error) = response["error"].as_str() {
        return Err(InferenceError::TransportFailure(format!("ollama: {}", error)));
    }

    let message = response
        .get("message")
        .ok_or_else(|| InferenceError::MalformedResponse("response has no message".to_string()))?;

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| calls.iter().map(convert_tool_call).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    let usage = Usage::new(
        response["prompt_eval_count"].as_u64().unwrap_or(0),
        response["eval_count"].as_u64().unwrap_or(0),
    );

    let content = message["content"].as_str().unwrap_or("");
    BackendResponse::from_raw(content, tool_calls, usage)
}

fn convert_tool_call(call: &Value) -> Result<ToolCall, InferenceError> {
    let function = &call["function"];
    let name = function["name"]
        .as_str()
        .ok_or_else(|| InferenceError::MalformedResponse("tool call without a function name".to_string()))?;

    // Arguments arrive as an object, some models send a JSON string instead
    let arguments = match &function["arguments"] {
        Value::String(encoded) => serde_json::from_str(encoded)
            .map_err(|e| InferenceError::MalformedResponse(format!("bad arguments for {}: {}", name, e)))?,
        Value::Null => json!({}),
        other => other.clone(),
    };

    Ok(ToolCall {
        name: name.to_string(),
        arguments,
    })
}

/// Context length from an `/api/show` response
pub fn context_window_from_show(info: &Value) -> Option<usize> {
    if let Some(model_info) = info["model_info"].as_object() {
        if let Some(n) = model_info.get("num_ctx").and_then(Value::as_u64) {
            return Some(n as usize);
        }
        // e.g. "llama.context_length"
        if let Some(n) = model_info
            .iter()
            .find(|(key, _)| key.ends_with("context_length"))
            .and_then(|(_, v)| v.as_u64())
        {
            return Some(n as usize);
        }
    }

    // "parameters" is a text block of `name value` lines
    info["parameters"].as_str().and_then(|params| {
        params.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("num_ctx"), Some(value)) => value.parse().ok(),
                _ => None,
            }
        })
    })
}
