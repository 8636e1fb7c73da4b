//! In-process llama.cpp backend
//!
//! Loads a GGUF model once and runs each request in a fresh session over a
//! ChatML transcript. Only compiled with the `llama` feature; the transcript
//! rendering is always available.

use super::{Message, Role};
use crate::error::InferenceError;

const IM_START: &str = "<|im_start|>";
const IM_END: &str = "<|im_end|>";

/// One ChatML turn, framing included
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
fn render_turn(message: &Message) -> String {
    format!("{}{}\n{}{}\n", IM_START, message.role.as_str(), message.content, IM_END)
}

/// Render messages as a ChatML prompt ending in an open assistant turn
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
pub fn render_chatml(messages: &[Message]) -> String {
    let mut prompt: String = messages.iter().map(render_turn).collect();
    prompt.push_str(IM_START);
    prompt.push_str(Role::Assistant.as_str());
    prompt.push('\n');
    prompt
}

/// The rendered prompt plus the completion reserve must fit the window
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
fn check_budget(prompt_tokens: usize, reserve: usize, window: usize) -> Result<(), InferenceError> {
    if prompt_tokens + reserve > window {
        return Err(InferenceError::ContextOverflow {
            required: prompt_tokens + reserve,
            window,
        });
    }
    Ok(())
}

/// Cut generated text at the first stop marker
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
fn truncate_at_stop(text: &str, stop: &[String]) -> Option<usize> {
    std::iter::once(IM_END)
        .chain(stop.iter().map(String::as_str))
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s))
        .min()
}

#[cfg(feature = "llama")]
pub use imp::LlamaCppBackend;

#[cfg(feature = "llama")]
mod imp {
    use llama_cpp::standard_sampler::{SamplerStage, StandardSampler};
    use llama_cpp::{LlamaModel, LlamaParams, SessionParams};

    use super::super::window;
    use super::super::{Backend, BackendResponse, InferOptions, Message, Usage};
    use super::{check_budget, render_chatml, render_turn, truncate_at_stop};
    use crate::config::LlamaCppConfig;
    use crate::error::{ConfigError, InferenceError};
    use crate::tools::ToolDefinition;

    pub struct LlamaCppBackend {
        model: LlamaModel,
        model_name: String,
        threads: u32,
        context_window: usize,
    }

    impl LlamaCppBackend {
        pub fn new(config: &LlamaCppConfig) -> Result<Self, ConfigError> {
            if !config.model_path.is_file() {
                return Err(ConfigError::Missing {
                    backend: "llama_cpp".to_string(),
                    field: format!("model_path ({} not found)", config.model_path.display()),
                });
            }

            log::info!("Loading model from {}", config.model_path.display());
            let model =
                LlamaModel::load_from_file(&config.model_path, LlamaParams::default()).map_err(|e| ConfigError::Init {
                    backend: "llama_cpp".to_string(),
                    reason: e.to_string(),
                })?;

            let context_window = config.context.unwrap_or_else(|| model.train_len());
            let model_name = config
                .model_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "model".to_string());

            log::info!(
                "Initialized llama.cpp backend with model: {}, context window: {}",
                model_name,
                context_window
            );
            if config.verbose {
                log::debug!("llama.cpp threads: {}", config.threads);
            }

            Ok(Self {
                model,
                model_name,
                threads: config.threads,
                context_window,
            })
        }

        /// Tokens of the message's rendered turn
        fn count_tokens(&self, message: &Message) -> usize {
            match self.model.tokenize_bytes(render_turn(message).as_bytes(), false, true) {
                Ok(tokens) => tokens.len(),
                Err(e) => {
                    log::debug!("Tokenizer failed, estimating instead: {}", e);
                    window::estimate_tokens(message)
                }
            }
        }
    }

    impl Backend for LlamaCppBackend {
        fn name(&self) -> &str {
            "llama_cpp"
        }

        fn current_model(&self) -> &str {
            &self.model_name
        }

        fn context_window(&self) -> usize {
            self.context_window
        }

        fn infer(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
            options: &InferOptions,
        ) -> Result<BackendResponse, InferenceError> {
            if !tools.is_empty() {
                log::debug!("llama_cpp does not support tool calls, ignoring {} tools", tools.len());
            }

            let reserve = window::completion_reserve(self.context_window, options.max_tokens);
            // the open assistant turn and BOS ride along with the history
            let header = self
                .model
                .tokenize_bytes(render_chatml(&[]).as_bytes(), true, true)
                .map(|t| t.len())
                .unwrap_or(window::MESSAGE_OVERHEAD);
            let fitted = window::fit(messages, self.context_window, reserve + header, |m| self.count_tokens(m))?;
            let prompt = render_chatml(&fitted);

            let prompt_tokens = self
                .model
                .tokenize_bytes(prompt.as_bytes(), true, true)
                .map(|t| t.len())
                .map_err(|e| InferenceError::TransportFailure(format!("tokenizer failed: {}", e)))?;
            check_budget(prompt_tokens, reserve, self.context_window)?;

            let mut params = SessionParams::default();
            params.n_ctx = self.context_window as u32;
            params.n_threads = self.threads;
            params.n_threads_batch = self.threads;

            let mut session = self
                .model
                .create_session(params)
                .map_err(|e| InferenceError::TransportFailure(e.to_string()))?;
            session
                .advance_context(&prompt)
                .map_err(|e| InferenceError::TransportFailure(e.to_string()))?;

            let sampler = StandardSampler::new_softmax(vec![SamplerStage::Temperature(options.temperature)], 1);
            let completions = session
                .start_completing_with(sampler, reserve)
                .map_err(|e| InferenceError::TransportFailure(e.to_string()))?;

            let mut output = String::new();
            let mut completion_tokens = 0u64;
            for piece in completions.into_strings() {
                output.push_str(&piece);
                completion_tokens += 1;
                if let Some(end) = truncate_at_stop(&output, &options.stop) {
                    output.truncate(end);
                    break;
                }
            }

            log::debug!("Generated {} tokens", completion_tokens);
            BackendResponse::from_raw(&output, Vec::new(), Usage::new(prompt_tokens as u64, completion_tokens))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_chatml() {
        let messages = vec![
            Message::system("Be brief."),
            Message {
                role: Role::User,
                content: "Hello".to_string(),
            },
        ];

        assert_eq!(
            render_chatml(&messages),
            "<|im_start|>system\nBe brief.<|im_end|>\n<|im_start|>user\nHello<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_chatml(&[]), "<|im_start|>assistant\n");
    }

    #[test]
    fn test_turns_add_up_to_transcript() {
        let messages = vec![Message::system("sys"), Message::system("more")];
        let turns: String = messages.iter().map(render_turn).collect();
        assert_eq!(format!("{}<|im_start|>assistant\n", turns), render_chatml(&messages));
    }

    #[test]
    fn test_check_budget() {
        assert!(check_budget(96, 32, 128).is_ok());
        assert_eq!(
            check_budget(100, 32, 128).unwrap_err(),
            InferenceError::ContextOverflow {
                required: 132,
                window: 128,
            }
        );
    }

    #[test]
    fn test_truncate_at_stop() {
        assert_eq!(truncate_at_stop("{\"text\": \"hi\"}<|im_end|>junk", &[]), Some(14));
        assert_eq!(truncate_at_stop("answer\nUser: more", &["User:".to_string()]), Some(7));
        assert_eq!(truncate_at_stop("no markers", &[String::new()]), None);
    }
}
