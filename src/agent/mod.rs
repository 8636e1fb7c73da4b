//! The REPL agent
//!
//! Two loops share one persona registry:
//! - the input loop reads operator lines, runs commands and inference
//! - the watch loop rebuilds personas when their memory files change
//!
//! Inference runs on the blocking pool under a timeout. The prompt snapshot is
//! taken when the request is built, so a rebuild that lands mid-call shows up
//! on the next turn.
//!
//! An interrupt ends the session like `exit`. A call already in flight is
//! awaited and its reply recorded before the loop stops.

use colored::*;
use eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;

pub mod command;
pub mod watch_loop;

pub use command::Command;
pub use watch_loop::WatchLoop;

use crate::backend::{Backend, BackendResponse, InferOptions, Message, Usage};
use crate::conversation::{AGENT_AUTHOR, Conversation, Entry, USER_AUTHOR};
use crate::error::InferenceError;
use crate::persona::PersonaRegistry;
use crate::tools::ToolBox;
use crate::watcher::ChangeWatcher;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Running,
    Stopped,
}

/// What the input loop does after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Print the text (if any) and read the next line
    Continue(String),
    /// Print the text and leave the loop
    Stop(String),
}

pub struct Agent {
    registry: Arc<PersonaRegistry>,
    backend: Arc<dyn Backend>,
    tools: ToolBox,
    conversation: Conversation,
    options: InferOptions,
    unrecoverable: bool,
    watch_interval: Duration,
    usage: Usage,
    state: AgentState,
}

impl Agent {
    pub fn new(registry: Arc<PersonaRegistry>, backend: Arc<dyn Backend>, conversation: Conversation) -> Self {
        Self {
            registry,
            backend,
            tools: ToolBox::default(),
            conversation,
            options: InferOptions::default(),
            unrecoverable: false,
            watch_interval: Duration::from_millis(500),
            usage: Usage::default(),
            state: AgentState::Idle,
        }
    }

    pub fn with_options(mut self, options: InferOptions) -> Self {
        self.options = options;
        self
    }

    /// End the session on the first inference failure
    pub fn unrecoverable(mut self, unrecoverable: bool) -> Self {
        self.unrecoverable = unrecoverable;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[cfg(test)]
    pub fn registry(&self) -> &Arc<PersonaRegistry> {
        &self.registry
    }

    /// Token usage across the session
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Run the session until `exit`, end of input, `interrupt` resolving or an
    /// unrecoverable error
    pub async fn run<R, W, I>(&mut self, input: R, mut output: W, interrupt: I) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        I: Future<Output = ()> + Send + 'static,
    {
        self.state = AgentState::Running;

        let (interrupt_tx, interrupted) = watch::channel(false);
        let interrupt_task = tokio::spawn(async move {
            interrupt.await;
            log::info!("Interrupt received, stopping after the current turn");
            let _ = interrupt_tx.send(true);
        });

        let watcher = ChangeWatcher::new(self.registry.memories().root().to_path_buf(), self.watch_interval);
        let watch_loop = match WatchLoop::spawn(Arc::clone(&self.registry), &watcher) {
            Ok(watch_loop) => Some(watch_loop),
            Err(e) => {
                log::warn!("{}; running without memory reload", e);
                None
            }
        };

        let result = self.input_loop(input, &mut output, interrupted).await;
        interrupt_task.abort();

        if let Some(watch_loop) = watch_loop {
            watch_loop.stop().await;
        }
        if !self.conversation.is_empty()
            && let Err(e) = self.conversation.persist()
        {
            log::warn!("{}", e);
        }

        log::info!(
            "Session ended: {} prompt + {} completion = {} tokens",
            self.usage.prompt_tokens,
            self.usage.completion_tokens,
            self.usage.total_tokens
        );
        self.state = AgentState::Stopped;
        result
    }

    async fn input_loop<R, W>(&mut self, input: R, output: &mut W, mut interrupted: watch::Receiver<bool>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();

        let banner = format!(
            "{} ({} on {}, {} token window, persona '{}', type 'exit' to quit)\n",
            "ADA Chat".bold(),
            self.backend.current_model(),
            self.backend.name(),
            self.backend.context_window(),
            self.registry.active_name()
        );
        output.write_all(banner.as_bytes()).await?;

        loop {
            output.write_all(format!("{}: ", USER_AUTHOR.cyan().bold()).as_bytes()).await?;
            output.flush().await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                Ok(_) = interrupted.wait_for(|stop| *stop) => None,
            };
            let Some(line) = line else {
                output.write_all(b"\n").await?;
                break;
            };

            let step = self.handle_line(&line).await;
            let stop = *interrupted.borrow();
            match step {
                Step::Continue(text) => {
                    if !text.is_empty() {
                        output.write_all(format!("{}\n", text).as_bytes()).await?;
                    }
                    if stop {
                        break;
                    }
                }
                Step::Stop(text) => {
                    output.write_all(format!("{}\n", text).as_bytes()).await?;
                    break;
                }
            }
        }

        output.flush().await?;
        Ok(())
    }

    /// Execute one operator line
    pub async fn handle_line(&mut self, line: &str) -> Step {
        match Command::parse(line) {
            Command::Empty => Step::Continue(String::new()),
            Command::Exit => Step::Stop(say("Goodbye")),
            Command::Clear => {
                self.conversation.clear();
                Step::Continue("Conversation cleared".dimmed().to_string())
            }
            Command::History => Step::Continue(self.conversation.render()),
            Command::Tools => Step::Continue(self.tools.list().join("\n")),
            Command::Prompt => Step::Continue(self.registry.active().materialized_prompt.clone()),
            Command::Modes => Step::Continue(self.modes()),
            Command::Switch(None) => Step::Continue(format!("{} switch <persona>", "usage:".yellow())),
            Command::Switch(Some(name)) => match self.registry.switch(&name) {
                Ok(persona) => Step::Continue(format!("Switched to {}", persona.name.green())),
                Err(e) => Step::Continue(format!(
                    "{} (available: {})",
                    error_line(&e),
                    self.registry.names().join(", ")
                )),
            },
            Command::Chat(text) => match self.chat(text).await {
                Ok(reply) => Step::Continue(reply),
                Err(e) if self.unrecoverable => {
                    log::error!("Inference failed, stopping: {}", e);
                    Step::Stop(error_line(&e))
                }
                Err(e) => {
                    log::warn!("Inference failed: {}", e);
                    Step::Continue(error_line(&e))
                }
            },
        }
    }

    fn modes(&self) -> String {
        let active = self.registry.active_name();
        self.registry
            .personas()
            .iter()
            .map(|persona| {
                let marker = if persona.name == active { "*" } else { " " };
                format!("{} {} - {}", marker, persona.name.bold(), persona.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One inference turn
    ///
    /// The user entry is appended first and stays even if the call fails.
    async fn chat(&mut self, text: String) -> Result<String, InferenceError> {
        self.conversation.append(Entry::user(text));

        let persona = self.registry.active();
        let mut messages = vec![Message::system(persona.materialized_prompt.clone())];
        messages.extend(self.conversation.messages());

        let response = self.infer(messages).await?;

        self.usage.add(&response.usage);
        log::info!(
            "Turn usage: {} prompt + {} completion tokens (session total {})",
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            self.usage.total_tokens
        );

        self.conversation.append(Entry::assistant(&response));
        Ok(self.display(&response))
    }

    async fn infer(&self, messages: Vec<Message>) -> Result<BackendResponse, InferenceError> {
        let backend = Arc::clone(&self.backend);
        let tools = self.tools.definitions();
        let options = self.options.clone();
        let timeout = self.options.timeout;

        log::debug!("Sending {} messages to {}", messages.len(), backend.name());
        let task = tokio::task::spawn_blocking(move || backend.infer(&messages, &tools, &options));

        // on timeout the blocking call runs on and its result is dropped
        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(InferenceError::Timeout(timeout)),
            Ok(Err(e)) => Err(InferenceError::TransportFailure(format!("inference task failed: {}", e))),
            Ok(Ok(result)) => result,
        }
    }

    /// Response body followed by the results of any tool calls
    fn display(&self, response: &BackendResponse) -> String {
        let mut lines = Vec::new();

        let body = response.body();
        if !body.is_empty() {
            lines.push(say(&body));
        }

        for call in &response.tool_calls {
            match self.tools.call(call) {
                Ok(result) => lines.push(format!("{} {}", format!("[{}]", call.name).dimmed(), result)),
                Err(e) => lines.push(error_line(&e)),
            }
        }

        lines.join("\n")
    }
}

fn say(text: &str) -> String {
    format!("{}: {}", AGENT_AUTHOR.green().bold(), text)
}

fn error_line(error: &dyn std::error::Error) -> String {
    format!("{} {}", "error:".red().bold(), error)
}
