//! Interactive session

use colored::*;
use eyre::{Context, Result};
use std::fs;
use std::sync::Arc;

use crate::agent::Agent;
use crate::backend::{self, InferOptions};
use crate::cli::ChatArgs;
use crate::config::{BackendKind, Config};
use crate::conversation::Conversation;
use crate::error::ConfigError;
use crate::memory::MemoryStore;
use crate::persona::{PersonaLoader, PersonaRegistry};

pub async fn run(args: ChatArgs, config: &Config) -> Result<()> {
    let kind = match &args.backend {
        Some(name) => BackendKind::parse(name).ok_or_else(|| eyre::eyre!("Unknown backend: {}", name))?,
        None => config.backend,
    };

    let memories_dir = Config::expand_path(&config.paths.memories);
    let personas_dir = Config::expand_path(&config.paths.personas);
    let conversations_dir = Config::expand_path(&config.paths.conversations);

    // the watcher needs the root to exist
    if let Err(e) = fs::create_dir_all(&memories_dir) {
        log::warn!("Failed to create memories directory {}: {}", memories_dir.display(), e);
    }

    let definitions = PersonaLoader::new(personas_dir).load_all()?;
    let default = args.persona.as_deref().unwrap_or(&config.persona.default);
    let registry = PersonaRegistry::new(definitions, MemoryStore::new(memories_dir), default)
        .context("Failed to resolve the default persona")?;

    let backends = config.backends.clone();
    let timeout = config.inference.timeout();
    let backend = tokio::task::spawn_blocking(move || {
        let backend = backend::build(kind, &backends, timeout)?;
        log::info!("Available models: {}", backend.available_models().join(", "));
        Ok::<_, ConfigError>(backend)
    })
    .await
    .context("Backend initialization panicked")?
    .with_context(|| format!("Failed to initialize {} backend", kind.as_str()))?;

    let record = config.conversation.record && !args.no_record;
    let conversation = match &args.resume {
        Some(path) => Conversation::resume(&Config::expand_path(path), record)?,
        None if record => Conversation::recorded(&conversations_dir),
        None => Conversation::new(),
    };
    if args.resume.is_some() {
        println!("{} {} entries", "Resumed".dimmed(), conversation.len());
    }
    if let Some(path) = conversation.path() {
        log::info!("Recording conversation to {}", path.display());
    }

    let options = InferOptions {
        temperature: config.inference.temperature,
        max_tokens: config.inference.max_tokens,
        timeout,
        ..InferOptions::default()
    };

    let mut agent = Agent::new(Arc::new(registry), backend, conversation)
        .with_options(options)
        .unrecoverable(config.inference.unrecoverable)
        .watch_interval(config.watcher.interval());

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    agent.run(tokio::io::stdin(), tokio::io::stdout(), interrupt).await?;
    log::debug!("Agent {:?} after {} tokens", agent.state(), agent.usage().total_tokens);

    if let Some(path) = agent.conversation().path().filter(|p| p.exists()) {
        println!("{} {}", "Conversation saved to".dimmed(), path.display());
    }
    Ok(())
}
