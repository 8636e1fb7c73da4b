use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod agent;
mod backend;
mod cli;
mod commands;
mod config;
mod conversation;
mod error;
mod memory;
mod persona;
mod tools;
mod watcher;

use cli::{ChatArgs, Cli, Commands};
use config::{Config, LogLevel};

fn setup_logging(log_level: &LogLevel, verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ada")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ada.log");

    // Log to a file so the REPL output stays clean
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();

    let source = if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
        "RUST_LOG env"
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
        "--verbose"
    } else {
        builder.filter_level(log_level.as_filter());
        "config"
    };

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!("Log level: {} (from {})", log::max_level(), source);
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        None => commands::chat::run(ChatArgs::default(), &config).await,
        Some(Commands::Chat(args)) => commands::chat::run(args, &config).await,
        Some(Commands::Personas) => commands::personas::run(&config),
        Some(Commands::Completions { shell }) => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with log level from config (or RUST_LOG env var)
    setup_logging(&config.log_level, cli.verbose).context("Failed to setup logging")?;

    info!("Starting ada {} with config from: {:?}", env!("CARGO_PKG_VERSION"), cli.config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let result = runtime.block_on(run(cli, config));

    // a pending stdin read or an abandoned inference call must not hold up exit
    runtime.shutdown_background();

    result.context("Command failed")
}
