use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ada",
    about = "A REPL agent with swappable model backends, personas and hot-reloaded memories",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/ada/logs/ada.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to ada.yaml config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose (debug) logging")]
    pub verbose: bool,

    /// Defaults to `chat`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive session
    Chat(ChatArgs),

    /// List personas and their memories
    Personas,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ChatArgs {
    /// Persona to start with (overrides persona.default)
    #[arg(short, long)]
    pub persona: Option<String>,

    /// Backend to use: llama_cpp or ollama (overrides backend)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Continue a saved conversation log
    #[arg(short, long)]
    pub resume: Option<PathBuf>,

    /// Do not write the conversation to disk
    #[arg(long)]
    pub no_record: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_chat() {
        let cli = Cli::try_parse_from(["ada"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_chat_args() {
        let cli = Cli::try_parse_from([
            "ada",
            "--verbose",
            "chat",
            "--persona",
            "jester",
            "--backend",
            "llama_cpp",
            "--no-record",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Some(Commands::Chat(args)) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.persona.as_deref(), Some("jester"));
        assert_eq!(args.backend.as_deref(), Some("llama_cpp"));
        assert!(args.no_record);
        assert!(args.resume.is_none());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["ada", "personas", "--config", "/tmp/ada.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ada.yaml")));
        assert!(matches!(cli.command, Some(Commands::Personas)));
    }

    #[test]
    fn test_completions_shell() {
        let cli = Cli::try_parse_from(["ada", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions {
                shell: clap_complete::Shell::Bash
            })
        ));
    }
}
