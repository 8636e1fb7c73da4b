//! REPL command parsing

/// One operator line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line
    Empty,
    Clear,
    History,
    Tools,
    Prompt,
    Modes,
    /// `switch` with no name still parses so the usage can be shown
    Switch(Option<String>),
    Exit,
    /// Anything that is not a command goes to the model
    Chat(String),
}

impl Command {
    /// Keywords are matched case-insensitively against the trimmed line
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        match (keyword.to_lowercase().as_str(), rest.is_empty()) {
            ("clear", true) => Command::Clear,
            ("history", true) => Command::History,
            ("tools", true) => Command::Tools,
            ("prompt", true) => Command::Prompt,
            ("modes" | "mode", true) => Command::Modes,
            ("exit" | "quit", true) => Command::Exit,
            ("switch", true) => Command::Switch(None),
            // persona names are single words
            ("switch", false) if !rest.contains(char::is_whitespace) => Command::Switch(Some(rest.to_string())),
            _ => Command::Chat(line.to_string()),
        }
    }
}
