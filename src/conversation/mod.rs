//! Conversation log
//!
//! An append-only transcript of the session. When recording is enabled the
//! whole log is rewritten after every append to
//! `<conversations>/<YYYY-MM-DDTHH-MM-SS-mmm>-<pid>.json` through a temp file
//! and an atomic rename, so a crash never leaves a partial trailing entry.

use chrono::{DateTime, Local, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::{BackendResponse, Message, Role};
use crate::error::PersistenceError;

pub const USER_AUTHOR: &str = "USER";
pub const AGENT_AUTHOR: &str = "ADA";

/// Sessions recorded by this process
static RECORDED: AtomicU32 = AtomicU32::new(0);

/// One recorded turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub role: Role,
    /// Display label
    pub author: String,
    /// Display text
    pub content: String,
    /// Structured text the model produced, sent back instead of `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            author: USER_AUTHOR.to_string(),
            content: content.into(),
            raw: None,
            timestamp: Utc::now(),
        }
    }

    /// Assistant entry carrying the display body and the model's raw JSON
    pub fn assistant(response: &BackendResponse) -> Self {
        Self {
            role: Role::Assistant,
            author: AGENT_AUTHOR.to_string(),
            content: response.body(),
            raw: Some(response.raw.clone()),
            timestamp: Utc::now(),
        }
    }

    /// The message handed to a backend
    pub fn message(&self) -> Message {
        Message {
            role: self.role,
            content: self.raw.clone().unwrap_or_else(|| self.content.clone()),
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.author, self.content)
    }
}

/// Ordered session transcript
#[derive(Debug, Default)]
pub struct Conversation {
    /// Every entry of the session, including cleared ones
    log: Vec<Entry>,
    /// Start of the visible transcript; `clear` moves it to the end of `log`
    visible_from: usize,
    /// Where the log is persisted; `None` when recording is off
    path: Option<PathBuf>,
}

impl Conversation {
    /// In-memory conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation persisted to a fresh timestamped file under `dir`
    pub fn recorded(dir: &Path) -> Self {
        let mut name = format!("{}-{}", Local::now().format("%Y-%m-%dT%H-%M-%S-%3f"), std::process::id());
        let seq = RECORDED.fetch_add(1, Ordering::Relaxed);
        if seq > 0 {
            name.push_str(&format!("-{}", seq));
        }
        Self {
            path: Some(dir.join(format!("{}.json", name))),
            ..Self::default()
        }
    }

    /// Rehydrate from a persisted log, continuing to record into it when `record` is set
    pub fn resume(path: &Path, record: bool) -> eyre::Result<Self> {
        use eyre::Context;

        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read conversation: {}", path.display()))?;
        let log: Vec<Entry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse conversation: {}", path.display()))?;

        log::info!("Resumed {} entries from {}", log.len(), path.display());
        Ok(Self {
            log,
            visible_from: 0,
            path: record.then(|| path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an entry, persisting when recording
    ///
    /// A failed write is logged; the entry stays in memory either way.
    pub fn append(&mut self, entry: Entry) {
        self.log.push(entry);
        if let Err(e) = self.persist() {
            log::warn!("{}", e);
        }
    }

    /// Empty the transcript; the persisted file keeps its history
    pub fn clear(&mut self) {
        if self.path.is_none() {
            self.log.clear();
        }
        self.visible_from = self.log.len();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.log[self.visible_from..]
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Messages for a backend request, in transcript order
    pub fn messages(&self) -> Vec<Message> {
        self.entries().iter().map(Entry::message).collect()
    }

    /// Rewrite the persisted log atomically
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let wrap = |source: std::io::Error| PersistenceError {
            path: path.clone(),
            source,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(wrap)?;

        let json = serde_json::to_string_pretty(&self.log).map_err(|e| wrap(e.into()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(wrap)?;
        tmp.write_all(json.as_bytes()).map_err(wrap)?;
        tmp.as_file().sync_all().map_err(wrap)?;
        tmp.persist(path).map_err(|e| wrap(e.error))?;

        log::debug!("Persisted {} entries to {}", self.log.len(), path.display());
        Ok(())
    }

    /// Render the transcript between banners
    pub fn render(&self) -> String {
        let mut output = String::new();
        output.push_str(&block("HISTORY START"));
        for entry in self.entries() {
            let author = match entry.role {
                Role::User => entry.author.cyan(),
                _ => entry.author.green(),
            };
            output.push_str(&format!("{}: {}\n", author.bold(), entry.content));
        }
        output.push_str(&block("HISTORY END"));
        output.trim_end().to_string()
    }
}

/// Centered banner between two rules
pub fn block(text: &str) -> String {
    let rule = "*".repeat(20);
    format!("{rule}\n{:*^20}\n{rule}\n", format!(" {} ", text))
}
