//! Persona memories
//!
//! Memories are plain text files injected into a persona's system prompt.
//! Layout: `<root>/<persona>/<NNN_description>.<ext>`, ordered by file name.
//! Nothing is cached; every call reads the directory again, which is what
//! lets an edited file show up on the next rebuild.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::MemoryReadError;

/// One memory file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFragment {
    /// File name, also the sort key
    pub name: String,
    pub content: String,
}

impl MemoryFragment {
    /// Wrap the fragment in the injected-memory delimiter
    pub fn wrap(&self) -> String {
        format!(
            "<memory name=\"{}\">\n{}\n</memory>",
            self.name,
            self.content.trim_end_matches(['\n', '\r'])
        )
    }
}

/// Reads memory fragments from a per-persona directory tree
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: PathBuf,
}

impl MemoryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a persona's memories
    pub fn persona_dir(&self, persona: &str) -> PathBuf {
        self.root.join(persona)
    }

    /// Fragments for a persona, sorted by file name
    ///
    /// A missing directory yields no fragments. Files that cannot be read are
    /// logged and skipped.
    pub fn fragments(&self, persona: &str) -> Vec<MemoryFragment> {
        let dir = self.persona_dir(persona);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if dir.exists() {
                    log::warn!("Failed to list memories in {}: {}", dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| !is_hidden(path))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut fragments = Vec::with_capacity(paths.len());
        for path in paths {
            match read_fragment(&path) {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => log::warn!("Skipping memory: {}", e),
            }
        }

        log::debug!("Loaded {} memories for persona '{}'", fragments.len(), persona);
        fragments
    }

    /// The injectable memory block for a persona; empty when there are no memories
    pub fn inject(&self, persona: &str) -> String {
        self.fragments(persona)
            .iter()
            .map(MemoryFragment::wrap)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Persona owning a path under the memory root
    pub fn persona_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        match relative.components().next()? {
            Component::Normal(name) => name.to_str().map(str::to_string),
            _ => None,
        }
    }
}

fn read_fragment(path: &Path) -> Result<MemoryFragment, MemoryReadError> {
    let content = fs::read_to_string(path).map_err(|source| MemoryReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(MemoryFragment { name, content })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
