//! Persona definitions and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_PROMPT: &str = "You are an expert assistant named ADA.
Your primary task is answering USER queries.
Respond concisely while returning critical information.
Respond only in json using the optional keys: [\"text\", \"code\"] or with available tool calls.
Only respond with code if prompted for source code.";

const JESTER_PROMPT: &str = "Respond only in rhyme.
Occasionally, add a joke.
Occasionally, speak in pig-latin.";

/// A persona as declared, before memories are injected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    /// Persona name (e.g., "default", "jester")
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Base system prompt template
    pub prompt: String,
}

impl PersonaDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: prompt.into(),
        }
    }

    /// Personas compiled into the binary
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::new("default", "The standard expert assistant.", DEFAULT_PROMPT),
            Self::new(
                "jester",
                "The standard expert assistant, but as a joke.",
                format!("{}\n{}", DEFAULT_PROMPT, JESTER_PROMPT),
            ),
        ]
    }
}

/// A persona with its memories materialized into the system prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub base_prompt: String,
    pub materialized_prompt: String,
}

impl Persona {
    /// Compose the system prompt from a definition and a memory block
    ///
    /// An empty memory block leaves the base prompt untouched.
    pub fn materialize(definition: &PersonaDefinition, memory_block: &str) -> Self {
        let materialized_prompt = if memory_block.is_empty() {
            definition.prompt.clone()
        } else {
            format!("{}\n\n{}", definition.prompt, memory_block)
        };

        Self {
            name: definition.name.clone(),
            description: definition.description.clone(),
            base_prompt: definition.prompt.clone(),
            materialized_prompt,
        }
    }

    /// Bytes the memory block added to the base prompt
    pub fn memory_len(&self) -> usize {
        self.materialized_prompt.len().saturating_sub(self.base_prompt.len())
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Persona({})", self.name)
    }
}

/// Loads persona definitions from YAML files
pub struct PersonaLoader {
    personas_dir: PathBuf,
}

impl PersonaLoader {
    pub fn new(personas_dir: PathBuf) -> Self {
        Self { personas_dir }
    }

    /// Built-in personas merged with the YAML files in the personas directory
    ///
    /// A file persona replaces a built-in of the same name in place; new names
    /// are appended in file-name order.
    pub fn load_all(&self) -> Result<Vec<PersonaDefinition>> {
        let mut definitions = PersonaDefinition::builtins();

        for definition in self.load_dir()? {
            match definitions.iter_mut().find(|d| d.name == definition.name) {
                Some(existing) => {
                    log::info!("Persona '{}' overridden from {}", definition.name, self.personas_dir.display());
                    *existing = definition;
                }
                None => definitions.push(definition),
            }
        }

        Ok(definitions)
    }

    fn load_dir(&self) -> Result<Vec<PersonaDefinition>> {
        let mut found = Vec::new();

        if !self.personas_dir.exists() {
            return Ok(found);
        }

        let entries = fs::read_dir(&self.personas_dir)
            .with_context(|| format!("Failed to read personas directory: {}", self.personas_dir.display()))?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "yaml" || e == "yml").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            match self.load_persona(&path) {
                Ok(definition) => found.push(definition),
                Err(e) => {
                    log::warn!("Failed to load persona from {}: {}", path.display(), e);
                }
            }
        }

        Ok(found)
    }

    /// Load a single persona from a file
    pub fn load_persona(&self, path: &Path) -> Result<PersonaDefinition> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read persona file: {}", path.display()))?;

        let definition: PersonaDefinition = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse persona file: {}", path.display()))?;

        if definition.name.trim().is_empty() {
            eyre::bail!("Persona in {} has an empty name", path.display());
        }

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_contain_default() {
        let builtins = PersonaDefinition::builtins();
        assert_eq!(builtins[0].name, "default");
        assert!(builtins.iter().any(|d| d.name == "jester"));
    }

    #[test]
    fn test_jester_extends_default() {
        let builtins = PersonaDefinition::builtins();
        let jester = builtins.iter().find(|d| d.name == "jester").unwrap();
        assert!(jester.prompt.starts_with(DEFAULT_PROMPT));
        assert!(jester.prompt.contains("rhyme"));
    }

    #[test]
    fn test_materialize_without_memories() {
        let definition = PersonaDefinition::new("default", "", "base");
        let persona = Persona::materialize(&definition, "");
        assert_eq!(persona.materialized_prompt, "base");
        assert_eq!(persona.base_prompt, "base");
    }

    #[test]
    fn test_materialize_with_memories() {
        let definition = PersonaDefinition::new("default", "", "base");
        let persona = Persona::materialize(&definition, "<memory name=\"a\">\nx\n</memory>");
        assert_eq!(persona.materialized_prompt, "base\n\n<memory name=\"a\">\nx\n</memory>");
    }

    #[test]
    fn test_persona_deserialize() {
        let yaml = r#"
name: pirate
description: Talks like a pirate
prompt: |
  You are a pirate.
"#;
        let definition: PersonaDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definition.name, "pirate");
        assert_eq!(definition.prompt, "You are a pirate.\n");
    }

    #[test]
    fn test_load_all_merges_and_overrides() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("pirate.yaml"), "name: pirate\nprompt: Arr.\n").unwrap();
        fs::write(temp.path().join("jester.yml"), "name: jester\nprompt: Just jokes.\n").unwrap();
        fs::write(temp.path().join("broken.yaml"), "name: [unclosed\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let loader = PersonaLoader::new(temp.path().to_path_buf());
        let definitions = loader.load_all().unwrap();
        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names, vec!["default", "jester", "pirate"]);
        assert_eq!(definitions[1].prompt, "Just jokes.");
    }

    #[test]
    fn test_load_all_missing_dir() {
        let loader = PersonaLoader::new(PathBuf::from("/nonexistent/personas"));
        let definitions = loader.load_all().unwrap();
        assert_eq!(definitions.len(), PersonaDefinition::builtins().len());
    }
}
