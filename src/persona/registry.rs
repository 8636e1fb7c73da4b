//! Persona registry shared by the input and watch loops
//!
//! Personas are built from disk outside the lock and swapped in whole under
//! the write guard, so a reader either sees the previous `Arc<Persona>` or the
//! new one, never a mix.

use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::definition::{Persona, PersonaDefinition};
use crate::error::PersonaError;
use crate::memory::MemoryStore;

#[derive(Debug)]
struct RegistryState {
    personas: IndexMap<String, Arc<Persona>>,
    active: String,
}

/// Known personas and the active one
#[derive(Debug)]
pub struct PersonaRegistry {
    definitions: IndexMap<String, PersonaDefinition>,
    memories: MemoryStore,
    state: RwLock<RegistryState>,
}

impl PersonaRegistry {
    /// Build every persona from current disk state and activate `default`
    ///
    /// Fails when `default` is not among the definitions.
    pub fn new(
        definitions: Vec<PersonaDefinition>,
        memories: MemoryStore,
        default: &str,
    ) -> Result<Self, PersonaError> {
        let definitions: IndexMap<String, PersonaDefinition> =
            definitions.into_iter().map(|d| (d.name.clone(), d)).collect();

        if !definitions.contains_key(default) {
            return Err(PersonaError::Unknown {
                name: default.to_string(),
            });
        }

        let personas = definitions
            .values()
            .map(|d| (d.name.clone(), Arc::new(Persona::materialize(d, &memories.inject(&d.name)))))
            .collect();

        log::info!("Registered {} personas, active '{}'", definitions.len(), default);

        Ok(Self {
            definitions,
            memories,
            state: RwLock::new(RegistryState {
                personas,
                active: default.to_string(),
            }),
        })
    }

    pub fn memories(&self) -> &MemoryStore {
        &self.memories
    }

    /// Materialize a persona from its definition and the memories on disk now
    pub fn build(&self, name: &str) -> Result<Persona, PersonaError> {
        let definition = self.definitions.get(name).ok_or_else(|| PersonaError::Unknown {
            name: name.to_string(),
        })?;
        Ok(Persona::materialize(definition, &self.memories.inject(name)))
    }

    /// Make `name` active, rebuilt from current memories
    ///
    /// An unknown name leaves the registry untouched.
    pub fn switch(&self, name: &str) -> Result<Arc<Persona>, PersonaError> {
        let persona = Arc::new(self.build(name)?);

        let mut state = self.write();
        state.personas.insert(name.to_string(), Arc::clone(&persona));
        state.active = name.to_string();
        drop(state);

        log::info!("Switched to persona '{}'", name);
        Ok(persona)
    }

    /// Re-read memories for `name` and replace its stored entry
    ///
    /// Works for inactive personas too; the result is what they show when
    /// next switched to.
    pub fn rebuild(&self, name: &str) -> Result<Arc<Persona>, PersonaError> {
        let persona = Arc::new(self.build(name)?);

        self.write().personas.insert(name.to_string(), Arc::clone(&persona));

        log::info!("Rebuilt persona '{}' ({} bytes of memories)", name, persona.memory_len());
        Ok(persona)
    }

    /// Snapshot of the active persona
    pub fn active(&self) -> Arc<Persona> {
        let state = self.read();
        // `active` is only ever set to a key that was just inserted
        Arc::clone(&state.personas[state.active.as_str()])
    }

    pub fn active_name(&self) -> String {
        self.read().active.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Persona names in registration order
    pub fn names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    /// Stored snapshots in registration order
    pub fn personas(&self) -> Vec<Arc<Persona>> {
        self.read().personas.values().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn registry(root: &Path) -> PersonaRegistry {
        let definitions = vec![
            PersonaDefinition::new("default", "Default", "You are ADA."),
            PersonaDefinition::new("jester", "Jester", "You are ADA, in rhyme."),
        ];
        PersonaRegistry::new(definitions, MemoryStore::new(root.to_path_buf()), "default").unwrap()
    }

    fn write_memory(root: &Path, persona: &str, name: &str, content: &str) {
        let dir = root.join(persona);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_new_requires_default() {
        let temp = TempDir::new().unwrap();
        let result = PersonaRegistry::new(
            vec![PersonaDefinition::new("default", "", "x")],
            MemoryStore::new(temp.path().to_path_buf()),
            "missing",
        );
        assert_eq!(
            result.unwrap_err(),
            PersonaError::Unknown {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_build_without_memories_is_base_prompt() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());

        let persona = registry.build("default").unwrap();
        assert_eq!(persona.materialized_prompt, "You are ADA.");
        assert_eq!(registry.active().materialized_prompt, "You are ADA.");
    }

    #[test]
    fn test_build_unknown() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        assert!(matches!(registry.build("pirate"), Err(PersonaError::Unknown { .. })));
    }

    #[test]
    fn test_build_is_deterministic() {
        let temp = TempDir::new().unwrap();
        write_memory(temp.path(), "default", "001_a.txt", "alpha");
        write_memory(temp.path(), "default", "002_b.txt", "beta");
        let registry = registry(temp.path());

        assert_eq!(registry.build("default").unwrap(), registry.build("default").unwrap());
    }

    #[test]
    fn test_memory_order_is_lexicographic() {
        let temp = TempDir::new().unwrap();
        write_memory(temp.path(), "default", "002_b.txt", "second");
        write_memory(temp.path(), "default", "001_a.txt", "first");
        let registry = registry(temp.path());

        let prompt = registry.active().materialized_prompt.clone();
        assert!(prompt.find("first").unwrap() < prompt.find("second").unwrap());
    }

    #[test]
    fn test_switch_unknown_leaves_active() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());

        let err = registry.switch("pirate").unwrap_err();
        assert_eq!(
            err,
            PersonaError::Unknown {
                name: "pirate".to_string()
            }
        );
        assert_eq!(registry.active_name(), "default");

        // registry still usable after the failed attempt
        registry.switch("jester").unwrap();
        assert_eq!(registry.active_name(), "jester");
        registry.switch("default").unwrap();
        assert_eq!(registry.active_name(), "default");
    }

    #[test]
    fn test_switch_rebuilds_target() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        write_memory(temp.path(), "jester", "001_joke.txt", "knock knock");

        let persona = registry.switch("jester").unwrap();
        assert!(persona.materialized_prompt.contains("knock knock"));
        assert!(registry.active().materialized_prompt.contains("knock knock"));
    }

    #[test]
    fn test_rebuild_picks_up_new_memory() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        write_memory(temp.path(), "default", "001_x.txt", "hello");

        assert!(!registry.active().materialized_prompt.contains("hello"));
        registry.rebuild("default").unwrap();
        assert!(
            registry
                .active()
                .materialized_prompt
                .contains("<memory name=\"001_x.txt\">\nhello\n</memory>")
        );
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_memory(temp.path(), "default", "001_x.txt", "hello");
        let registry = registry(temp.path());

        let first = registry.rebuild("default").unwrap();
        let second = registry.rebuild("default").unwrap();
        assert_eq!(first.materialized_prompt, second.materialized_prompt);
    }

    #[test]
    fn test_rebuild_inactive_persona() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        write_memory(temp.path(), "jester", "001_joke.txt", "why did the crab");

        registry.rebuild("jester").unwrap();
        assert_eq!(registry.active_name(), "default");
        assert!(!registry.active().materialized_prompt.contains("crab"));

        let stored = registry.personas().into_iter().find(|p| p.name == "jester").unwrap();
        assert!(stored.materialized_prompt.contains("crab"));
    }

    #[test]
    fn test_snapshot_survives_rebuild() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());

        let snapshot = registry.active();
        write_memory(temp.path(), "default", "001_x.txt", "later");
        registry.rebuild("default").unwrap();

        assert!(!snapshot.materialized_prompt.contains("later"));
        assert!(registry.active().materialized_prompt.contains("later"));
    }

    #[test]
    fn test_names_in_registration_order() {
        let temp = TempDir::new().unwrap();
        let registry = registry(temp.path());
        assert_eq!(registry.names(), vec!["default".to_string(), "jester".to_string()]);
        assert!(registry.contains("jester"));
        assert!(!registry.contains("pirate"));
    }
}
