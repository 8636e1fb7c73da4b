//! Background memory reload
//!
//! Consumes watcher events and rebuilds the persona owning each changed file.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::WatchSetupError;
use crate::persona::PersonaRegistry;
use crate::watcher::{ChangeEvent, ChangeWatcher, WatchHandle};

pub struct WatchLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchLoop {
    /// Start watching the registry's memory root
    pub fn spawn(registry: Arc<PersonaRegistry>, watcher: &ChangeWatcher) -> Result<Self, WatchSetupError> {
        let handle = watcher.watch()?;
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(run(registry, handle, signal));
        Ok(Self { shutdown, task })
    }

    /// Signal the loop, tear down the watcher and wait for the task
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::warn!("Watch loop ended abnormally: {}", e);
        }
    }
}

async fn run(registry: Arc<PersonaRegistry>, mut handle: WatchHandle, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = handle.next() => match event {
                Some(event) => apply(&registry, &event),
                None => {
                    log::warn!("Watcher stopped, memories will no longer reload");
                    break;
                }
            },
        }
    }

    handle.stop();
    log::debug!("Watch loop stopped");
}

/// Rebuild the persona that owns the changed path
fn apply(registry: &PersonaRegistry, event: &ChangeEvent) {
    let Some(persona) = registry.memories().persona_for(&event.path) else {
        return;
    };

    if !registry.contains(&persona) {
        log::debug!("Ignoring change for unregistered persona '{}'", persona);
        return;
    }

    log::info!("Memory {:?}: {}", event.kind, event.path.display());
    if let Err(e) = registry.rebuild(&persona) {
        log::warn!("Failed to rebuild persona '{}': {}", persona, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::persona::definition::PersonaDefinition;
    use crate::watcher::ChangeKind;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registry(root: &std::path::Path) -> Arc<PersonaRegistry> {
        Arc::new(
            PersonaRegistry::new(
                PersonaDefinition::builtins(),
                MemoryStore::new(root.to_path_buf()),
                "default",
            )
            .unwrap(),
        )
    }

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..250 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_new_memory_reaches_active_prompt() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("default")).unwrap();
        let registry = registry(temp.path());
        let base = registry.active().materialized_prompt.clone();

        let watcher = ChangeWatcher::new(temp.path().to_path_buf(), Duration::from_millis(20));
        let watch_loop = WatchLoop::spawn(Arc::clone(&registry), &watcher).unwrap();

        fs::write(temp.path().join("default/001_x.txt"), "hello").unwrap();

        let expected = format!("{}\n\n<memory name=\"001_x.txt\">\nhello\n</memory>", base);
        assert!(eventually(|| registry.active().materialized_prompt == expected).await);

        watch_loop.stop().await;
    }

    #[tokio::test]
    async fn test_inactive_persona_rebuilt() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("jester")).unwrap();
        let registry = registry(temp.path());

        let watcher = ChangeWatcher::new(temp.path().to_path_buf(), Duration::from_millis(20));
        let watch_loop = WatchLoop::spawn(Arc::clone(&registry), &watcher).unwrap();

        fs::write(temp.path().join("jester/001_joke.txt"), "knock knock").unwrap();

        let jester_has_memory = || {
            registry
                .personas()
                .iter()
                .any(|p| p.name == "jester" && p.materialized_prompt.contains("knock knock"))
        };
        assert!(eventually(jester_has_memory).await);
        assert_eq!(registry.active_name(), "default");
        assert!(!registry.active().materialized_prompt.contains("knock knock"));

        watch_loop.stop().await;
    }

    #[tokio::test]
    async fn test_missing_root_fails_setup() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp.path().join("missing"));
        let watcher = ChangeWatcher::new(temp.path().join("missing"), Duration::from_millis(20));
        assert!(WatchLoop::spawn(registry, &watcher).is_err());
    }

    #[test]
    fn test_apply_ignores_unknown_persona() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("stranger")).unwrap();
        fs::write(temp.path().join("stranger/001.txt"), "x").unwrap();
        let registry = registry(temp.path());
        let before = registry.personas();

        apply(
            &registry,
            &ChangeEvent {
                path: temp.path().join("stranger/001.txt"),
                kind: ChangeKind::Created,
            },
        );
        assert_eq!(registry.personas(), before);
    }
}
