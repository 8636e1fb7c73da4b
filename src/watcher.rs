//! Memory directory watcher
//!
//! Polls the tree on an interval, diffs `(mtime, len)` snapshots and pushes a
//! [`ChangeEvent`] per changed file over a bounded channel. Consumers await
//! [`WatchHandle::next`] and never poll the disk themselves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use walkdir::WalkDir;

use crate::error::WatchSetupError;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

type Snapshot = BTreeMap<PathBuf, (Option<SystemTime>, u64)>;

pub struct ChangeWatcher {
    root: PathBuf,
    interval: Duration,
}

impl ChangeWatcher {
    pub fn new(root: PathBuf, interval: Duration) -> Self {
        Self { root, interval }
    }

    /// Start polling; must be called inside a tokio runtime
    ///
    /// The baseline snapshot is taken before returning, so any write after
    /// this call is reported.
    pub fn watch(&self) -> Result<WatchHandle, WatchSetupError> {
        if !self.root.is_dir() {
            return Err(WatchSetupError {
                root: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let root = self.root.clone();
        let interval = self.interval;
        let mut previous = snapshot(&root);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        log::info!(
            "Watching {} every {}ms ({} files)",
            root.display(),
            interval.as_millis(),
            previous.len()
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let current = snapshot(&root);
                for event in diff(&previous, &current) {
                    log::debug!("{:?} {}", event.kind, event.path.display());
                    if tx.send(event).await.is_err() {
                        log::debug!("Watch receiver dropped, stopping poll of {}", root.display());
                        return;
                    }
                }
                previous = current;
            }
        });

        Ok(WatchHandle { rx, task })
    }
}

/// Receiving end of a running watch
pub struct WatchHandle {
    rx: mpsc::Receiver<ChangeEvent>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Next change; `None` once the poll task has ended
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Abort the poll task and release the channel
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Symlinks are followed, matching what the memory store reads
fn snapshot(root: &Path) -> Snapshot {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            Some((entry.into_path(), (metadata.modified().ok(), metadata.len())))
        })
        .collect()
}

/// Events turning `previous` into `current`, in path order
fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    let mut events: Vec<ChangeEvent> = current
        .iter()
        .filter_map(|(path, stamp)| {
            let kind = match previous.get(path) {
                None => ChangeKind::Created,
                Some(old) if old != stamp => ChangeKind::Modified,
                Some(_) => return None,
            };
            Some(ChangeEvent {
                path: path.clone(),
                kind,
            })
        })
        .chain(
            previous
                .keys()
                .filter(|path| !current.contains_key(*path))
                .map(|path| ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Removed,
                }),
        )
        .collect();

    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}
