//! Background filesystem watcher
//!
//! One `notify` watcher covers every active folder. Raw events are coalesced
//! per path for the debounce window and then queued to a worker task for the
//! owning folder, which applies them in order through the single-file
//! pipeline operations. Those take the folder lock, so while a scan holds it
//! events for that folder wait behind it and other folders carry on.

use crate::client::CodeIndexClient;
use crate::client::indexing;
use crate::indexer::language_for_path;
use crate::metadata::{FolderRecord, FolderStatus};
use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// How often pending events are checked against the debounce window
const TICK: Duration = Duration::from_millis(50);

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Kind of change recorded for a path. Variants are ordered by merge priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ChangeKind {
    Modified,
    Created,
    Deleted,
}

/// Deletion beats creation, which beats modification
pub(crate) fn merge_kinds(existing: ChangeKind, new: ChangeKind) -> ChangeKind {
    existing.max(new)
}

#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    kind: ChangeKind,
    last_seen: Instant,
}

/// A debounced change ready to apply
#[derive(Debug)]
struct Change {
    local: PathBuf,
    host: PathBuf,
    kind: ChangeKind,
}

#[derive(Debug)]
pub(crate) enum WatchCommand {
    /// Start watching a folder (host form)
    Watch(String),
    /// Stop watching a folder (host form)
    Unwatch(String),
}

/// Handle to the running watcher task
pub struct WatcherHandle {
    commands: mpsc::UnboundedSender<WatchCommand>,
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub(crate) fn watch(&self, host_path: &str) {
        if self
            .commands
            .send(WatchCommand::Watch(host_path.to_string()))
            .is_err()
        {
            tracing::warn!("Watcher is not running; {} is not watched", host_path);
        }
    }

    pub(crate) fn unwatch(&self, host_path: &str) {
        let _ = self
            .commands
            .send(WatchCommand::Unwatch(host_path.to_string()));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Create the notify watcher and spawn the debounce loop on the current runtime
pub(crate) fn spawn_watcher(client: CodeIndexClient, debounce: Duration) -> Result<WatcherHandle> {
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = event_tx.blocking_send(res);
    })
    .context("Failed to create filesystem watcher")?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let running = Arc::new(AtomicBool::new(true));

    let watch_loop = WatchLoop {
        client,
        watcher,
        watched: HashSet::new(),
        pending: HashMap::new(),
        workers: HashMap::new(),
        debounce,
        commands: command_rx,
        events: event_rx,
    };

    let flag = running.clone();
    tokio::spawn(async move {
        watch_loop.run().await;
        flag.store(false, Ordering::Release);
        tracing::warn!("Filesystem watcher stopped");
    });

    tracing::info!("Filesystem watcher started ({:?} debounce)", debounce);
    Ok(WatcherHandle {
        commands: command_tx,
        running,
    })
}

struct WatchLoop {
    client: CodeIndexClient,
    watcher: RecommendedWatcher,
    /// Local (container-side) roots currently watched
    watched: HashSet<PathBuf>,
    /// Local path -> coalesced change
    pending: HashMap<PathBuf, PendingEvent>,
    /// Folder id -> queue of its worker task
    workers: HashMap<String, mpsc::UnboundedSender<Change>>,
    debounce: Duration,
    commands: mpsc::UnboundedReceiver<WatchCommand>,
    events: mpsc::Receiver<notify::Result<Event>>,
}

impl WatchLoop {
    async fn run(mut self) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(Ok(event)) => self.record(event),
                    Some(Err(e)) => tracing::warn!("Filesystem watch error: {}", e),
                    None => break,
                },
                _ = tick.tick() => self.flush_ready().await,
            }
        }
    }

    fn apply(&mut self, command: WatchCommand) {
        match command {
            WatchCommand::Watch(host) => {
                let local = self.client.path_mapper().to_container_path(Path::new(&host));
                if self.watched.contains(&local) {
                    return;
                }
                match self.watcher.watch(&local, RecursiveMode::Recursive) {
                    Ok(()) => {
                        tracing::info!("Watching {}", local.display());
                        self.watched.insert(local);
                    }
                    Err(e) => tracing::warn!("Failed to watch {}: {}", local.display(), e),
                }
            }
            WatchCommand::Unwatch(host) => {
                let local = self.client.path_mapper().to_container_path(Path::new(&host));
                if self.watched.remove(&local) {
                    if let Err(e) = self.watcher.unwatch(&local) {
                        tracing::debug!("Failed to unwatch {}: {}", local.display(), e);
                    }
                    self.pending.retain(|path, _| !path.starts_with(&local));
                    tracing::info!("Stopped watching {}", local.display());
                }
            }
        }
    }

    fn record(&mut self, event: Event) {
        let now = Instant::now();
        for (path, kind) in convert_event(event) {
            self.pending
                .entry(path)
                .and_modify(|p| {
                    p.kind = merge_kinds(p.kind, kind);
                    p.last_seen = now;
                })
                .or_insert(PendingEvent {
                    kind,
                    last_seen: now,
                });
        }
    }

    async fn flush_ready(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let now = Instant::now();
        let debounce = self.debounce;
        let mut ready = Vec::new();
        self.pending.retain(|path, p| {
            if now.duration_since(p.last_seen) >= debounce {
                ready.push((path.clone(), p.kind));
                false
            } else {
                true
            }
        });
        if ready.is_empty() {
            return;
        }
        ready.sort();

        // A scanning folder still owns its events; they queue behind the scan
        let folders: Vec<FolderRecord> = self
            .client
            .metadata()
            .folders()
            .await
            .into_iter()
            .filter(|f| matches!(f.status, FolderStatus::Active | FolderStatus::Scanning))
            .collect();
        self.workers
            .retain(|id, _| folders.iter().any(|f| &f.id == id));

        for (local, kind) in ready {
            let host = self.client.path_mapper().to_host_path(&local);
            let Some(folder) = owning_folder(&folders, &host) else {
                continue;
            };
            let Ok(relative) = host.strip_prefix(&folder.path) else {
                continue;
            };
            if in_ignored_dir(relative, &self.client.config().indexing.ignore_dirs)
                || is_hidden(relative)
            {
                continue;
            }

            self.dispatch(&folder.id, Change { local, host, kind });
        }
    }

    /// Queue a change on the folder's worker, starting one if needed
    fn dispatch(&mut self, folder_id: &str, mut change: Change) {
        if let Some(queue) = self.workers.get(folder_id) {
            match queue.send(change) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => change = returned,
            }
        }

        let queue = spawn_worker(self.client.clone(), folder_id.to_string());
        if queue.send(change).is_ok() {
            self.workers.insert(folder_id.to_string(), queue);
        }
    }
}

/// Apply one folder's changes in arrival order until its queue is dropped
fn spawn_worker(client: CodeIndexClient, folder_id: String) -> mpsc::UnboundedSender<Change> {
    let (queue, mut changes) = mpsc::unbounded_channel::<Change>();
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            tracing::debug!("Processing {:?} for {}", change.kind, change.host.display());
            if let Err(e) = process(&client, &folder_id, &change).await {
                tracing::error!(
                    "Failed to update index for {}: {:#}",
                    change.host.display(),
                    e
                );
            }
        }
        tracing::debug!("Watcher worker for folder {} stopped", folder_id);
    });
    queue
}

async fn process(client: &CodeIndexClient, folder_id: &str, change: &Change) -> Result<bool> {
    let Change { local, host, kind } = change;
    if !local.exists() {
        return indexing::remove_file(client, folder_id, host).await;
    }

    if local.is_dir() {
        // A directory moved or copied in arrives as one event; let a scan pick up its files
        if *kind == ChangeKind::Modified {
            return Ok(false);
        }
        return indexing::scan_folder(client, folder_id, None)
            .await
            .map(|_| true);
    }

    if language_for_path(local).is_none() {
        return Ok(false);
    }
    indexing::reindex_file(client, folder_id, host).await
}

/// Flatten a notify event into per-path changes. A rename becomes a deletion
/// of the old path and a creation of the new one.
pub(crate) fn convert_event(event: Event) -> Vec<(PathBuf, ChangeKind)> {
    match event.kind {
        EventKind::Create(_) => tag(event.paths, ChangeKind::Created),
        EventKind::Remove(_) => tag(event.paths, ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut changes = Vec::new();
            if let Some(from) = paths.next() {
                changes.push((from, ChangeKind::Deleted));
            }
            if let Some(to) = paths.next() {
                changes.push((to, ChangeKind::Created));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            tag(event.paths, ChangeKind::Deleted)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            tag(event.paths, ChangeKind::Created)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => tag(event.paths, ChangeKind::Modified),
        _ => Vec::new(),
    }
}

fn tag(paths: Vec<PathBuf>, kind: ChangeKind) -> Vec<(PathBuf, ChangeKind)> {
    paths.into_iter().map(|p| (p, kind)).collect()
}

/// Watched folder with the longest path containing `host`
fn owning_folder<'a>(folders: &'a [FolderRecord], host: &Path) -> Option<&'a FolderRecord> {
    folders
        .iter()
        .filter(|f| host.starts_with(&f.path))
        .max_by_key(|f| f.path.len())
}

fn in_ignored_dir(relative: &Path, ignore_dirs: &[String]) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => ignore_dirs.iter().any(|d| name.to_str() == Some(d.as_str())),
        _ => false,
    })
}

/// Dot-files such as editor swap files and atomic-save temporaries
fn is_hidden(relative: &Path) -> bool {
    relative
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
