//! Per-folder coordination
//!
//! Two layers per registered folder:
//! 1. A gate (async mutex) serializing scans, watcher events and removal
//! 2. A scan slot that lets concurrent scan requests share one result via broadcast
//!
//! Each folder also owns a `CancellationToken` that removal fires to stop an
//! in-flight scan at its next checkpoint.

use crate::types::ScanResponse;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, broadcast};
use tokio_util::sync::CancellationToken;

/// Result shared with every waiter of one scan
pub(crate) type SharedScanResult = Result<ScanResponse, String>;

struct FolderSlot {
    gate: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

impl FolderSlot {
    fn new() -> Self {
        Self {
            gate: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
        }
    }
}

/// State for an in-progress scan
pub(crate) struct ScanOperation {
    result_tx: broadcast::Sender<SharedScanResult>,
    /// Cleared once the result is broadcast; a finished entry is replaced, never joined
    active: Arc<AtomicBool>,
}

/// Result of trying to start a scan
pub(crate) enum ScanLockResult {
    /// We own the scan and must broadcast its result
    Acquired(ScanGuard),
    /// A scan of the same folder is running; wait for its result
    WaitForResult(broadcast::Receiver<SharedScanResult>),
}

#[derive(Default)]
pub(crate) struct FolderLocks {
    slots: Mutex<HashMap<String, FolderSlot>>,
    scans: Arc<RwLock<HashMap<String, ScanOperation>>>,
}

impl FolderLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a folder
    pub(crate) async fn lock_folder(&self, folder_id: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(folder_id.to_string())
                .or_insert_with(FolderSlot::new)
                .gate
                .clone()
        };
        gate.lock_owned().await
    }

    pub(crate) async fn cancel_token(&self, folder_id: &str) -> CancellationToken {
        let mut slots = self.slots.lock().await;
        slots
            .entry(folder_id.to_string())
            .or_insert_with(FolderSlot::new)
            .cancel
            .clone()
    }

    /// Fire the folder's cancellation token
    pub(crate) async fn cancel(&self, folder_id: &str) {
        if let Some(slot) = self.slots.lock().await.get(folder_id) {
            slot.cancel.cancel();
        }
    }

    /// Drop all state for a removed folder
    pub(crate) async fn forget(&self, folder_id: &str) {
        self.slots.lock().await.remove(folder_id);
        self.scans.write().await.remove(folder_id);
    }

    /// Start a scan, or join the one already running for this folder
    pub(crate) async fn try_acquire_scan(&self, folder_id: &str) -> ScanLockResult {
        let mut scans = self.scans.write().await;

        if let Some(existing) = scans.get(folder_id) {
            if existing.active.load(Ordering::Acquire) {
                tracing::info!("Scan already in progress for folder {}, waiting", folder_id);
                return ScanLockResult::WaitForResult(existing.result_tx.subscribe());
            }
            tracing::debug!("Replacing finished scan entry for folder {}", folder_id);
            scans.remove(folder_id);
        }

        // One result is ever sent
        let (result_tx, _) = broadcast::channel(1);
        let active = Arc::new(AtomicBool::new(true));
        scans.insert(
            folder_id.to_string(),
            ScanOperation {
                result_tx: result_tx.clone(),
                active: active.clone(),
            },
        );

        ScanLockResult::Acquired(ScanGuard {
            folder_id: folder_id.to_string(),
            scans: self.scans.clone(),
            result_tx,
            active,
            released: false,
        })
    }
}

/// Owner of a running scan; waiters are released by [`ScanGuard::broadcast_result`]
pub(crate) struct ScanGuard {
    folder_id: String,
    scans: Arc<RwLock<HashMap<String, ScanOperation>>>,
    result_tx: broadcast::Sender<SharedScanResult>,
    active: Arc<AtomicBool>,
    released: bool,
}

impl ScanGuard {
    pub(crate) fn broadcast_result(&self, result: &SharedScanResult) {
        self.active.store(false, Ordering::Release);
        // No receivers is fine
        let _ = self.result_tx.send(result.clone());
    }

    /// Remove the scan entry; call after broadcasting
    pub(crate) async fn release(mut self) {
        self.scans.write().await.remove(&self.folder_id);
        self.released = true;
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Waiters must not hang when the scan task panicked or returned early
        self.active.store(false, Ordering::Release);
        let _ = self
            .result_tx
            .send(Err("Scan was interrupted before completing".to_string()));

        tracing::warn!(
            "Scan guard for folder {} dropped without release, cleaning up",
            self.folder_id
        );

        let folder_id = self.folder_id.clone();
        let scans = self.scans.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                scans.write().await.remove(&folder_id);
            });
        }
    }
}
