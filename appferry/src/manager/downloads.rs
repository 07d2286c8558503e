//! The download manager.
//!
//! Owns every [`PackageManifest`] and the transfer task driving it.
//!
//! # Concurrency
//!
//! ```text
//!  add/resume/suspend/restart/delete
//!          │
//!          ▼
//!   Slot (one per manifest id)
//!     ├── op lock ─────── serializes control operations on this manifest
//!     ├── manifest ────── current record; None once deleted
//!     └── task ────────── running transfer (cancel token + join handle)
//!          │
//!          ▼
//!   transfer task ── writes progress / completion / failure into `manifest`
//! ```
//!
//! Control operations that stop a transfer cancel its token and await its
//! join handle before touching the manifest, so a transfer never writes
//! after the operation that stopped it. Manifests are independent of each
//! other; nothing is locked across slots.
//!
//! Every change is saved to the [`ManifestStore`] before the call returns and
//! then published to subscribers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::actions::DownloadAction;
use super::config::ManagerConfig;
use super::download::{format_size, SpeedMeter, TransferProgress};
use super::error::{ManagerError, ManagerResult};
use super::store::StoreError;
use super::traits::{ManifestStore, PackageCatalog, Transfer};
use crate::package::{
    AccountRef, DownloadState, DownloadStatus, DownloadTicket, PackageDescriptor, PackageManifest,
};

/// Capacity of the manifest event channel.
const EVENT_CAPACITY: usize = 256;

/// A manifest change published by the manager.
#[derive(Debug, Clone)]
pub enum ManifestEvent {
    /// The manifest was written with this content.
    Updated(PackageManifest),
    /// The manifest was deleted.
    Removed { id: String },
}

impl ManifestEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Updated(m) => &m.id,
            Self::Removed { id } => id,
        }
    }
}

struct RunningTransfer {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    op: tokio::sync::Mutex<()>,
    manifest: Mutex<Option<PackageManifest>>,
    task: Mutex<Option<RunningTransfer>>,
}

impl Slot {
    fn with(manifest: PackageManifest) -> Self {
        Self {
            manifest: Mutex::new(Some(manifest)),
            ..Default::default()
        }
    }

    fn snapshot(&self) -> Option<PackageManifest> {
        self.manifest.lock().clone()
    }

    /// Stop the running transfer, if any, and wait for it to exit.
    async fn stop_transfer(&self) {
        let running = self.task.lock().take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(error = %e, "Transfer task ended abnormally");
            }
        }
    }

    fn has_live_transfer(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }
}

struct Inner {
    config: ManagerConfig,
    store: Arc<dyn ManifestStore>,
    transfer: Arc<dyn Transfer>,
    slots: DashMap<String, Arc<Slot>>,
    events: broadcast::Sender<ManifestEvent>,
    generation: AtomicU64,
}

impl Inner {
    /// Write `manifest` on the blocking pool, then publish it.
    ///
    /// Callers never hold a slot lock across this. Writes for one manifest
    /// stay ordered because control operations first wait for the transfer
    /// task, which awaits its own writes.
    async fn persist(&self, manifest: PackageManifest) -> ManagerResult<PackageManifest> {
        let store = Arc::clone(&self.store);
        let record = manifest.clone();
        tokio::task::spawn_blocking(move || store.save(&record))
            .await
            .map_err(|e| StoreError::Aborted {
                id: manifest.id.clone(),
                reason: e.to_string(),
            })??;
        let _ = self.events.send(ManifestEvent::Updated(manifest.clone()));
        Ok(manifest)
    }

    /// Apply `f` to a manifest that is still downloading, then persist it.
    ///
    /// Used by transfer tasks; changes to a manifest that has since left the
    /// `downloading` state are dropped.
    async fn update_downloading<F>(&self, slot: &Slot, f: F)
    where
        F: FnOnce(&mut DownloadState),
    {
        let updated = {
            let mut guard = slot.manifest.lock();
            let Some(manifest) = guard.as_mut() else {
                return;
            };
            if manifest.state.status != DownloadStatus::Downloading {
                return;
            }
            f(&mut manifest.state);
            manifest.clone()
        };
        if let Err(e) = self.persist(updated).await {
            warn!(error = %e, "Failed to persist download progress");
        }
    }
}

/// Orchestrates package transfers and their durable manifests.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Open the manager over an existing store.
    ///
    /// Manifests persisted as `downloading` belong to a transfer that no
    /// longer exists; they are reset to `paused`.
    pub fn open(
        config: ManagerConfig,
        store: Arc<dyn ManifestStore>,
        transfer: Arc<dyn Transfer>,
    ) -> ManagerResult<Self> {
        std::fs::create_dir_all(&config.download_dir).map_err(|source| {
            ManagerError::CreateDirFailed {
                path: config.download_dir.clone(),
                source,
            }
        })?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let slots = DashMap::new();
        for mut manifest in store.load_all()? {
            if manifest.state.status == DownloadStatus::Downloading {
                info!(id = %manifest.id, percent = manifest.state.percent, "Interrupted download reset to paused");
                manifest.state.mark_paused();
                store.save(&manifest)?;
            }
            slots.insert(manifest.id.clone(), Arc::new(Slot::with(manifest)));
        }
        debug!(count = slots.len(), "Download manager opened");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                transfer,
                slots,
                events,
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Receive every manifest change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ManifestEvent> {
        self.inner.events.subscribe()
    }

    /// All manifests, oldest first.
    pub fn list(&self) -> Vec<PackageManifest> {
        let mut manifests: Vec<_> = self
            .inner
            .slots
            .iter()
            .filter_map(|entry| entry.value().snapshot())
            .collect();
        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        manifests
    }

    pub fn get(&self, id: &str) -> Option<PackageManifest> {
        self.inner.slots.get(id).and_then(|slot| slot.snapshot())
    }

    /// The manifest for `package` requested by `account`, if any.
    pub fn find(&self, account: &AccountRef, package: &PackageDescriptor) -> Option<PackageManifest> {
        self.get(&package.manifest_id(account))
    }

    /// Path of the finished artifact, if the manifest has completed.
    pub fn artifact_path(&self, id: &str) -> Option<PathBuf> {
        self.get(id)
            .filter(|m| m.status() == DownloadStatus::Completed)
            .map(|m| self.inner.config.artifact_path(&m.id))
    }

    /// Register a new `pending` manifest.
    ///
    /// A completed manifest for the same package is replaced and its artifact
    /// discarded; any other existing manifest is a [`ManagerError::DuplicateRequest`].
    pub async fn add(
        &self,
        account: AccountRef,
        package: PackageDescriptor,
        ticket: DownloadTicket,
    ) -> ManagerResult<PackageManifest> {
        let manifest = PackageManifest::new(account, package, ticket);
        let slot = self
            .inner
            .slots
            .entry(manifest.id.clone())
            .or_default()
            .value()
            .clone();
        let _op = slot.op.lock().await;

        if let Some(existing) = slot.snapshot() {
            if existing.status().is_active() {
                return Err(ManagerError::DuplicateRequest { id: existing.id });
            }
            debug!(id = %existing.id, "Replacing completed download");
            // Its transfer task may still be recording the completion.
            slot.stop_transfer().await;
            self.remove_artifacts(&existing.id).await?;
        }

        let manifest = self.inner.persist(manifest).await?;
        *slot.manifest.lock() = Some(manifest.clone());
        info!(id = %manifest.id, bundle_id = %manifest.package.software.bundle_id, "Download added");
        Ok(manifest)
    }

    /// Resolve a ticket through `catalog`, add the manifest and start it.
    pub async fn start_download(
        &self,
        catalog: &dyn PackageCatalog,
        account: AccountRef,
        package: PackageDescriptor,
    ) -> ManagerResult<PackageManifest> {
        let ticket = catalog.download(&account, &package).await?;
        let manifest = self.add(account, package, ticket).await?;
        self.resume(&manifest.id).await
    }

    /// Start (or continue) the transfer.
    ///
    /// No-op for `downloading` and `completed` manifests.
    pub async fn resume(&self, id: &str) -> ManagerResult<PackageManifest> {
        let slot = self.slot(id)?;
        let _op = slot.op.lock().await;
        self.start_locked(id, &slot).await
    }

    /// Pause the transfer, keeping the bytes received so far.
    ///
    /// No-op unless the manifest is `downloading`.
    pub async fn suspend(&self, id: &str) -> ManagerResult<PackageManifest> {
        let slot = self.slot(id)?;
        let _op = slot.op.lock().await;
        let status = slot.snapshot().map(|m| m.status()).ok_or_else(|| not_found(id))?;
        if status != DownloadStatus::Downloading {
            return slot.snapshot().ok_or_else(|| not_found(id));
        }

        slot.stop_transfer().await;

        let paused = {
            let mut guard = slot.manifest.lock();
            let manifest = guard.as_mut().ok_or_else(|| not_found(id))?;
            // The transfer may have settled while it was being stopped.
            if manifest.state.status != DownloadStatus::Downloading {
                return Ok(manifest.clone());
            }
            manifest.state.mark_paused();
            manifest.clone()
        };
        info!(id, percent = paused.state.percent, "Download suspended");
        self.inner.persist(paused).await
    }

    /// Discard partial data and error, then start over.
    pub async fn restart(&self, id: &str) -> ManagerResult<PackageManifest> {
        let slot = self.slot(id)?;
        let _op = slot.op.lock().await;
        if slot.snapshot().is_none() {
            return Err(not_found(id));
        }

        slot.stop_transfer().await;
        self.remove_artifacts(id).await?;

        let reset = {
            let mut guard = slot.manifest.lock();
            let manifest = guard.as_mut().ok_or_else(|| not_found(id))?;
            manifest.state.reset();
            manifest.clone()
        };
        self.inner.persist(reset).await?;
        info!(id, "Download restarted");
        self.start_locked(id, &slot).await
    }

    /// Cancel any transfer, remove artifacts and the manifest.
    ///
    /// Deleting an unknown or already deleted manifest succeeds.
    pub async fn delete(&self, id: &str) -> ManagerResult<()> {
        let Some(slot) = self.inner.slots.get(id).map(|s| s.value().clone()) else {
            return Ok(());
        };
        let _op = slot.op.lock().await;
        if slot.snapshot().is_none() {
            return Ok(());
        }

        slot.stop_transfer().await;
        self.remove_artifacts(id).await?;
        self.inner.store.remove(id)?;
        *slot.manifest.lock() = None;
        let _ = self
            .inner
            .events
            .send(ManifestEvent::Removed { id: id.to_string() });
        info!(id, "Download deleted");
        Ok(())
    }

    /// Delete every manifest.
    pub async fn remove_all(&self) -> ManagerResult<()> {
        let ids: Vec<String> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.delete(&id).await?;
        }
        Ok(())
    }

    /// Suspend every running transfer. Used before process exit.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Err(e) = self.suspend(&id).await {
                warn!(id = %id, error = %e, "Failed to suspend download during shutdown");
            }
        }
    }

    /// Dispatch a user action.
    ///
    /// Returns the manifest after the action, or `None` after a delete.
    pub async fn perform(
        &self,
        id: &str,
        action: DownloadAction,
    ) -> ManagerResult<Option<PackageManifest>> {
        match action {
            DownloadAction::Suspend => self.suspend(id).await.map(Some),
            DownloadAction::Resume => self.resume(id).await.map(Some),
            DownloadAction::Restart => self.restart(id).await.map(Some),
            DownloadAction::Delete => self.delete(id).await.map(|_| None),
        }
    }

    /// Wait until the manifest stops moving.
    ///
    /// Resolves to the manifest once it completes, to the recorded failure
    /// as [`ManagerError::Transfer`], and to [`ManagerError::Cancelled`] if it
    /// is paused or deleted first.
    pub async fn wait_until_settled(&self, id: &str) -> ManagerResult<PackageManifest> {
        let mut events = self.subscribe();
        let current = self.get(id).ok_or_else(|| not_found(id))?;
        if let Some(settled) = settled(&current) {
            return settled;
        }

        loop {
            match events.recv().await {
                Ok(event) if event.id() == id => match event {
                    ManifestEvent::Updated(manifest) => {
                        if let Some(settled) = settled(&manifest) {
                            return settled;
                        }
                    }
                    ManifestEvent::Removed { .. } => {
                        return Err(ManagerError::Cancelled { id: id.to_string() })
                    }
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(id, skipped, "Event receiver lagged, rechecking manifest");
                    let current = self.get(id).ok_or_else(|| ManagerError::Cancelled {
                        id: id.to_string(),
                    })?;
                    if let Some(settled) = settled(&current) {
                        return settled;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ManagerError::Cancelled { id: id.to_string() })
                }
            }
        }
    }

    fn slot(&self, id: &str) -> ManagerResult<Arc<Slot>> {
        self.inner
            .slots
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| not_found(id))
    }

    /// Start a transfer; the caller holds the slot's op lock.
    async fn start_locked(&self, id: &str, slot: &Arc<Slot>) -> ManagerResult<PackageManifest> {
        let current = slot.snapshot().ok_or_else(|| not_found(id))?;
        match current.state.status {
            DownloadStatus::Completed => return Ok(current),
            DownloadStatus::Downloading if slot.has_live_transfer() => return Ok(current),
            _ => {}
        }
        // A settled transfer may still be recording its outcome.
        slot.stop_transfer().await;

        let started = {
            let mut guard = slot.manifest.lock();
            let manifest = guard.as_mut().ok_or_else(|| not_found(id))?;
            manifest.state.mark_downloading();
            manifest.clone()
        };
        let started = self.inner.persist(started).await?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_transfer(
            Arc::clone(&self.inner),
            Arc::clone(slot),
            started.id.clone(),
            started.ticket.clone(),
            generation,
            cancel.clone(),
        ));
        *slot.task.lock() = Some(RunningTransfer {
            generation,
            cancel,
            handle,
        });

        info!(id, percent = started.state.percent, "Download started");
        Ok(started)
    }

    async fn remove_artifacts(&self, id: &str) -> ManagerResult<()> {
        for path in [
            self.inner.config.partial_path(id),
            self.inner.config.artifact_path(id),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ManagerError::WriteFailed { path, source }),
            }
        }
        Ok(())
    }
}

fn not_found(id: &str) -> ManagerError {
    ManagerError::NotFound { id: id.to_string() }
}

fn settled(manifest: &PackageManifest) -> Option<ManagerResult<PackageManifest>> {
    match manifest.state.status {
        DownloadStatus::Completed => Some(Ok(manifest.clone())),
        DownloadStatus::Failed => Some(Err(ManagerError::Transfer {
            url: manifest.ticket.url.clone(),
            reason: manifest.state.error.clone().unwrap_or_default(),
        })),
        DownloadStatus::Paused => Some(Err(ManagerError::Cancelled {
            id: manifest.id.clone(),
        })),
        DownloadStatus::Pending | DownloadStatus::Downloading => None,
    }
}

/// Body of one transfer task.
async fn run_transfer(
    inner: Arc<Inner>,
    slot: Arc<Slot>,
    id: String,
    ticket: DownloadTicket,
    generation: u64,
    cancel: CancellationToken,
) {
    let progress = TransferProgress::new();
    let partial = inner.config.partial_path(&id);

    let mut ticker = tokio::time::interval(inner.config.progress_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    let mut meter: Option<SpeedMeter> = None;

    let result = {
        let mut fetch = inner.transfer.fetch(&ticket, &partial, &progress, &cancel);
        loop {
            tokio::select! {
                biased;
                result = &mut fetch => break result,
                _ = ticker.tick() => {
                    let bytes = progress.downloaded();
                    let speed = match meter.as_mut() {
                        Some(meter) => format_size(meter.sample(bytes)),
                        None => {
                            meter = Some(SpeedMeter::new(bytes));
                            String::new()
                        }
                    };
                    let fraction = progress.fraction();
                    inner
                        .update_downloading(&slot, |state| match fraction {
                            Some(fraction) => state.advance(fraction, speed),
                            None => state.speed = speed,
                        })
                        .await;
                }
            }
        }
    };

    match result {
        Ok(bytes) => {
            let artifact = inner.config.artifact_path(&id);
            match tokio::fs::rename(&partial, &artifact).await {
                Ok(()) => {
                    info!(id = %id, bytes, "Download completed");
                    inner
                        .update_downloading(&slot, DownloadState::mark_completed)
                        .await;
                }
                Err(source) => {
                    let e = ManagerError::WriteFailed {
                        path: artifact,
                        source,
                    };
                    error!(id = %id, error = %e, "Download failed");
                    inner
                        .update_downloading(&slot, |state| state.mark_failed(e.to_string()))
                        .await;
                }
            }
        }
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
            debug!(id = %id, "Transfer cancelled");
            if let Some(fraction) = progress.fraction() {
                inner
                    .update_downloading(&slot, |state| state.advance(fraction, ""))
                    .await;
            }
        }
        Err(e) => {
            error!(id = %id, error = %e, "Download failed");
            inner
                .update_downloading(&slot, |state| state.mark_failed(e.to_string()))
                .await;
        }
    }

    let mut task = slot.task.lock();
    if task.as_ref().map(|t| t.generation) == Some(generation) {
        *task = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::store::MemoryManifestStore;
    use crate::manager::traits::BoxFuture;
    use crate::package::Software;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    const CHUNK: usize = 100;

    /// Writes `chunks` chunks of `CHUNK` bytes, continuing a partial file.
    ///
    /// When `hold_at` is set, the first run stops after that many chunks,
    /// signals `reached` and waits for cancellation.
    struct ScriptedTransfer {
        chunks: usize,
        hold_at: Mutex<Option<usize>>,
        reached: Notify,
        fail_with: Mutex<Option<String>>,
        calls: AtomicU64,
        resumable: AtomicBool,
    }

    impl ScriptedTransfer {
        fn new(chunks: usize) -> Self {
            Self {
                chunks,
                hold_at: Mutex::new(None),
                reached: Notify::new(),
                fail_with: Mutex::new(None),
                calls: AtomicU64::new(0),
                resumable: AtomicBool::new(true),
            }
        }

        fn holding_at(self, chunk: usize) -> Self {
            *self.hold_at.lock() = Some(chunk);
            self
        }

        fn failing(self, reason: &str) -> Self {
            *self.fail_with.lock() = Some(reason.to_string());
            self
        }

        async fn run(
            &self,
            dest: &Path,
            progress: &TransferProgress,
            cancel: &CancellationToken,
        ) -> ManagerResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = self.fail_with.lock().take() {
                return Err(ManagerError::transfer("scripted://", reason));
            }

            let total = (self.chunks * CHUNK) as u64;
            progress.set_total(total);
            let existing = match tokio::fs::metadata(dest).await {
                Ok(meta) if self.resumable.load(Ordering::SeqCst) => meta.len(),
                _ => 0,
            };
            let mut file = if existing > 0 {
                tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(dest)
                    .await
                    .unwrap()
            } else {
                tokio::fs::File::create(dest).await.unwrap()
            };

            let hold_at = self.hold_at.lock().take();
            let mut written = existing;
            progress.set_downloaded(written);
            for index in (existing as usize / CHUNK)..self.chunks {
                if Some(index) == hold_at {
                    file.flush().await.unwrap();
                    self.reached.notify_one();
                    cancel.cancelled().await;
                    return Err(ManagerError::Cancelled { id: "scripted".into() });
                }
                if cancel.is_cancelled() {
                    return Err(ManagerError::Cancelled { id: "scripted".into() });
                }
                file.write_all(&[0xAB; CHUNK]).await.unwrap();
                written += CHUNK as u64;
                progress.set_downloaded(written);
                tokio::task::yield_now().await;
            }
            file.flush().await.unwrap();
            Ok(written)
        }
    }

    impl Transfer for ScriptedTransfer {
        fn fetch<'a>(
            &'a self,
            _ticket: &'a DownloadTicket,
            dest: &'a Path,
            progress: &'a TransferProgress,
            cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ManagerResult<u64>> {
            Box::pin(self.run(dest, progress, cancel))
        }
    }

    fn account() -> AccountRef {
        AccountRef::new("acct-1", "a@example.com")
    }

    fn package(version_id: &str) -> PackageDescriptor {
        PackageDescriptor::new(Software::new("com.example.app", "Example", "1.0"), version_id)
    }

    fn ticket() -> DownloadTicket {
        DownloadTicket::new("https://example.com/a.ipa")
    }

    fn manager(
        temp: &TempDir,
        store: Arc<MemoryManifestStore>,
        transfer: Arc<ScriptedTransfer>,
    ) -> DownloadManager {
        let config =
            ManagerConfig::new(temp.path()).with_progress_interval(Duration::from_millis(5));
        DownloadManager::open(config, store, transfer).unwrap()
    }

    #[tokio::test]
    async fn test_add_creates_pending_manifest() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mgr = manager(&temp, store.clone(), Arc::new(ScriptedTransfer::new(4)));

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        assert_eq!(m.status(), DownloadStatus::Pending);
        assert_eq!(store.load(&m.id).unwrap(), Some(m.clone()));
        assert_eq!(mgr.find(&account(), &package("1")).unwrap().id, m.id);
        assert!(mgr.find(&account(), &package("2")).is_none());
    }

    #[tokio::test]
    async fn test_add_then_complete_then_duplicate_rules() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mgr = manager(&temp, store.clone(), Arc::new(ScriptedTransfer::new(4)));

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        let second = mgr.add(account(), package("1"), ticket()).await;
        assert!(matches!(second, Err(ManagerError::DuplicateRequest { .. })));

        mgr.resume(&m.id).await.unwrap();
        let done = mgr.wait_until_settled(&m.id).await.unwrap();
        assert_eq!(done.status(), DownloadStatus::Completed);
        assert_eq!(done.state.percent, 1.0);
        assert!(done.state.speed.is_empty());
        assert_eq!(
            std::fs::metadata(mgr.artifact_path(&m.id).unwrap())
                .unwrap()
                .len(),
            400
        );
        assert!(!mgr.config().partial_path(&m.id).exists());

        // A completed download may be requested again.
        let again = mgr.add(account(), package("1"), ticket()).await.unwrap();
        assert_eq!(again.status(), DownloadStatus::Pending);
        assert!(mgr.artifact_path(&m.id).is_none());
    }

    #[tokio::test]
    async fn test_suspend_keeps_progress_and_resume_continues() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(10).holding_at(4));
        let mgr = manager(&temp, store.clone(), transfer.clone());

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        transfer.reached.notified().await;

        let paused = mgr.suspend(&m.id).await.unwrap();
        assert_eq!(paused.status(), DownloadStatus::Paused);
        assert!((paused.state.percent - 0.4).abs() < f64::EPSILON);
        assert!(paused.state.error.is_none());
        assert_eq!(
            std::fs::metadata(mgr.config().partial_path(&m.id))
                .unwrap()
                .len(),
            400
        );

        // Suspending again is a no-op.
        let again = mgr.suspend(&m.id).await.unwrap();
        assert_eq!(again.status(), DownloadStatus::Paused);

        mgr.resume(&m.id).await.unwrap();
        let done = mgr.wait_until_settled(&m.id).await.unwrap();
        assert_eq!(done.status(), DownloadStatus::Completed);
        assert_eq!(
            std::fs::metadata(mgr.artifact_path(&m.id).unwrap())
                .unwrap()
                .len(),
            1000
        );
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_restart_clears_it() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(3).failing("connection reset"));
        let mgr = manager(&temp, store.clone(), transfer);

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        let err = mgr.wait_until_settled(&m.id).await.unwrap_err();
        assert!(matches!(err, ManagerError::Transfer { .. }));

        let failed = mgr.get(&m.id).unwrap();
        assert_eq!(failed.status(), DownloadStatus::Failed);
        assert!(failed.state.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(failed.hint(), failed.state.error.clone().unwrap());

        let restarted = mgr.restart(&m.id).await.unwrap();
        assert_eq!(restarted.status(), DownloadStatus::Downloading);
        assert_eq!(restarted.state.percent, 0.0);
        assert!(restarted.state.error.is_none());

        let done = mgr.wait_until_settled(&m.id).await.unwrap();
        assert_eq!(done.status(), DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_resume_starts_one_transfer() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(10).holding_at(2));
        let mgr = manager(&temp, store, transfer.clone());

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        let (a, b, c) = tokio::join!(mgr.resume(&m.id), mgr.resume(&m.id), mgr.resume(&m.id));
        a.unwrap();
        b.unwrap();
        c.unwrap();
        transfer.reached.notified().await;

        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
        mgr.delete(&m.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_twice_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(10).holding_at(3));
        let mgr = manager(&temp, store.clone(), transfer.clone());

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        transfer.reached.notified().await;

        mgr.delete(&m.id).await.unwrap();
        mgr.delete(&m.id).await.unwrap();

        assert!(mgr.get(&m.id).is_none());
        assert!(mgr.list().is_empty());
        assert!(store.load(&m.id).unwrap().is_none());
        assert!(!mgr.config().partial_path(&m.id).exists());
        assert!(!mgr.config().artifact_path(&m.id).exists());
        assert!(matches!(
            mgr.resume(&m.id).await,
            Err(ManagerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_until_settled_reports_cancel_on_suspend() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(10).holding_at(1));
        let mgr = manager(&temp, store, transfer.clone());

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        let waiter = {
            let mgr = mgr.clone();
            let id = m.id.clone();
            tokio::spawn(async move { mgr.wait_until_settled(&id).await })
        };
        transfer.reached.notified().await;
        mgr.suspend(&m.id).await.unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ManagerError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_open_resets_downloading_to_paused() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mut m = PackageManifest::new(account(), package("1"), ticket());
        m.state.mark_downloading();
        m.state.advance(0.4, "1.0 MB");
        store.save(&m).unwrap();

        let mgr = manager(&temp, store.clone(), Arc::new(ScriptedTransfer::new(4)));
        let loaded = mgr.get(&m.id).unwrap();
        assert_eq!(loaded.status(), DownloadStatus::Paused);
        assert_eq!(loaded.state.percent, 0.4);
        assert!(loaded.state.speed.is_empty());
        assert_eq!(
            store.load(&m.id).unwrap().unwrap().status(),
            DownloadStatus::Paused
        );
    }

    #[tokio::test]
    async fn test_perform_dispatches_and_remove_all() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mgr = manager(&temp, store.clone(), Arc::new(ScriptedTransfer::new(2)));

        let a = mgr.add(account(), package("1"), ticket()).await.unwrap();
        let b = mgr.add(account(), package("2"), ticket()).await.unwrap();

        let resumed = mgr.perform(&a.id, DownloadAction::Resume).await.unwrap();
        assert_eq!(resumed.unwrap().status(), DownloadStatus::Downloading);
        mgr.wait_until_settled(&a.id).await.unwrap();

        assert!(mgr
            .perform(&b.id, DownloadAction::Delete)
            .await
            .unwrap()
            .is_none());
        assert_eq!(mgr.list().len(), 1);

        mgr.remove_all().await.unwrap();
        assert!(mgr.list().is_empty());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_download_resolves_through_catalog() {
        use crate::manager::catalog::DirectLinkCatalog;

        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mgr = manager(&temp, store, Arc::new(ScriptedTransfer::new(2)));
        let catalog = DirectLinkCatalog::single(&package("1"), ticket());

        let started = mgr
            .start_download(&catalog, account(), package("1"))
            .await
            .unwrap();
        assert_eq!(started.status(), DownloadStatus::Downloading);
        mgr.wait_until_settled(&started.id).await.unwrap();

        let missing = mgr.start_download(&catalog, account(), package("9")).await;
        assert!(matches!(missing, Err(ManagerError::Catalog { .. })));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let mgr = manager(&temp, store, Arc::new(ScriptedTransfer::new(2)));
        let mut events = mgr.subscribe();

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        match events.recv().await.unwrap() {
            ManifestEvent::Updated(update) => assert_eq!(update.id, m.id),
            other => panic!("unexpected event {:?}", other),
        }
        mgr.delete(&m.id).await.unwrap();
        let removed = loop {
            if let ManifestEvent::Removed { id } = events.recv().await.unwrap() {
                break id;
            }
        };
        assert_eq!(removed, m.id);
    }

    /// Records the thread every write runs on.
    #[derive(Default)]
    struct ThreadRecordingStore {
        records: MemoryManifestStore,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl ManifestStore for ThreadRecordingStore {
        fn load_all(&self) -> crate::manager::StoreResult<Vec<PackageManifest>> {
            self.records.load_all()
        }

        fn load(&self, id: &str) -> crate::manager::StoreResult<Option<PackageManifest>> {
            self.records.load(id)
        }

        fn save(&self, manifest: &PackageManifest) -> crate::manager::StoreResult<()> {
            self.threads.lock().push(std::thread::current().id());
            self.records.save(manifest)
        }

        fn remove(&self, id: &str) -> crate::manager::StoreResult<()> {
            self.records.remove(id)
        }
    }

    #[tokio::test]
    async fn test_manifest_writes_run_on_blocking_pool() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ThreadRecordingStore::default());
        let config =
            ManagerConfig::new(temp.path()).with_progress_interval(Duration::from_millis(1));
        let mgr = DownloadManager::open(
            config,
            store.clone(),
            Arc::new(ScriptedTransfer::new(50)),
        )
        .unwrap();

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        mgr.wait_until_settled(&m.id).await.unwrap();

        // The test body and every transfer task run on this thread.
        let runtime_thread = std::thread::current().id();
        let threads = store.threads.lock().clone();
        assert!(threads.len() >= 3);
        assert!(threads.iter().all(|t| *t != runtime_thread));
    }

    #[tokio::test]
    async fn test_store_matches_memory_once_settled() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryManifestStore::new());
        let transfer = Arc::new(ScriptedTransfer::new(4).failing("connection reset"));
        let mgr = manager(&temp, store.clone(), transfer);

        let m = mgr.add(account(), package("1"), ticket()).await.unwrap();
        mgr.resume(&m.id).await.unwrap();
        assert!(mgr.wait_until_settled(&m.id).await.is_err());
        assert_eq!(store.load(&m.id).unwrap(), mgr.get(&m.id));
        assert_eq!(mgr.get(&m.id).unwrap().status(), DownloadStatus::Failed);

        // Resuming right after the failure must not let the late failure
        // write land on top of the new state.
        mgr.resume(&m.id).await.unwrap();
        let done = mgr.wait_until_settled(&m.id).await.unwrap();
        assert_eq!(done.status(), DownloadStatus::Completed);
        assert_eq!(store.load(&m.id).unwrap(), Some(done));
    }
}
