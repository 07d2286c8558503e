//! Download state across restarts and under arbitrary suspend/resume
//! sequences, against the on-disk manifest store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use appferry::manager::{
    DownloadManager, FileManifestStore, ManagerConfig, ManagerError, ManagerResult, ManifestStore,
    Transfer, TransferProgress,
};
use appferry::package::{
    AccountRef, DownloadStatus, DownloadTicket, PackageDescriptor, PackageManifest, Software,
};
use appferry::BoxFuture;
use proptest::prelude::*;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Appends `step` bytes per call to a partial file of `total` bytes, then
/// waits to be cancelled. Never completes on its own.
struct SteppingTransfer {
    total: u64,
    step: u64,
}

impl SteppingTransfer {
    async fn run(
        &self,
        dest: &Path,
        progress: &TransferProgress,
        cancel: &CancellationToken,
    ) -> ManagerResult<u64> {
        let existing = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest)
            .await
            .unwrap();
        let step = self.step.min(self.total - existing);
        file.write_all(&vec![0x5A; step as usize]).await.unwrap();
        file.flush().await.unwrap();

        progress.set_total(self.total);
        progress.set_downloaded(existing + step);
        cancel.cancelled().await;
        Err(ManagerError::Cancelled {
            id: "stepping".to_string(),
        })
    }
}

impl Transfer for SteppingTransfer {
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

fn config(base: &Path) -> ManagerConfig {
    ManagerConfig::new(base).with_progress_interval(Duration::from_millis(5))
}

fn open(base: &Path, transfer: SteppingTransfer) -> DownloadManager {
    let config = config(base);
    let store = Arc::new(FileManifestStore::open(&config.state_dir).unwrap());
    DownloadManager::open(config, store, Arc::new(transfer)).unwrap()
}

fn account() -> AccountRef {
    AccountRef::new("acct-1", "a@example.com")
}

fn package() -> PackageDescriptor {
    PackageDescriptor::new(Software::new("com.example.app", "Example", "1.0"), "v1")
}

fn ticket() -> DownloadTicket {
    DownloadTicket::new("https://example.com/app.ipa")
}

#[tokio::test]
async fn test_suspended_progress_survives_restart() {
    let temp = TempDir::new().unwrap();
    let id = {
        let manager = open(temp.path(), SteppingTransfer { total: 1000, step: 400 });
        let m = manager.add(account(), package(), ticket()).await.unwrap();
        manager.resume(&m.id).await.unwrap();

        // Let the transfer write its bytes before suspending.
        let partial = manager.config().partial_path(&m.id);
        for _ in 0..200 {
            if std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0) == 400 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let paused = manager.suspend(&m.id).await.unwrap();
        assert_eq!(paused.status(), DownloadStatus::Paused);
        assert!((paused.state.percent - 0.4).abs() < 1e-9);
        m.id
    };

    let manager = open(temp.path(), SteppingTransfer { total: 1000, step: 100 });
    let reloaded = manager.get(&id).unwrap();
    assert_eq!(reloaded.status(), DownloadStatus::Paused);
    assert!((reloaded.state.percent - 0.4).abs() < 1e-9);
    assert_eq!(reloaded.hint(), "Paused");
    assert_eq!(
        std::fs::metadata(manager.config().partial_path(&id))
            .unwrap()
            .len(),
        400
    );
}

#[tokio::test]
async fn test_interrupted_download_reopens_paused() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path());
    let store = FileManifestStore::open(&config.state_dir).unwrap();

    // A record left behind by a process that died mid-transfer.
    let mut manifest = PackageManifest::new(account(), package(), ticket());
    manifest.state.mark_downloading();
    manifest.state.advance(0.25, "1.0 MB");
    store.save(&manifest).unwrap();

    let manager = open(temp.path(), SteppingTransfer { total: 1000, step: 100 });
    let reopened = manager.get(&manifest.id).unwrap();
    assert_eq!(reopened.status(), DownloadStatus::Paused);
    assert_eq!(reopened.state.percent, 0.25);
    assert!(reopened.state.speed.is_empty());
    assert_eq!(
        store.load(&manifest.id).unwrap().unwrap().status(),
        DownloadStatus::Paused
    );
}

#[tokio::test]
async fn test_delete_removes_record_and_files() {
    let temp = TempDir::new().unwrap();
    let manager = open(temp.path(), SteppingTransfer { total: 1000, step: 100 });
    let m = manager.add(account(), package(), ticket()).await.unwrap();
    manager.resume(&m.id).await.unwrap();

    manager.delete(&m.id).await.unwrap();
    manager.delete(&m.id).await.unwrap();

    assert!(manager.get(&m.id).is_none());
    assert!(!manager.config().partial_path(&m.id).exists());
    let reopened = open(temp.path(), SteppingTransfer { total: 1000, step: 100 });
    assert!(reopened.list().is_empty());
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Suspend,
    Resume,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Suspend), Just(Op::Resume)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_last_call_decides_status(ops in prop::collection::vec(op(), 1..10)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let temp = TempDir::new().unwrap();
            let manager = open(temp.path(), SteppingTransfer { total: 1000, step: 50 });
            let id = manager.add(account(), package(), ticket()).await.unwrap().id;

            let mut last_percent = 0.0;
            for op in &ops {
                let m = match op {
                    Op::Suspend => manager.suspend(&id).await.unwrap(),
                    Op::Resume => manager.resume(&id).await.unwrap(),
                };
                prop_assert!(m.state.percent >= last_percent);
                last_percent = m.state.percent;
            }

            let expected = match ops.iter().position(|op| matches!(op, Op::Resume)) {
                None => DownloadStatus::Pending,
                Some(_) => match ops[ops.len() - 1] {
                    Op::Resume => DownloadStatus::Downloading,
                    Op::Suspend => DownloadStatus::Paused,
                },
            };
            prop_assert_eq!(manager.get(&id).unwrap().status(), expected);

            manager.shutdown().await;
            Ok(())
        })?;
    }
}
