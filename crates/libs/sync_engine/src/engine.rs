use crate::{SnapshotDiff, SyncError, diff};
use common_types::{Asset, LibrarySnapshot, RemoteError, RemoteLibrary, SnapshotCounts, SyncObserver};
use photo_library::LocalLibrary;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Attempts of the whole pipeline before a recoverable failure turns
    /// fatal.
    pub max_retries: u32,
    /// Concurrent asset downloads.
    pub download_threads: usize,
    /// Download attempts per asset when the received bytes fail
    /// verification.
    pub per_asset_retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            download_threads: 16,
            per_asset_retries: 3,
        }
    }
}

/// Orchestrates fetch → diff → write against a remote library and the
/// local tree.
pub struct SyncEngine<C> {
    remote: Arc<C>,
    library: Arc<LocalLibrary>,
    observer: Arc<dyn SyncObserver>,
    options: SyncOptions,
}

impl<C: RemoteLibrary + 'static> SyncEngine<C> {
    pub fn new(
        remote: Arc<C>,
        library: Arc<LocalLibrary>,
        observer: Arc<dyn SyncObserver>,
        options: SyncOptions,
    ) -> Self {
        Self {
            remote,
            library,
            observer,
            options,
        }
    }

    /// Run one sync to completion, refreshing the session and restarting
    /// the pipeline on recoverable failures, up to the retry bound.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.run_once(cancel).await {
                Ok(()) => {
                    self.observer.sync_completed();
                    return Ok(());
                }
                Err(_) if cancel.is_cancelled() => return Err(SyncError::Interrupted),
                Err(e) if e.is_recoverable() && attempt < self.options.max_retries => {
                    warn!("Sync attempt {attempt} failed, refreshing session: {e}");
                    self.observer.retrying(attempt, &e.to_string());
                    self.remote.refresh_session().await?;
                }
                Err(e) if e.is_recoverable() => {
                    return Err(SyncError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_once(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.observer.sync_started();

        // Phase 1: load both snapshots in parallel.
        let library = self.library.clone();
        let local_task = tokio::task::spawn_blocking(move || library.read_snapshot());
        let (local, remote_snapshot) = tokio::join!(local_task, self.remote.fetch_all());
        let local = local.map_err(|_| SyncError::SnapshotPanic)??;
        let remote_snapshot = remote_snapshot?;
        info!(
            "📚 Local: {} assets in {} albums, remote: {} assets in {} albums",
            local.assets.len(),
            local.albums.len(),
            remote_snapshot.assets.len(),
            remote_snapshot.albums.len()
        );
        self.observer
            .snapshots_loaded(counts(&local), counts(&remote_snapshot));

        // Phase 2: diff.
        let changes = diff(&local, &remote_snapshot);
        self.observer.diff_computed(
            changes.assets_to_add.len(),
            changes.assets_to_keep.len(),
            changes.assets_to_delete.len(),
        );

        // Phase 3a: assets. Deletions strictly follow the additions so a
        // rename-by-fingerprint cannot race.
        self.write_assets(&changes, cancel).await?;
        if cancel.is_cancelled() {
            return Err(SyncError::Interrupted);
        }
        let deletions = self.library.delete_assets(&changes.assets_to_delete)?;
        for fingerprint in &deletions.deleted {
            self.observer.asset_deleted(fingerprint);
        }

        // Phase 3b: albums. Stranded archives move out of the way first,
        // then creations walk down the tree and deletions back up.
        for id in &changes.stranded_archives {
            self.library.move_stranded_archive(&local, id)?;
        }
        for id in &changes.albums_to_write {
            if cancel.is_cancelled() {
                return Err(SyncError::Interrupted);
            }
            self.library.write_album(&remote_snapshot, id)?;
            if let Some(album) = remote_snapshot.albums.get(id) {
                self.observer.album_written(album);
            }
        }
        for id in &changes.albums_to_delete {
            self.library.delete_album(&local, id)?;
        }

        // Asset deletions deferred on a still-standing album link get one
        // more chance now that memberships are rewritten.
        let retried = self.library.delete_assets(&deletions.deferred)?;
        for fingerprint in &retried.deleted {
            self.observer.asset_deleted(fingerprint);
        }
        for fingerprint in &retried.deferred {
            let message = format!("Asset {fingerprint} is still referenced; leaving it in place");
            self.observer.warning(&message);
        }
        Ok(())
    }

    /// Download everything in `assets_to_add` through a bounded worker
    /// pool. The first failure cancels the pool; in-flight downloads drain
    /// and their staged temp files are removed on drop.
    async fn write_assets(
        &self,
        changes: &SnapshotDiff,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if changes.assets_to_add.is_empty() {
            return Ok(());
        }
        let pool_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.options.download_threads));
        let mut tasks: JoinSet<Result<Asset, SyncError>> = JoinSet::new();

        for asset in changes.assets_to_add.clone() {
            let semaphore = semaphore.clone();
            let remote = self.remote.clone();
            let library = self.library.clone();
            let cancel = pool_cancel.clone();
            let budget = self.options.per_asset_retries;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SyncError::Interrupted)?;
                if cancel.is_cancelled() {
                    return Err(SyncError::Interrupted);
                }
                download_one(&remote, &library, asset, budget, &cancel).await
            });
        }

        let mut first_error: Option<SyncError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(asset)) => self.observer.asset_written(&asset),
                Ok(Err(SyncError::Interrupted)) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        pool_cancel.cancel();
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        pool_cancel.cancel();
                        first_error = Some(SyncError::DownloadPanic(join_error.to_string()));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if cancel.is_cancelled() => Err(SyncError::Interrupted),
            None => Ok(()),
        }
    }
}

async fn download_one<C: RemoteLibrary>(
    remote: &Arc<C>,
    library: &LocalLibrary,
    asset: Asset,
    budget: u32,
    cancel: &CancellationToken,
) -> Result<Asset, SyncError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let staged = library.stage_asset(&asset)?;
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(SyncError::Interrupted),
            result = remote.download_asset(&asset, staged.path()) => result,
        };
        match result {
            Ok(()) => {
                staged.commit()?;
                return Ok(asset);
            }
            Err(e @ RemoteError::Integrity { .. }) if attempt < budget => {
                warn!(
                    "Integrity mismatch for {} (attempt {attempt}/{budget}): {e}",
                    asset.file_name()
                );
            }
            Err(RemoteError::Integrity {
                record_name,
                detail,
            }) => {
                return Err(SyncError::IntegrityExhausted {
                    record_name: record_name.clone(),
                    attempts: attempt,
                    source: RemoteError::Integrity {
                        record_name,
                        detail,
                    },
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn counts(snapshot: &LibrarySnapshot) -> SnapshotCounts {
    SnapshotCounts {
        assets: snapshot.assets.len(),
        albums: snapshot.albums.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRemote, remote_asset};
    use common_types::{Album, AlbumKind, Fingerprint, NullObserver};
    use photo_library::parse_asset_file_name;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    fn engine_with(
        remote: Arc<MockRemote>,
        library: Arc<LocalLibrary>,
        options: SyncOptions,
    ) -> SyncEngine<MockRemote> {
        SyncEngine::new(remote, library, Arc::new(NullObserver), options)
    }

    /// Twenty queued downloads with concurrency four; a simulated session
    /// expiry on the seventh aborts the pool, the engine refreshes once
    /// and the retry completes the set.
    #[tokio::test]
    async fn test_recoverable_failure_mid_pool_refreshes_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(LocalLibrary::open(dir.path()).unwrap());

        let mut snapshot = LibrarySnapshot::default();
        let mut bodies = HashMap::new();
        for i in 0..20 {
            let body = format!("asset body {i:02}");
            let asset = remote_asset(body.as_bytes(), &format!("IMG_{i:02}.jpeg"), false);
            bodies.insert(asset.fingerprint.clone(), body.into_bytes());
            snapshot.insert_asset(asset);
        }
        let remote = Arc::new(MockRemote::new(snapshot.clone(), bodies));
        remote.fail_download_call.store(7, Ordering::SeqCst);

        let engine = engine_with(
            remote.clone(),
            library.clone(),
            SyncOptions {
                max_retries: 3,
                download_threads: 4,
                per_asset_retries: 2,
            },
        );
        engine.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(remote.refreshes.load(Ordering::SeqCst), 1);

        // Exactly twenty files, each named by the fingerprint of its bytes.
        let mut count = 0;
        for entry in std::fs::read_dir(library.layout().all_photos_dir()).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().into_owned();
            let (fingerprint, _) = parse_asset_file_name(&name).unwrap();
            let body = std::fs::read(entry.path()).unwrap();
            assert_eq!(Fingerprint::of_content(&body), fingerprint);
            count += 1;
        }
        assert_eq!(count, 20);

        let local = library.read_snapshot().unwrap();
        let local_keys: std::collections::HashSet<_> = local.assets.keys().collect();
        let remote_keys: std::collections::HashSet<_> = snapshot.assets.keys().collect();
        assert_eq!(local_keys, remote_keys);
    }

    #[tokio::test]
    async fn test_sync_mirrors_remote_and_applies_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(LocalLibrary::open(dir.path()).unwrap());

        let mut snapshot = LibrarySnapshot::default();
        let mut bodies = HashMap::new();
        let mut album = Album::new("a1".into(), "Norway".into(), Some("f1".into()), AlbumKind::Album);
        for i in 0..3 {
            let body = format!("member {i}");
            let asset = remote_asset(body.as_bytes(), &format!("IMG_{i}.jpeg"), false);
            bodies.insert(asset.fingerprint.clone(), body.into_bytes());
            album
                .members
                .insert(asset.link_name(), asset.fingerprint.clone());
            snapshot.insert_asset(asset);
        }
        let loose = remote_asset(b"loose", "IMG_9.jpeg", false);
        bodies.insert(loose.fingerprint.clone(), b"loose".to_vec());
        snapshot.insert_asset(loose.clone());
        snapshot.insert_album(Album::new(
            "f1".into(),
            "Trips".into(),
            None,
            AlbumKind::Folder,
        ));
        snapshot.insert_album(album);

        let remote = Arc::new(MockRemote::new(snapshot.clone(), bodies));
        let engine = engine_with(remote.clone(), library.clone(), SyncOptions::default());
        let cancel = CancellationToken::new();
        engine.run(&cancel).await.unwrap();

        let local = library.read_snapshot().unwrap();
        assert_eq!(local.assets.len(), 4);
        assert_eq!(local.albums.len(), 2);
        assert_eq!(local.albums["a1"].parent.as_deref(), Some("f1"));
        assert_eq!(local.albums["a1"].members.len(), 3);
        assert!(dir.path().join("Trips").join("Norway").is_dir());

        // The loose asset disappears remotely; the next sync removes it.
        {
            let mut current = remote.snapshot.lock().unwrap();
            current.assets.remove(&loose.fingerprint);
        }
        engine.run(&cancel).await.unwrap();
        let local = library.read_snapshot().unwrap();
        assert_eq!(local.assets.len(), 3);
        assert!(
            library
                .find_asset_file(&loose.fingerprint)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sync_after_archive_leaves_frozen_content_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(LocalLibrary::open(dir.path()).unwrap());

        let mut snapshot = LibrarySnapshot::default();
        let mut bodies = HashMap::new();
        let body = b"irreplaceable pet photo".to_vec();
        let asset = remote_asset(&body, "IMG_0.jpeg", false);
        bodies.insert(asset.fingerprint.clone(), body.clone());
        let mut album = Album::new("a1".into(), "Pets".into(), None, AlbumKind::Album);
        album
            .members
            .insert(asset.link_name(), asset.fingerprint.clone());
        snapshot.insert_asset(asset.clone());
        snapshot.insert_album(album);

        let remote = Arc::new(MockRemote::new(snapshot, bodies));
        let engine = engine_with(remote.clone(), library.clone(), SyncOptions::default());
        let cancel = CancellationToken::new();
        engine.run(&cancel).await.unwrap();

        library.persist_album(&dir.path().join("Pets")).unwrap();

        // The album and its asset disappear remotely; the frozen copy must
        // survive the next sync bytewise.
        {
            let mut current = remote.snapshot.lock().unwrap();
            current.assets.remove(&asset.fingerprint);
            current.albums.remove("a1");
        }
        engine.run(&cancel).await.unwrap();

        let frozen = dir.path().join("Pets").join("IMG_0.jpeg");
        assert_eq!(std::fs::read(&frozen).unwrap(), body);
        // The store copy is gone along with the remote asset; the archive
        // holds the only remaining bytes.
        assert!(
            library
                .find_asset_file(&asset.fingerprint)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cancelled_sync_reports_interruption() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(LocalLibrary::open(dir.path()).unwrap());
        let mut snapshot = LibrarySnapshot::default();
        let mut bodies = HashMap::new();
        let body = b"lone asset".to_vec();
        let asset = remote_asset(&body, "IMG_0.jpeg", false);
        bodies.insert(asset.fingerprint.clone(), body);
        snapshot.insert_asset(asset);

        let remote = Arc::new(MockRemote::new(snapshot, bodies));
        let engine = engine_with(remote, library, SyncOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            engine.run(&cancel).await,
            Err(SyncError::Interrupted)
        ));
    }
}
