use async_trait::async_trait;
use common_types::{Asset, AssetVariant, Fingerprint, LibrarySnapshot, RemoteError, RemoteLibrary};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory stand-in for the photo service, per the replaceable-port
/// seam.
pub(crate) struct MockRemote {
    pub snapshot: Mutex<LibrarySnapshot>,
    pub bodies: HashMap<Fingerprint, Vec<u8>>,
    pub downloads: AtomicUsize,
    pub refreshes: AtomicUsize,
    /// 1-based index of the download call that fails with an expired
    /// session; zero disables the failure.
    pub fail_download_call: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
}

impl MockRemote {
    pub fn new(snapshot: LibrarySnapshot, bodies: HashMap<Fingerprint, Vec<u8>>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            bodies,
            downloads: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            fail_download_call: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteLibrary for MockRemote {
    async fn fetch_all(&self) -> Result<LibrarySnapshot, RemoteError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn download_asset(&self, asset: &Asset, dest: &Path) -> Result<(), RemoteError> {
        let call = self.downloads.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_download_call.load(Ordering::SeqCst) {
            return Err(RemoteError::SessionExpired);
        }
        let body = self
            .bodies
            .get(&asset.fingerprint)
            .cloned()
            .ok_or_else(|| RemoteError::MalformedRecord {
                record_name: asset.fingerprint.encoded(),
                reason: "no such asset".into(),
            })?;
        tokio::fs::write(dest, body)
            .await
            .map_err(|e| RemoteError::Transport(Box::new(e)))
    }

    async fn delete_assets(&self, record_names: &[String]) -> Result<(), RemoteError> {
        self.deleted
            .lock()
            .unwrap()
            .extend(record_names.iter().cloned());
        Ok(())
    }

    async fn refresh_session(&self) -> Result<(), RemoteError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn remote_asset(body: &[u8], name: &str, favorite: bool) -> Asset {
    Asset {
        fingerprint: Fingerprint::of_content(body),
        extension: "jpeg".into(),
        size: body.len() as u64,
        variant: AssetVariant::Original,
        favorite,
        record_name: Some(format!("rec-{name}")),
        original_filename: Some(name.into()),
        modified: None,
        download_url: Some(format!("https://photos.example/{name}")),
    }
}
