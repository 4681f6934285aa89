use common_types::{
    Album, ArchiveObserver, Asset, AuthObserver, Fingerprint, MfaMethod, SnapshotCounts,
    SyncObserver,
};
use tracing::{info, warn};

/// Tracing-backed observers for interactive and daemon use.

pub struct ConsoleAuthObserver;

impl AuthObserver for ConsoleAuthObserver {
    fn state_changed(&self, state: &str) {
        info!("🔑 Session state: {state}");
    }
    fn mfa_required(&self) {
        info!("📱 MFA required, waiting for a code on the local endpoint");
    }
    fn mfa_received(&self, method: MfaMethod, _code: &str) {
        info!("Received MFA code via {method}");
    }
    fn mfa_resent(&self, method: MfaMethod) {
        info!("Requested a new MFA code via {method}");
    }
    fn trust_token_stored(&self) {
        info!("Trust token stored for future sign-ins");
    }
    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}

pub struct ConsoleSyncObserver;

impl SyncObserver for ConsoleSyncObserver {
    fn sync_started(&self) {
        info!("🔄 Starting sync");
    }
    fn snapshots_loaded(&self, local: SnapshotCounts, remote: SnapshotCounts) {
        info!(
            "Loaded snapshots: local {}/{} (assets/albums), remote {}/{}",
            local.assets, local.albums, remote.assets, remote.albums
        );
    }
    fn diff_computed(&self, to_add: usize, to_keep: usize, to_delete: usize) {
        info!("🧮 Diff: {to_add} to add, {to_keep} to keep, {to_delete} to delete");
    }
    fn asset_written(&self, asset: &Asset) {
        info!("⬇️  {}", asset.link_name());
    }
    fn asset_deleted(&self, fingerprint: &Fingerprint) {
        info!("🗑️  Removed {fingerprint}");
    }
    fn album_written(&self, album: &Album) {
        info!("📁 {}", album.name);
    }
    fn retrying(&self, attempt: u32, cause: &str) {
        warn!("♻️  Attempt {attempt} failed ({cause}), refreshing session and retrying");
    }
    fn sync_completed(&self) {
        info!("✅ Sync complete");
    }
    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}

pub struct ConsoleArchiveObserver;

impl ArchiveObserver for ConsoleArchiveObserver {
    fn asset_persisted(&self, link_name: &str) {
        info!("🧊 {link_name}");
    }
    fn favorite_kept(&self, link_name: &str) {
        info!("⭐ Keeping favorite {link_name} in the remote library");
    }
    fn remote_deleted(&self, count: usize) {
        info!("Deleted {count} remote original(s)");
    }
    fn warning(&self, message: &str) {
        warn!("{message}");
    }
}
