use crate::SyncError;
use common_types::{ArchiveObserver, LibrarySnapshot, RemoteLibrary};
use photo_library::LocalLibrary;
use std::path::Path;
use tracing::{info, warn};

/// Freeze the album at `path` and, when asked, delete the corresponding
/// non-favorite originals remotely.
///
/// Favorites are never deleted remotely; each one is reported as a
/// warning. A failed remote deletion is also only a warning: the local
/// archival stands either way.
pub async fn run_archive<C: RemoteLibrary>(
    library: &LocalLibrary,
    remote: &C,
    remote_snapshot: &LibrarySnapshot,
    path: &Path,
    remote_delete: bool,
    observer: &dyn ArchiveObserver,
) -> Result<(), SyncError> {
    let persisted = library.persist_album(path)?;
    info!(
        "🧊 Froze album {} with {} member(s)",
        persisted.album_id,
        persisted.members.len()
    );
    for member in &persisted.members {
        observer.asset_persisted(&member.link_name);
    }

    if !remote_delete {
        return Ok(());
    }

    let mut deletions: Vec<String> = Vec::new();
    for member in &persisted.members {
        match remote_snapshot.assets.get(&member.fingerprint) {
            Some(asset) if asset.favorite => {
                let message = format!(
                    "Not deleting favorite {} from the remote library",
                    member.link_name
                );
                observer.favorite_kept(&member.link_name);
                observer.warning(&message);
            }
            Some(asset) => {
                if let Some(record_name) = &asset.record_name {
                    deletions.push(record_name.clone());
                }
            }
            None => {
                warn!(
                    "Archived member {} has no remote record, nothing to delete",
                    member.link_name
                );
            }
        }
    }
    deletions.sort();
    deletions.dedup();

    match remote.delete_assets(&deletions).await {
        Ok(()) => {
            info!("Deleted {} remote original(s)", deletions.len());
            observer.remote_deleted(deletions.len());
        }
        Err(e) => {
            let message = format!("Remote deletion after archival failed: {e}");
            observer.warning(&message);
        }
    }
    Ok(())
}
