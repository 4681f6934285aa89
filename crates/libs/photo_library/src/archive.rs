use crate::{ALBUM_MARKER, ARCHIVE_MARKER, LibraryError, LocalLibrary};
use common_types::{AlbumId, Fingerprint};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Result of freezing an album subtree: its identity and the members that
/// were materialized into it.
#[derive(Debug)]
pub struct PersistedAlbum {
    pub album_id: AlbumId,
    pub members: Vec<PersistedMember>,
}

#[derive(Debug)]
pub struct PersistedMember {
    pub link_name: String,
    pub fingerprint: Fingerprint,
}

impl LocalLibrary {
    /// Freeze the album at `path`: replace every member symlink in the
    /// subtree with a copy of the asset bytes, so the album becomes
    /// self-contained, then drop the `.archive` marker.
    ///
    /// A failure halfway through step one leaves a mixed state and is
    /// reported as fatal; nothing is rolled back.
    pub fn persist_album(&self, path: &Path) -> Result<PersistedAlbum, LibraryError> {
        let dir = self.validate_archive_target(path)?;
        let album_id = fs::read_to_string(dir.join(ALBUM_MARKER))?.trim().to_owned();
        let album_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut links: Vec<(String, Fingerprint, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).into_iter().filter_map(Result::ok) {
            if !entry.path_is_symlink() {
                continue;
            }
            let link_name = entry.file_name().to_string_lossy().into_owned();
            let Some(fingerprint) = self.resolve_member(entry.path()) else {
                warn!("Skipping dangling symlink while archiving: {}", entry.path().display());
                continue;
            };
            links.push((link_name, fingerprint, entry.path().to_path_buf()));
        }

        let mut members = Vec::with_capacity(links.len());
        for (link_name, fingerprint, link_path) in links {
            persist_member(&link_path).map_err(|source| LibraryError::ArchiveIncomplete {
                album: album_name.clone(),
                link_name: link_name.clone(),
                source,
            })?;
            members.push(PersistedMember {
                link_name,
                fingerprint,
            });
        }

        fs::write(dir.join(ARCHIVE_MARKER), "")?;
        Ok(PersistedAlbum { album_id, members })
    }

    fn validate_archive_target(&self, path: &Path) -> Result<PathBuf, LibraryError> {
        let dir = fs::canonicalize(path).map_err(|_| LibraryError::NotAnAlbum {
            path: path.to_path_buf(),
        })?;
        let data_dir = fs::canonicalize(self.layout().data_dir())?;
        let all_photos = fs::canonicalize(self.layout().all_photos_dir())?;

        if !dir.starts_with(&data_dir) || dir == data_dir {
            return Err(LibraryError::OutsideLibrary { path: dir });
        }
        if dir == all_photos || dir.starts_with(&all_photos) {
            return Err(LibraryError::CannotArchiveAssetStore);
        }
        if dir.join(ARCHIVE_MARKER).exists() {
            return Err(LibraryError::AlreadyArchived { path: dir });
        }
        if !dir.join(ALBUM_MARKER).is_file() {
            return Err(LibraryError::NotAnAlbum { path: dir });
        }
        Ok(dir)
    }
}

fn persist_member(link_path: &Path) -> std::io::Result<()> {
    let target = fs::canonicalize(link_path)?;
    fs::remove_file(link_path)?;
    fs::copy(&target, link_path)?;
    Ok(())
}
