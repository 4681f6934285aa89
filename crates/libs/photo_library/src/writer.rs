use crate::{ALBUM_MARKER, ALL_PHOTOS_DIR, ARCHIVE_MARKER, LibraryError, LocalLibrary, sanitize_name};
use common_types::{AlbumKind, Asset, Fingerprint, LibrarySnapshot};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Generate a URL-safe random ID of a given length.
#[must_use]
fn nice_id(length: usize) -> String {
    const URL_SAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_";
    (0..length)
        .map(|_| {
            let idx = rand::random_range(0..URL_SAFE.len());
            URL_SAFE[idx] as char
        })
        .collect()
}

/// A pending asset write: a dot-prefixed temp file in `_All-Photos` that
/// becomes the final fingerprint-named file on commit.
///
/// Dropping an uncommitted stage removes the temp file, which is what
/// cleans up after a cancelled or failed download.
#[derive(Debug)]
pub struct StagedAsset {
    temp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl StagedAsset {
    /// Where the body should be written before committing.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.temp_path
    }

    /// Atomically move the staged bytes to their final name.
    pub fn commit(mut self) -> Result<(), LibraryError> {
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedAsset {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Outcome of a batched asset deletion pass.
#[derive(Debug, Default)]
pub struct DeletedAssets {
    pub deleted: Vec<Fingerprint>,
    /// Still referenced by an album link; retried after the album phase.
    pub deferred: Vec<Fingerprint>,
}

impl LocalLibrary {
    pub fn stage_asset(&self, asset: &Asset) -> Result<StagedAsset, LibraryError> {
        let temp_path = self
            .layout()
            .all_photos_dir()
            .join(format!(".tmp-{}", nice_id(8)));
        let final_path = self
            .layout()
            .asset_path(&asset.fingerprint, &asset.extension);
        Ok(StagedAsset {
            temp_path,
            final_path,
            committed: false,
        })
    }

    /// Write a complete asset body atomically (temp file + rename).
    pub fn write_asset(&self, asset: &Asset, bytes: &[u8]) -> Result<(), LibraryError> {
        let staged = self.stage_asset(asset)?;
        fs::write(staged.path(), bytes)?;
        staged.commit()
    }

    /// Fingerprints currently referenced by at least one album symlink,
    /// archived subtrees included.
    pub fn referenced_fingerprints(&self) -> HashSet<Fingerprint> {
        let all_photos = self.layout().all_photos_dir();
        let mut referenced = HashSet::new();
        for entry in WalkDir::new(self.layout().data_dir())
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.path() != all_photos)
            .filter_map(Result::ok)
        {
            if entry.path_is_symlink()
                && let Some(fingerprint) = self.resolve_member(entry.path())
            {
                referenced.insert(fingerprint);
            }
        }
        referenced
    }

    /// Delete a single asset file, unless an album link still points at it.
    /// Returns whether the file is gone.
    pub fn delete_asset(&self, fingerprint: &Fingerprint) -> Result<bool, LibraryError> {
        let referenced = self.referenced_fingerprints();
        self.delete_asset_inner(fingerprint, &referenced)
    }

    /// Delete a batch of assets with one reference scan.
    pub fn delete_assets(&self, fingerprints: &[Fingerprint]) -> Result<DeletedAssets, LibraryError> {
        let referenced = self.referenced_fingerprints();
        let mut outcome = DeletedAssets::default();
        for fingerprint in fingerprints {
            if self.delete_asset_inner(fingerprint, &referenced)? {
                outcome.deleted.push(fingerprint.clone());
            } else {
                outcome.deferred.push(fingerprint.clone());
            }
        }
        Ok(outcome)
    }

    fn delete_asset_inner(
        &self,
        fingerprint: &Fingerprint,
        referenced: &HashSet<Fingerprint>,
    ) -> Result<bool, LibraryError> {
        if referenced.contains(fingerprint) {
            return Ok(false);
        }
        if let Some(path) = self.find_asset_file(fingerprint)? {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    /// Locate the asset file for a fingerprint, whatever its extension.
    pub fn find_asset_file(&self, fingerprint: &Fingerprint) -> Result<Option<PathBuf>, LibraryError> {
        let prefix = format!("{}.", fingerprint.encoded());
        for entry in fs::read_dir(self.layout().all_photos_dir())? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Directory of an album according to the parent chain in `snapshot`.
    pub fn album_dir(
        &self,
        snapshot: &LibrarySnapshot,
        album_id: &str,
    ) -> Result<PathBuf, LibraryError> {
        let names = snapshot.album_path_names(album_id);
        if names.is_empty() {
            return Err(LibraryError::UnknownAlbum(album_id.to_owned()));
        }
        let mut path = self.layout().data_dir().to_path_buf();
        for name in names {
            path.push(sanitize_name(&name));
        }
        Ok(path)
    }

    /// Create or refresh an album directory to match the snapshot: identity
    /// marker plus one fresh symlink per member. Archived directories are
    /// never touched.
    pub fn write_album(
        &self,
        snapshot: &LibrarySnapshot,
        album_id: &str,
    ) -> Result<(), LibraryError> {
        let album = snapshot
            .albums
            .get(album_id)
            .ok_or_else(|| LibraryError::UnknownAlbum(album_id.to_owned()))?;
        let dir = self.album_dir(snapshot, album_id)?;
        if self.under_archived_dir(&dir) {
            return Ok(());
        }

        fs::create_dir_all(&dir)?;
        fs::write(dir.join(ALBUM_MARKER), &album.id)?;
        if album.kind == AlbumKind::Folder {
            return Ok(());
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                fs::remove_file(entry.path())?;
            }
        }

        let up = "../".repeat(snapshot.album_path_names(album_id).len());
        for (link_name, fingerprint) in &album.members {
            let Some(asset) = snapshot.assets.get(fingerprint) else {
                warn!(
                    "Album {:?} references unknown asset {fingerprint}",
                    album.name
                );
                continue;
            };
            let target = PathBuf::from(format!("{up}{ALL_PHOTOS_DIR}/{}", asset.file_name()));
            std::os::unix::fs::symlink(&target, dir.join(sanitize_name(link_name)))?;
        }
        Ok(())
    }

    /// Remove an album directory: its symlinks, its identity marker, and
    /// then the directory itself if nothing else remains.
    pub fn delete_album(
        &self,
        snapshot: &LibrarySnapshot,
        album_id: &str,
    ) -> Result<(), LibraryError> {
        let album = snapshot
            .albums
            .get(album_id)
            .ok_or_else(|| LibraryError::UnknownAlbum(album_id.to_owned()))?;
        if album.is_archived() {
            return Ok(());
        }
        let dir = self.album_dir(snapshot, album_id)?;
        if !dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_symlink() || name == ALBUM_MARKER {
                fs::remove_file(entry.path())?;
            }
        }
        if let Err(e) = fs::remove_dir(&dir) {
            warn!("Leaving non-empty album directory {}: {e}", dir.display());
        }
        Ok(())
    }

    /// Relocate an archived album whose remote parent has disappeared into
    /// the top-level `_Archive` holding area.
    pub fn move_stranded_archive(
        &self,
        snapshot: &LibrarySnapshot,
        album_id: &str,
    ) -> Result<(), LibraryError> {
        let album = snapshot
            .albums
            .get(album_id)
            .ok_or_else(|| LibraryError::UnknownAlbum(album_id.to_owned()))?;
        let source = self.album_dir(snapshot, album_id)?;
        if !source.exists() {
            return Ok(());
        }
        let mut dest = self.layout().archive_dir().join(sanitize_name(&album.name));
        if dest.exists() {
            // Keep an earlier stranded archive of the same name intact.
            dest = self
                .layout()
                .archive_dir()
                .join(format!("{}-{}", sanitize_name(&album.name), album.id));
        }
        fs::rename(&source, &dest)?;
        Ok(())
    }

    fn under_archived_dir(&self, dir: &Path) -> bool {
        let mut current = Some(dir);
        while let Some(path) = current {
            if !path.starts_with(self.layout().data_dir()) {
                break;
            }
            if path.join(ARCHIVE_MARKER).exists() {
                return true;
            }
            current = path.parent();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::{Album, AssetVariant};

    fn test_library() -> (tempfile::TempDir, LocalLibrary) {
        let dir = tempfile::tempdir().unwrap();
        let library = LocalLibrary::open(dir.path()).unwrap();
        (dir, library)
    }

    fn remote_asset(body: &[u8], name: &str) -> Asset {
        Asset {
            fingerprint: Fingerprint::of_content(body),
            extension: "jpeg".into(),
            size: body.len() as u64,
            variant: AssetVariant::Original,
            favorite: false,
            record_name: Some(format!("rec-{name}")),
            original_filename: Some(name.into()),
            modified: None,
            download_url: None,
        }
    }

    #[test]
    fn test_commit_moves_staged_bytes_into_place() {
        let (_dir, library) = test_library();
        let asset = remote_asset(b"staged", "IMG_1.jpeg");

        let staged = library.stage_asset(&asset).unwrap();
        fs::write(staged.path(), b"staged").unwrap();
        let temp_path = staged.path().to_path_buf();
        staged.commit().unwrap();

        assert!(!temp_path.exists());
        let final_path = library
            .layout()
            .asset_path(&asset.fingerprint, &asset.extension);
        assert_eq!(fs::read(final_path).unwrap(), b"staged");
    }

    #[test]
    fn test_dropped_stage_removes_temp_file() {
        let (_dir, library) = test_library();
        let asset = remote_asset(b"abandoned", "IMG_2.jpeg");

        let staged = library.stage_asset(&asset).unwrap();
        fs::write(staged.path(), b"abandoned").unwrap();
        let temp_path = staged.path().to_path_buf();
        drop(staged);

        assert!(!temp_path.exists());
        assert!(
            library
                .find_asset_file(&asset.fingerprint)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_delete_defers_while_album_link_exists() {
        let (dir, library) = test_library();
        let asset = remote_asset(b"linked", "IMG_3.jpeg");
        library.write_asset(&asset, b"linked").unwrap();

        let mut snapshot = LibrarySnapshot::default();
        let mut album = Album::new("a1".into(), "Trip".into(), None, AlbumKind::Album);
        album
            .members
            .insert(asset.link_name(), asset.fingerprint.clone());
        snapshot.insert_asset(asset.clone());
        snapshot.insert_album(album);
        library.write_album(&snapshot, "a1").unwrap();

        let outcome = library.delete_assets(&[asset.fingerprint.clone()]).unwrap();
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.deferred, vec![asset.fingerprint.clone()]);
        assert!(library.find_asset_file(&asset.fingerprint).unwrap().is_some());

        // Once the album is gone the deferred delete goes through.
        library.delete_album(&snapshot, "a1").unwrap();
        assert!(library.delete_asset(&asset.fingerprint).unwrap());
        assert!(library.find_asset_file(&asset.fingerprint).unwrap().is_none());
        drop(dir);
    }

    #[test]
    fn test_write_album_refreshes_membership() {
        let (_dir, library) = test_library();
        let first = remote_asset(b"first", "IMG_4.jpeg");
        let second = remote_asset(b"second", "IMG_5.jpeg");
        library.write_asset(&first, b"first").unwrap();
        library.write_asset(&second, b"second").unwrap();

        let mut snapshot = LibrarySnapshot::default();
        let mut album = Album::new("a1".into(), "Trip".into(), None, AlbumKind::Album);
        album
            .members
            .insert(first.link_name(), first.fingerprint.clone());
        snapshot.insert_asset(first.clone());
        snapshot.insert_asset(second.clone());
        snapshot.insert_album(album);
        library.write_album(&snapshot, "a1").unwrap();

        // Membership changes remotely: first out, second in.
        let album = snapshot.albums.get_mut("a1").unwrap();
        album.members.clear();
        album
            .members
            .insert(second.link_name(), second.fingerprint.clone());
        library.write_album(&snapshot, "a1").unwrap();

        let read_back = library.read_snapshot().unwrap();
        let members = &read_back.albums["a1"].members;
        assert_eq!(members.len(), 1);
        assert!(members.contains_key(&second.link_name()));
    }

    #[test]
    fn test_move_stranded_archive_relocates_directory() {
        let (dir, library) = test_library();
        let asset = remote_asset(b"frozen", "IMG_6.jpeg");
        library.write_asset(&asset, b"frozen").unwrap();

        let mut snapshot = LibrarySnapshot::default();
        let mut album = Album::new("a1".into(), "Pets".into(), None, AlbumKind::Album);
        album
            .members
            .insert(asset.link_name(), asset.fingerprint.clone());
        snapshot.insert_asset(asset);
        snapshot.insert_album(album);
        library.write_album(&snapshot, "a1").unwrap();
        library.persist_album(&dir.path().join("Pets")).unwrap();

        let local = library.read_snapshot().unwrap();
        assert!(local.albums["a1"].is_archived());
        library.move_stranded_archive(&local, "a1").unwrap();

        assert!(!dir.path().join("Pets").exists());
        let moved = library.layout().archive_dir().join("Pets");
        assert!(moved.join(ARCHIVE_MARKER).exists());
        assert_eq!(fs::read(moved.join("IMG_6.jpeg")).unwrap(), b"frozen");
    }
}
