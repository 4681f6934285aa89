use crate::{
    ALBUM_MARKER, ARCHIVE_MARKER, LOCK_FILE, LibraryError, LocalLibrary, TRUST_TOKEN_FILE,
    parse_asset_file_name,
};
use common_types::{Album, AlbumId, AlbumKind, Asset, Fingerprint, LibrarySnapshot};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

impl LocalLibrary {
    /// Reconstruct the library state from the filesystem alone.
    ///
    /// Stray files, dangling links and unrecognized names are warned about
    /// and skipped; they never fail the read.
    pub fn read_snapshot(&self) -> Result<LibrarySnapshot, LibraryError> {
        let mut snapshot = LibrarySnapshot::default();
        self.read_assets(&mut snapshot)?;
        self.read_album_tree(self.layout().data_dir(), &mut snapshot)?;
        self.read_album_tree(&self.layout().archive_dir(), &mut snapshot)?;
        Ok(snapshot)
    }

    fn read_assets(&self, snapshot: &mut LibrarySnapshot) -> Result<(), LibraryError> {
        for entry in fs::read_dir(self.layout().all_photos_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type()?.is_file() {
                warn!("Skipping non-file entry in asset store: {name}");
                continue;
            }
            let Some((fingerprint, extension)) = parse_asset_file_name(&name) else {
                warn!("Skipping unrecognized file in asset store: {name}");
                continue;
            };
            if snapshot.assets.contains_key(&fingerprint) {
                warn!("Duplicate fingerprint in asset store: {name}");
                continue;
            }
            let size = entry.metadata()?.len();
            snapshot.insert_asset(Asset::local(fingerprint, extension, size));
        }
        Ok(())
    }

    fn read_album_tree(
        &self,
        root: &Path,
        snapshot: &mut LibrarySnapshot,
    ) -> Result<(), LibraryError> {
        let all_photos = self.layout().all_photos_dir();
        let archive_root = self.layout().archive_dir();
        let in_main_tree = root == self.layout().data_dir();
        let mut dir_ids: HashMap<PathBuf, AlbumId> = HashMap::new();

        let mut walker = WalkDir::new(root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable library entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if entry.file_type().is_dir() {
                if in_main_tree && (path == all_photos || path == archive_root) {
                    walker.skip_current_dir();
                    continue;
                }
                let Ok(id) = fs::read_to_string(path.join(ALBUM_MARKER)) else {
                    warn!("Skipping directory without album marker: {}", path.display());
                    walker.skip_current_dir();
                    continue;
                };
                let id = id.trim().to_owned();
                let parent = path.parent().and_then(|p| dir_ids.get(p)).cloned();
                let kind = if path.join(ARCHIVE_MARKER).exists() {
                    AlbumKind::Archived
                } else {
                    AlbumKind::Album
                };
                // A directory nested under an album makes the parent a folder.
                if let Some(parent_id) = &parent
                    && let Some(parent_album) = snapshot.albums.get_mut(parent_id)
                    && parent_album.kind == AlbumKind::Album
                {
                    parent_album.kind = AlbumKind::Folder;
                }
                dir_ids.insert(path.to_path_buf(), id.clone());
                snapshot.insert_album(Album::new(id, name, parent, kind));
            } else if entry.path_is_symlink() {
                let Some(album_id) = path.parent().and_then(|p| dir_ids.get(p)) else {
                    warn!("Skipping symlink outside any album: {}", path.display());
                    continue;
                };
                match self.resolve_member(path) {
                    Some(fingerprint) => {
                        if let Some(album) = snapshot.albums.get_mut(album_id) {
                            album.members.insert(name, fingerprint);
                        }
                    }
                    None => warn!("Skipping dangling or foreign symlink: {}", path.display()),
                }
            } else {
                if name == ALBUM_MARKER || name == ARCHIVE_MARKER {
                    continue;
                }
                let parent_archived = path
                    .parent()
                    .and_then(|p| dir_ids.get(p))
                    .and_then(|id| snapshot.albums.get(id))
                    .is_some_and(Album::is_archived);
                if parent_archived {
                    // Persisted content of a frozen album.
                    continue;
                }
                if entry.depth() == 1 && (name == LOCK_FILE || name == TRUST_TOKEN_FILE || name.starts_with('.')) {
                    continue;
                }
                warn!("Skipping stray file in library tree: {}", path.display());
            }
        }
        Ok(())
    }

    /// Fingerprint a member symlink points at, if the link resolves to a
    /// file inside `_All-Photos` with a well-formed name.
    pub(crate) fn resolve_member(&self, link_path: &Path) -> Option<Fingerprint> {
        let target = fs::canonicalize(link_path).ok()?;
        let all_photos = fs::canonicalize(self.layout().all_photos_dir()).ok()?;
        if !target.starts_with(&all_photos) {
            return None;
        }
        let name = target.file_name()?.to_str()?;
        parse_asset_file_name(name).map(|(fingerprint, _)| fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::AssetVariant;

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

    fn album(id: &str, name: &str, parent: Option<&str>, kind: AlbumKind) -> Album {
        Album::new(id.into(), name.into(), parent.map(String::from), kind)
    }

    /// Writing a snapshot and reading it back yields the same assets and
    /// album structure.
    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let library = LocalLibrary::open(dir.path()).unwrap();

        let mut snapshot = LibrarySnapshot::default();
        let beach = remote_asset(b"beach bytes", "IMG_1.jpeg");
        let cabin = remote_asset(b"cabin bytes", "IMG_2.jpeg");
        library.write_asset(&beach, b"beach bytes").unwrap();
        library.write_asset(&cabin, b"cabin bytes").unwrap();
        snapshot.insert_asset(beach.clone());
        snapshot.insert_asset(cabin.clone());

        snapshot.insert_album(album("f1", "Trips", None, AlbumKind::Folder));
        let mut norway = album("a1", "Norway", Some("f1"), AlbumKind::Album);
        norway
            .members
            .insert(beach.link_name(), beach.fingerprint.clone());
        norway
            .members
            .insert(cabin.link_name(), cabin.fingerprint.clone());
        snapshot.insert_album(norway);

        library.write_album(&snapshot, "f1").unwrap();
        library.write_album(&snapshot, "a1").unwrap();

        let local = library.read_snapshot().unwrap();
        assert_eq!(local.assets.len(), 2);
        for (fingerprint, asset) in &snapshot.assets {
            let read_back = &local.assets[fingerprint];
            assert_eq!(read_back.extension, asset.extension);
            assert_eq!(read_back.size, asset.size);
        }

        assert_eq!(local.albums.len(), 2);
        let trips = &local.albums["f1"];
        assert_eq!(trips.name, "Trips");
        assert_eq!(trips.kind, AlbumKind::Folder);
        let norway = &local.albums["a1"];
        assert_eq!(norway.parent.as_deref(), Some("f1"));
        assert_eq!(norway.members.len(), 2);
        assert_eq!(norway.members[&beach.link_name()], beach.fingerprint);
    }

    #[test]
    fn test_strays_and_dangling_links_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let library = LocalLibrary::open(dir.path()).unwrap();

        let asset = remote_asset(b"kept", "IMG_1.jpeg");
        library.write_asset(&asset, b"kept").unwrap();

        // Stray content the walker must step around.
        fs::write(library.layout().all_photos_dir().join("notes.txt"), b"?").unwrap();
        fs::write(
            library.layout().all_photos_dir().join(".tmp-abcdefgh"),
            b"partial",
        )
        .unwrap();
        fs::create_dir(dir.path().join("no-marker-here")).unwrap();

        let mut snapshot = LibrarySnapshot::default();
        let mut trip = album("a1", "Trip", None, AlbumKind::Album);
        trip.members
            .insert(asset.link_name(), asset.fingerprint.clone());
        snapshot.insert_asset(asset.clone());
        snapshot.insert_album(trip);
        library.write_album(&snapshot, "a1").unwrap();
        // A link whose target has disappeared.
        std::os::unix::fs::symlink(
            "../_All-Photos/does-not-exist.jpeg",
            dir.path().join("Trip").join("gone.jpeg"),
        )
        .unwrap();

        let local = library.read_snapshot().unwrap();
        assert_eq!(local.assets.len(), 1);
        assert_eq!(local.albums.len(), 1);
        assert_eq!(local.albums["a1"].members.len(), 1);
    }

    #[test]
    fn test_archived_album_reads_back_archived() {
        let dir = tempfile::tempdir().unwrap();
        let library = LocalLibrary::open(dir.path()).unwrap();

        let asset = remote_asset(b"frozen", "IMG_9.jpeg");
        library.write_asset(&asset, b"frozen").unwrap();
        let mut snapshot = LibrarySnapshot::default();
        let mut pets = album("a2", "Pets", None, AlbumKind::Album);
        pets.members
            .insert(asset.link_name(), asset.fingerprint.clone());
        snapshot.insert_asset(asset);
        snapshot.insert_album(pets);
        library.write_album(&snapshot, "a2").unwrap();
        library.persist_album(&dir.path().join("Pets")).unwrap();

        let local = library.read_snapshot().unwrap();
        assert_eq!(local.albums["a2"].kind, AlbumKind::Archived);
        // Persisted files are content, not members pointing at the store.
        assert!(local.albums["a2"].members.is_empty());
    }
}
