use common_types::{Album, AlbumId, Asset, Fingerprint, LibrarySnapshot};

/// The minimal change set turning the local snapshot into the remote one,
/// with archived subtrees carved out.
#[derive(Debug, Default)]
pub struct SnapshotDiff {
    pub assets_to_add: Vec<Asset>,
    pub assets_to_keep: Vec<Fingerprint>,
    pub assets_to_delete: Vec<Fingerprint>,
    /// Remote albums to create or refresh, parents before children.
    pub albums_to_write: Vec<AlbumId>,
    /// Local albums to remove, children before parents.
    pub albums_to_delete: Vec<AlbumId>,
    /// Local archived albums whose remote parent has disappeared; they get
    /// relocated under `_Archive` before any album is written.
    pub stranded_archives: Vec<AlbumId>,
}

/// Compare two snapshots. Assets pair up by fingerprint, albums by UUID; a
/// matched album that changed name or parent becomes delete + add, which
/// is safe because album directories own no asset bytes.
#[must_use]
pub fn diff(local: &LibrarySnapshot, remote: &LibrarySnapshot) -> SnapshotDiff {
    let mut out = SnapshotDiff::default();
    let archived_references = local.archived_references();

    for (fingerprint, asset) in &remote.assets {
        if local.assets.contains_key(fingerprint) {
            out.assets_to_keep.push(fingerprint.clone());
        } else {
            out.assets_to_add.push(asset.clone());
        }
    }
    for fingerprint in local.assets.keys() {
        if !remote.assets.contains_key(fingerprint) && !archived_references.contains(fingerprint) {
            out.assets_to_delete.push(fingerprint.clone());
        }
    }

    for id in remote.albums.keys() {
        if blocked_by_archive(local, remote, id) {
            continue;
        }
        match local.albums.get(id) {
            // Placement is the full path chain, so a renamed or moved
            // ancestor re-homes the whole subtree, not just itself.
            Some(_) if local.album_path_names(id) == remote.album_path_names(id) => {
                // Unchanged placement; membership still gets refreshed.
                out.albums_to_write.push(id.clone());
            }
            Some(_) => {
                out.albums_to_delete.push(id.clone());
                out.albums_to_write.push(id.clone());
            }
            None => out.albums_to_write.push(id.clone()),
        }
    }

    for (id, local_album) in &local.albums {
        if local_album.is_archived() {
            if let Some(parent) = &local_album.parent
                && !remote.albums.contains_key(parent)
            {
                out.stranded_archives.push(id.clone());
            }
            continue;
        }
        if local.under_archive(id) {
            continue;
        }
        if !remote.albums.contains_key(id) {
            out.albums_to_delete.push(id.clone());
        }
    }

    // Deterministic application order: creations walk down the tree,
    // deletions walk back up.
    out.assets_to_add
        .sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    out.albums_to_write
        .sort_by_key(|id| (remote.album_depth(id), id.clone()));
    out.albums_to_delete
        .sort_by_key(|id| (usize::MAX - local.album_depth(id), id.clone()));
    out.stranded_archives.sort();
    out
}

/// An archived local node anywhere on the album's chain blocks the change.
fn blocked_by_archive(local: &LibrarySnapshot, remote: &LibrarySnapshot, id: &str) -> bool {
    if local.under_archive(id) {
        return true;
    }
    let mut current = Some(id);
    while let Some(album_id) = current {
        if local.albums.get(album_id).is_some_and(Album::is_archived) {
            return true;
        }
        current = remote
            .albums
            .get(album_id)
            .and_then(|album| album.parent.as_deref());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::{AlbumKind, AssetVariant};
    use std::collections::HashSet;

    fn asset(body: &[u8]) -> Asset {
        Asset {
            fingerprint: Fingerprint::of_content(body),
            extension: "jpeg".into(),
            size: body.len() as u64,
            variant: AssetVariant::Original,
            favorite: false,
            record_name: Some(format!("rec-{}", String::from_utf8_lossy(body))),
            original_filename: None,
            modified: None,
            download_url: None,
        }
    }

    fn album(id: &str, name: &str, parent: Option<&str>, kind: AlbumKind) -> Album {
        Album::new(id.into(), name.into(), parent.map(String::from), kind)
    }

    /// Remote {F1,F2,F3} against local {F2,F3,F4}.
    #[test]
    fn test_minimal_asset_diff() {
        let (f1, f2, f3, f4) = (asset(b"F1"), asset(b"F2"), asset(b"F3"), asset(b"F4"));
        let mut remote = LibrarySnapshot::default();
        for a in [&f1, &f2, &f3] {
            remote.insert_asset(a.clone());
        }
        let mut local = LibrarySnapshot::default();
        for a in [&f2, &f3, &f4] {
            local.insert_asset(a.clone());
        }

        let diff = diff(&local, &remote);

        let to_add: HashSet<_> = diff
            .assets_to_add
            .iter()
            .map(|a| a.fingerprint.clone())
            .collect();
        assert_eq!(to_add, HashSet::from([f1.fingerprint]));
        let to_keep: HashSet<_> = diff.assets_to_keep.iter().cloned().collect();
        assert_eq!(to_keep, HashSet::from([f2.fingerprint, f3.fingerprint]));
        assert_eq!(diff.assets_to_delete, vec![f4.fingerprint]);
    }

    #[test]
    fn test_renamed_album_becomes_delete_plus_add() {
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("a1", "Old name", None, AlbumKind::Album));
        let mut remote = LibrarySnapshot::default();
        remote.insert_album(album("a1", "New name", None, AlbumKind::Album));

        let diff = diff(&local, &remote);
        assert_eq!(diff.albums_to_delete, vec!["a1"]);
        assert_eq!(diff.albums_to_write, vec!["a1"]);
    }

    #[test]
    fn test_archived_album_and_descendants_are_excluded() {
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("f1", "Frozen", None, AlbumKind::Archived));
        local.insert_album(album("a1", "Inside", Some("f1"), AlbumKind::Album));
        let frozen_asset = asset(b"frozen");
        local
            .albums
            .get_mut("f1")
            .unwrap()
            .members
            .insert("frozen.jpeg".into(), frozen_asset.fingerprint.clone());
        local.insert_asset(frozen_asset.clone());
        // Remote knows nothing about any of it anymore.
        let remote = LibrarySnapshot::default();

        let diff = diff(&local, &remote);
        assert!(diff.albums_to_delete.is_empty());
        assert!(diff.albums_to_write.is_empty());
        // The member referenced from the archived album survives.
        assert!(diff.assets_to_delete.is_empty());
        // Parent of the archived album is the library root, so nothing is
        // stranded either.
        assert!(diff.stranded_archives.is_empty());
    }

    #[test]
    fn test_archive_blocks_remote_changes_underneath() {
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("f1", "Trips", None, AlbumKind::Archived));
        let mut remote = LibrarySnapshot::default();
        remote.insert_album(album("f1", "Trips", None, AlbumKind::Folder));
        remote.insert_album(album("a1", "Fresh", Some("f1"), AlbumKind::Album));

        let diff = diff(&local, &remote);
        assert!(diff.albums_to_write.is_empty());
    }

    #[test]
    fn test_stranded_archive_detection() {
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("f1", "Trips", None, AlbumKind::Folder));
        local.insert_album(album("a1", "Pets", Some("f1"), AlbumKind::Archived));
        let remote = LibrarySnapshot::default();

        let diff = diff(&local, &remote);
        assert_eq!(diff.stranded_archives, vec!["a1"]);
        // The emptied parent folder itself is deletable.
        assert_eq!(diff.albums_to_delete, vec!["f1"]);
    }

    #[test]
    fn test_renamed_parent_rehomes_child_album() {
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("f1", "Old trips", None, AlbumKind::Folder));
        local.insert_album(album("a1", "Norway", Some("f1"), AlbumKind::Album));
        let mut remote = LibrarySnapshot::default();
        remote.insert_album(album("f1", "Trips", None, AlbumKind::Folder));
        remote.insert_album(album("a1", "Norway", Some("f1"), AlbumKind::Album));

        let diff = diff(&local, &remote);
        // The child's own name and parent are unchanged, but its path moved
        // with the renamed folder; both directories get rebuilt.
        assert_eq!(diff.albums_to_write, vec!["f1", "a1"]);
        assert_eq!(diff.albums_to_delete, vec!["a1", "f1"]);
    }

    #[test]
    fn test_album_ordering_parents_first_and_children_first() {
        let mut remote = LibrarySnapshot::default();
        remote.insert_album(album("c", "Leaf", Some("b"), AlbumKind::Album));
        remote.insert_album(album("b", "Mid", Some("a"), AlbumKind::Folder));
        remote.insert_album(album("a", "Root", None, AlbumKind::Folder));
        let mut local = LibrarySnapshot::default();
        local.insert_album(album("z", "Gone leaf", Some("y"), AlbumKind::Album));
        local.insert_album(album("y", "Gone root", None, AlbumKind::Folder));

        let diff = diff(&local, &remote);
        assert_eq!(diff.albums_to_write, vec!["a", "b", "c"]);
        assert_eq!(diff.albums_to_delete, vec!["z", "y"]);
    }
}
