use crate::{Album, AlbumId, Asset, Fingerprint};
use std::collections::{HashMap, HashSet};

/// The complete set of assets and albums at a point in time.
///
/// Local and remote state share this schema; diffing operates over pairs of
/// snapshots. The album parent map is embedded in each [`Album`].
#[derive(Debug, Default, Clone)]
pub struct LibrarySnapshot {
    pub assets: HashMap<Fingerprint, Asset>,
    pub albums: HashMap<AlbumId, Album>,
}

impl LibrarySnapshot {
    pub fn insert_asset(&mut self, asset: Asset) {
        self.assets.insert(asset.fingerprint.clone(), asset);
    }

    pub fn insert_album(&mut self, album: Album) {
        self.albums.insert(album.id.clone(), album);
    }

    /// Number of parent hops to the library root. Orphaned parents count as
    /// roots, so a malformed snapshot cannot loop forever.
    #[must_use]
    pub fn album_depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut current = self.albums.get(id);
        let mut seen = HashSet::new();
        while let Some(album) = current {
            if !seen.insert(album.id.clone()) {
                break;
            }
            match &album.parent {
                Some(parent) => {
                    depth += 1;
                    current = self.albums.get(parent);
                }
                None => break,
            }
        }
        depth
    }

    /// Directory names from the library root down to this album, inclusive.
    #[must_use]
    pub fn album_path_names(&self, id: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.albums.get(id);
        let mut seen = HashSet::new();
        while let Some(album) = current {
            if !seen.insert(album.id.clone()) {
                break;
            }
            names.push(album.name.clone());
            current = album.parent.as_deref().and_then(|p| self.albums.get(p));
        }
        names.reverse();
        names
    }

    /// Whether the album, or any of its ancestors, is archived.
    #[must_use]
    pub fn under_archive(&self, id: &str) -> bool {
        let mut current = self.albums.get(id);
        let mut seen = HashSet::new();
        while let Some(album) = current {
            if album.is_archived() {
                return true;
            }
            if !seen.insert(album.id.clone()) {
                break;
            }
            current = album.parent.as_deref().and_then(|p| self.albums.get(p));
        }
        false
    }

    /// Fingerprints still referenced from archived albums.
    ///
    /// A finished archival holds plain files, so this is normally empty; an
    /// interrupted one may leave symlinks behind, and those targets must
    /// survive asset deletion.
    #[must_use]
    pub fn archived_references(&self) -> HashSet<Fingerprint> {
        self.albums
            .values()
            .filter(|album| album.is_archived())
            .flat_map(|album| album.members.values().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlbumKind;

    fn album(id: &str, name: &str, parent: Option<&str>, kind: AlbumKind) -> Album {
        Album::new(id.into(), name.into(), parent.map(String::from), kind)
    }

    fn sample() -> LibrarySnapshot {
        let mut snapshot = LibrarySnapshot::default();
        snapshot.insert_album(album("f1", "Trips", None, AlbumKind::Folder));
        snapshot.insert_album(album("a1", "Norway", Some("f1"), AlbumKind::Album));
        snapshot.insert_album(album("a2", "Pets", None, AlbumKind::Archived));
        snapshot
    }

    #[test]
    fn test_album_depth_counts_parent_hops() {
        let snapshot = sample();
        assert_eq!(snapshot.album_depth("f1"), 0);
        assert_eq!(snapshot.album_depth("a1"), 1);
    }

    #[test]
    fn test_album_path_names_root_first() {
        let snapshot = sample();
        assert_eq!(snapshot.album_path_names("a1"), vec!["Trips", "Norway"]);
    }

    #[test]
    fn test_under_archive_walks_ancestors() {
        let mut snapshot = sample();
        snapshot.insert_album(album("a3", "Cats", Some("a2"), AlbumKind::Album));
        assert!(snapshot.under_archive("a2"));
        assert!(snapshot.under_archive("a3"));
        assert!(!snapshot.under_archive("a1"));
    }

    #[test]
    fn test_archived_references_collects_member_fingerprints() {
        let mut snapshot = sample();
        let fingerprint = Fingerprint::of_content(b"cat");
        snapshot
            .albums
            .get_mut("a2")
            .unwrap()
            .members
            .insert("cat.jpeg".into(), fingerprint.clone());
        assert!(snapshot.archived_references().contains(&fingerprint));
    }
}
