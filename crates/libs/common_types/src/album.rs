use crate::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable remote identifier of an album (a UUID string).
pub type AlbumId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlbumKind {
    /// Contains other albums and folders, never assets.
    Folder,
    /// Contains assets, never album children.
    Album,
    /// Locally frozen subtree; participates in no future diffs.
    Archived,
}

/// A named container of asset references.
///
/// The parent relation forms a forest rooted at the library root; `members`
/// maps the symlink name inside the album directory to the linked asset's
/// fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: AlbumId,
    pub name: String,
    pub parent: Option<AlbumId>,
    pub kind: AlbumKind,
    pub members: BTreeMap<String, Fingerprint>,
}

impl Album {
    #[must_use]
    pub fn new(id: AlbumId, name: String, parent: Option<AlbumId>, kind: AlbumKind) -> Self {
        Self {
            id,
            name,
            parent,
            kind,
            members: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.kind == AlbumKind::Archived
    }
}
