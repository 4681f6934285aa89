use crate::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an asset carries the original capture or a user edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetVariant {
    Original,
    Edited,
}

/// A single media artifact.
///
/// Remote assets carry the full set of attributes; assets reconstructed from
/// the local tree only know what the file system encodes (fingerprint,
/// extension, size), so the remote-only attributes are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub size: u64,
    pub variant: AssetVariant,
    pub favorite: bool,
    pub record_name: Option<String>,
    pub original_filename: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub download_url: Option<String>,
}

impl Asset {
    /// An asset discovered on disk, known only by its content and extension.
    #[must_use]
    pub fn local(fingerprint: Fingerprint, extension: String, size: u64) -> Self {
        Self {
            fingerprint,
            extension,
            size,
            variant: AssetVariant::Original,
            favorite: false,
            record_name: None,
            original_filename: None,
            modified: None,
            download_url: None,
        }
    }

    /// File name under `_All-Photos`: encoded fingerprint plus extension.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.fingerprint.encoded(), self.extension)
    }

    /// Name of the symlink representing this asset inside an album.
    ///
    /// Edits share the original's remote filename, so they get a marker
    /// suffix to coexist with the original in the same directory.
    #[must_use]
    pub fn link_name(&self) -> String {
        let original = self
            .original_filename
            .clone()
            .unwrap_or_else(|| self.fingerprint.encoded());
        let stem = original
            .rsplit_once('.')
            .map_or(original.as_str(), |(stem, _)| stem)
            .to_owned();
        match self.variant {
            AssetVariant::Original => format!("{stem}.{}", self.extension),
            AssetVariant::Edited => format!("{stem}-edited.{}", self.extension),
        }
    }
}
