use common_types::Fingerprint;
use std::path::{Path, PathBuf};

/// Directory holding one file per downloaded asset; the unique physical
/// home of every asset byte.
pub const ALL_PHOTOS_DIR: &str = "_All-Photos";
/// Top-level holding area for archived subtrees that lost their remote
/// parent.
pub const ARCHIVE_DIR: &str = "_Archive";
/// PID file of the process currently mutating the tree.
pub const LOCK_FILE: &str = ".library.lock";
/// Marker file inside an archived album directory.
pub const ARCHIVE_MARKER: &str = ".archive";
/// Per-album identity file holding the remote UUID, so album identity
/// survives renames and moves without a side database.
pub const ALBUM_MARKER: &str = ".album";
/// Persisted trust token, mode 0600.
pub const TRUST_TOKEN_FILE: &str = ".trust-token";

/// Path schema of the library tree under the data dir.
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    data_dir: PathBuf,
}

impl LibraryLayout {
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn all_photos_dir(&self) -> PathBuf {
        self.data_dir.join(ALL_PHOTOS_DIR)
    }

    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join(ARCHIVE_DIR)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    #[must_use]
    pub fn trust_token_file(&self) -> PathBuf {
        self.data_dir.join(TRUST_TOKEN_FILE)
    }

    /// Final path of an asset file inside `_All-Photos`.
    #[must_use]
    pub fn asset_path(&self, fingerprint: &Fingerprint, extension: &str) -> PathBuf {
        self.all_photos_dir()
            .join(format!("{}.{extension}", fingerprint.encoded()))
    }
}

/// Parse an `_All-Photos` file name back into fingerprint and extension.
#[must_use]
pub fn parse_asset_file_name(name: &str) -> Option<(Fingerprint, String)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    let fingerprint = Fingerprint::from_encoded(stem).ok()?;
    Some((fingerprint, extension.to_owned()))
}

/// Make an album or link name safe as a single path component.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_owned(),
        _ => cleaned,
    }
}
