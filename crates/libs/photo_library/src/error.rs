use std::path::PathBuf;
use thiserror::Error;

/// A failed operation against the on-disk library. All variants are fatal
/// for the enclosing operation; malformed layout entries are warned about
/// and skipped instead of raised.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library is locked by process {pid}")]
    LockHeld { pid: String },
    #[error("{path:?} is outside the library data dir")]
    OutsideLibrary { path: PathBuf },
    #[error("{path:?} is not an album directory")]
    NotAnAlbum { path: PathBuf },
    #[error("{path:?} is already archived")]
    AlreadyArchived { path: PathBuf },
    #[error("the asset store cannot be archived")]
    CannotArchiveAssetStore,
    #[error("archival of {album:?} failed at {link_name:?}, leaving a mixed state")]
    ArchiveIncomplete {
        album: String,
        link_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("album {0} is not part of the snapshot")]
    UnknownAlbum(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
