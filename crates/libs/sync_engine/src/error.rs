use common_types::RemoteError;
use photo_library::LibraryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("sync interrupted")]
    Interrupted,
    #[error("integrity check for {record_name} failed after {attempts} attempts")]
    IntegrityExhausted {
        record_name: String,
        attempts: u32,
        #[source]
        source: RemoteError,
    },
    #[error("sync failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },
    #[error("local snapshot reader panicked")]
    SnapshotPanic,
    #[error("download task panicked: {0}")]
    DownloadPanic(String),
    #[error("invalid cron expression {expr:?}")]
    Schedule {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
    #[error("daemon mode requires a schedule")]
    MissingSchedule,
}

impl SyncError {
    /// Whether the outer retry loop should refresh the session and run the
    /// pipeline again. Interruptions, filesystem failures and exhausted
    /// per-asset budgets never retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Remote(error) => error.is_recoverable(),
            _ => false,
        }
    }
}
