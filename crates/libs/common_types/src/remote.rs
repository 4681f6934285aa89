use crate::{Asset, LibrarySnapshot};
use std::path::Path;
use thiserror::Error;

/// A failed operation against the photo service.
///
/// The variants split into recoverable conditions, which the sync engine
/// answers with a session refresh and a pipeline restart, and fatal ones,
/// which abort the run.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport failure")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("remote session expired")]
    SessionExpired,
    #[error("rate limited by the service")]
    RateLimited,
    #[error("server error {status}")]
    Server { status: u16 },
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("malformed record {record_name}: {reason}")]
    MalformedRecord { record_name: String, reason: String },
    #[error("integrity mismatch for {record_name}: {detail}")]
    Integrity { record_name: String, detail: String },
    #[error("authentication failed")]
    Auth {
        recoverable: bool,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RemoteError {
    /// Whether a fresh session and another attempt can fix this.
    ///
    /// Integrity mismatches are retried per asset inside the download pool,
    /// not by the outer loop, so they classify as fatal here.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::SessionExpired | Self::RateLimited | Self::Server { .. } => {
                true
            }
            Self::Auth { recoverable, .. } => *recoverable,
            Self::UnexpectedStatus { .. } | Self::MalformedRecord { .. } | Self::Integrity { .. } => {
                false
            }
        }
    }
}

/// The photo service as the sync engine sees it.
///
/// The record-zone protocol behind the real client is reverse-engineered and
/// drifts, so everything downstream of authentication goes through this
/// seam; tests substitute an in-memory implementation.
#[async_trait::async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Lists every album and asset record across all zones; pagination is
    /// internal and ordering is irrelevant.
    async fn fetch_all(&self) -> Result<LibrarySnapshot, RemoteError>;

    /// Streams the asset body to `dest`, verifying byte length and
    /// fingerprint on the fly.
    async fn download_asset(&self, asset: &Asset, dest: &Path) -> Result<(), RemoteError>;

    /// Deletes the given records remotely. Used by the archive engine.
    async fn delete_assets(&self, record_names: &[String]) -> Result<(), RemoteError>;

    /// Rebuilds the authenticated session from stored credentials, for
    /// mid-run recovery.
    async fn refresh_session(&self) -> Result<(), RemoteError>;
}
