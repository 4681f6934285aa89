use crate::{Album, Asset, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel over which an MFA code travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    Device,
    Sms,
    Voice,
}

impl fmt::Display for MfaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Sms => f.write_str("sms"),
            Self::Voice => f.write_str("voice"),
        }
    }
}

// The observer traits below replace ad-hoc event subscriptions: each
// component takes one capability set and invokes it at defined points, so
// the CLI, the daemon, and the tests plug in without string-keyed events.
// All methods default to no-ops.

pub trait AuthObserver: Send + Sync {
    fn state_changed(&self, _state: &str) {}
    fn mfa_required(&self) {}
    fn mfa_received(&self, _method: MfaMethod, _code: &str) {}
    fn mfa_resent(&self, _method: MfaMethod) {}
    fn trust_token_stored(&self) {}
    fn warning(&self, _message: &str) {}
}

pub trait SyncObserver: Send + Sync {
    fn sync_started(&self) {}
    fn snapshots_loaded(&self, _local: SnapshotCounts, _remote: SnapshotCounts) {}
    fn diff_computed(&self, _to_add: usize, _to_keep: usize, _to_delete: usize) {}
    fn asset_written(&self, _asset: &Asset) {}
    fn asset_deleted(&self, _fingerprint: &Fingerprint) {}
    fn album_written(&self, _album: &Album) {}
    fn retrying(&self, _attempt: u32, _cause: &str) {}
    fn sync_completed(&self) {}
    fn warning(&self, _message: &str) {}
}

pub trait ArchiveObserver: Send + Sync {
    fn asset_persisted(&self, _link_name: &str) {}
    fn favorite_kept(&self, _link_name: &str) {}
    fn remote_deleted(&self, _count: usize) {}
    fn warning(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotCounts {
    pub assets: usize,
    pub albums: usize,
}

/// Discards every event. Default for tests and embedded use.
pub struct NullObserver;

impl AuthObserver for NullObserver {}
impl SyncObserver for NullObserver {}
impl ArchiveObserver for NullObserver {}
