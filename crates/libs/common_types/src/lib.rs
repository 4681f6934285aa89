#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod album;
mod asset;
mod fingerprint;
mod observer;
mod remote;
mod snapshot;

pub use album::*;
pub use asset::*;
pub use fingerprint::*;
pub use observer::*;
pub use remote::*;
pub use snapshot::*;
