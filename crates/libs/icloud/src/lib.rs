#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod client;
mod error;
mod mfa;
mod records;
mod session;

pub use client::*;
pub use error::*;
pub use mfa::*;
pub use records::*;
pub use session::*;
