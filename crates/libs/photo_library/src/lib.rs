#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod archive;
mod error;
mod layout;
mod lock;
mod snapshot;
mod writer;

pub use archive::*;
pub use error::*;
pub use layout::*;
pub use lock::*;
pub use writer::*;

use std::fs;
use std::path::Path;

/// The on-disk library tree. Sole source of truth about local state; every
/// mutation of the data dir goes through here or through the archive
/// engine.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    layout: LibraryLayout,
}

impl LocalLibrary {
    /// Open (and if needed initialize) the library under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, LibraryError> {
        let layout = LibraryLayout::new(data_dir.to_path_buf());
        fs::create_dir_all(layout.all_photos_dir())?;
        fs::create_dir_all(layout.archive_dir())?;
        Ok(Self { layout })
    }

    #[must_use]
    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }
}
