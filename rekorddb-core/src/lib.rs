//! rekorddb-core: reader for Pioneer DJ export media
//!
//! This crate decodes the two binary file families found on SD/USB media
//! exported for CDJ/XDJ players:
//! - export.pdb / exportExt.pdb (DeviceSQL databases) - little-endian
//! - ANLZ files (.DAT, .EXT, .2EX) - big-endian
//!
//! Based on Deep Symmetry's reverse engineering documentation:
//! https://djl-analysis.deepsymmetry.org/rekordbox-export-analysis/

use std::path::Path;

pub mod anlz;
pub mod database;
pub mod error;
pub mod pdb;
pub mod phrase;
pub mod rows;
pub mod source;
pub mod string;

#[cfg(test)]
mod fixtures;

// Re-exports for convenience
pub use anlz::{AnlzFile, AnlzOptions, Section, SectionContent};
pub use database::{Collection, DanglingRef, ExtCollection, PlaylistFolderEntry};
pub use error::{Error, Result};
pub use pdb::{DbFile, Page, Table, TableKind};
pub use rows::{Row, TrackRow};
pub use source::ByteSource;

/// Open and fully index an `export.pdb` collection database.
pub fn open_database(path: impl AsRef<Path>) -> Result<Collection> {
    Collection::open(path)
}

/// Open and fully index an `exportExt.pdb` database (tags).
pub fn open_database_ext(path: impl AsRef<Path>) -> Result<ExtCollection> {
    ExtCollection::open(path)
}

/// Open an analysis file with default options.
pub fn open_analysis(path: impl AsRef<Path>) -> Result<AnlzFile> {
    AnlzFile::open(ByteSource::map_file(path)?)
}

/// Open an analysis file, controlling song-structure unmasking.
pub fn open_analysis_with(path: impl AsRef<Path>, options: AnlzOptions) -> Result<AnlzFile> {
    AnlzFile::open_with(ByteSource::map_file(path)?, options)
}
