//! Error types for rekorddb-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated read at offset {at}: needed {needed} more bytes")]
    Truncated { at: u64, needed: u64 },

    #[error("bad magic at offset {at}: expected {expected:?}, found {found:?}")]
    BadMagic {
        at: u64,
        expected: String,
        found: String,
    },

    #[error("more than one table of type {0} in database file")]
    DuplicateTable(String),

    #[error("malformed page {index}: {reason}")]
    MalformedPage { index: u32, reason: String },

    #[error("malformed row at offset {at}: {reason}")]
    MalformedRow { at: u64, reason: String },

    #[error("malformed {fourcc} tag at offset {at}: {reason}")]
    MalformedTag {
        fourcc: String,
        at: u64,
        reason: String,
    },
}

impl Error {
    pub(crate) fn bad_magic(at: u64, expected: &[u8], found: &[u8]) -> Self {
        Error::BadMagic {
            at,
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: String::from_utf8_lossy(found).into_owned(),
        }
    }

    pub(crate) fn malformed_page(index: u32, reason: impl Into<String>) -> Self {
        Error::MalformedPage {
            index,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_row(at: u64, reason: impl Into<String>) -> Self {
        Error::MalformedRow {
            at,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_tag(fourcc: [u8; 4], at: u64, reason: impl Into<String>) -> Self {
        Error::MalformedTag {
            fourcc: String::from_utf8_lossy(&fourcc).into_owned(),
            at,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
