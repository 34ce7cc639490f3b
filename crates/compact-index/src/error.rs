//! Error taxonomy shared by all index operations.

use car_reader::CarReadError;
use thiserror::Error;

/// Index error types.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Underlying storage failure. Not retried here; callers decide.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural violation in the source archive or index body.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The leading 8-byte tag is not one this build understands.
    /// Refuses to guess at the body layout.
    #[error("unsupported index format tag {found:02x?}")]
    UnsupportedFormat {
        /// The 8 bytes actually found at the start of the file.
        found: [u8; 8],
    },

    /// Verify found a disagreement between archive and index.
    #[error("index inconsistency for {kind} key {key}: expected {expected}, found {found}")]
    Inconsistent {
        /// Index kind name.
        kind: &'static str,
        /// The offending key, printable form.
        key: String,
        /// What the archive says.
        expected: String,
        /// What the index says ("absent" when the entry is missing).
        found: String,
    },
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

impl From<CarReadError> for IndexError {
    fn from(e: CarReadError) -> Self {
        match e {
            CarReadError::Io(s) => IndexError::Io(std::io::Error::other(s)),
            other => IndexError::MalformedArchive(other.to_string()),
        }
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
