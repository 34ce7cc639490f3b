//! Compact secondary indexes over epoch archives.
//!
//! Maps fixed-width lookup keys (transaction signatures, slot numbers)
//! to byte offsets inside an immutable archive file. Provides the
//! build/verify protocol, the mmap-backed point-lookup reader, and the
//! offline format-tag migration utility.

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod format;
pub mod index;
pub mod migrate;
pub mod scan;

pub use builder::IndexBuilder;
pub use error::{IndexError, Result};
pub use format::{IndexKind, IndexValue, OffsetAndSize, ShardedOffsetAndSize, LEGACY_MAGIC, MAGIC};
pub use index::CompactIndex;
pub use migrate::{migrate_magic, MigrationOutcome};
pub use scan::{build_archive_indexes, index_filename, verify_archive_index, BuiltIndexes, VerifyReport};
