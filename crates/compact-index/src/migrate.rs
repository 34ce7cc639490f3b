//! Offline rewrite of the 8-byte format tag.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::format::{LEGACY_MAGIC, MAGIC};

/// What [`migrate_magic`] did, or would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The file already carries the current tag; nothing to do.
    AlreadyCurrent,
    /// Dry run: the legacy tag was found and would be rewritten.
    WouldRewrite,
    /// The legacy tag was rewritten to the current one.
    Rewritten,
}

/// Rewrites the 8-byte format tag of a legacy index file in place.
///
/// This is a renaming migration, valid only because the body layout is
/// byte-identical across the two tags. The file's tag must match the
/// legacy tag exactly; anything else (other than the current tag,
/// which is reported as already migrated) is refused. Offline tool:
/// callers must ensure no reader has the file open.
pub fn migrate_magic(path: &Path, dry_run: bool) -> Result<MigrationOutcome> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut found = [0u8; 8];
    file.read_exact(&mut found)?;

    if found == MAGIC {
        tracing::info!(path = %path.display(), "index already carries the current tag");
        return Ok(MigrationOutcome::AlreadyCurrent);
    }
    if found != LEGACY_MAGIC {
        return Err(IndexError::UnsupportedFormat { found });
    }
    if dry_run {
        tracing::info!(
            path = %path.display(),
            from = %String::from_utf8_lossy(&LEGACY_MAGIC),
            to = %String::from_utf8_lossy(&MAGIC),
            "dry run: would rewrite format tag"
        );
        return Ok(MigrationOutcome::WouldRewrite);
    }

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&MAGIC)?;
    file.sync_all()?;
    tracing::info!(path = %path.display(), "rewrote legacy format tag");
    Ok(MigrationOutcome::Rewritten)
}
