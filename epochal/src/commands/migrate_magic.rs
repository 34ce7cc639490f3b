use std::path::Path;

use anyhow::{Context, Result};
use compact_index::{migrate_magic as rewrite, MigrationOutcome};

pub fn migrate_magic(index: &Path, dry_run: bool) -> Result<()> {
    let outcome =
        rewrite(index, dry_run).with_context(|| format!("migrate {}", index.display()))?;
    match outcome {
        MigrationOutcome::AlreadyCurrent => {
            println!("{}: already current, nothing to do", index.display());
        }
        MigrationOutcome::WouldRewrite => {
            println!("{}: legacy format tag, would rewrite (dry run)", index.display());
        }
        MigrationOutcome::Rewritten => {
            println!("{}: format tag rewritten", index.display());
        }
    }
    Ok(())
}
