use std::path::Path;

use anyhow::{Context, Result};
use compact_index::verify_archive_index;

pub fn verify_index(car: &Path, index: &Path, chunk_size: usize) -> Result<()> {
    let report = verify_archive_index(car, index, chunk_size)
        .with_context(|| format!("verify {}", index.display()))?;
    println!(
        "{}: ok, {} {} entries checked",
        index.display(),
        report.checked,
        report.kind.name()
    );
    Ok(())
}
