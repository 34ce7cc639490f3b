use std::path::Path;

use anyhow::{Context, Result};
use compact_index::build_archive_indexes;
use tracing::info;

pub fn build_index(car: &Path, out_dir: &Path, epoch: u64, chunk_size: usize) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create {}", out_dir.display()))?;

    let built = build_archive_indexes(car, out_dir, epoch, chunk_size)
        .with_context(|| format!("index {}", car.display()))?;

    info!(
        sig = %built.sig_path.display(),
        slot = %built.slot_path.display(),
        "indexes sealed"
    );
    println!(
        "{}  {} entries",
        built.sig_path.display(),
        built.sig_entries
    );
    println!(
        "{}  {} entries",
        built.slot_path.display(),
        built.slot_entries
    );
    Ok(())
}
