use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::store::EpochStore;

pub fn get_block(
    car: &Path,
    index_dir: &Path,
    epoch: u64,
    slot: u64,
    chunk_size: usize,
) -> Result<()> {
    let store = EpochStore::open(car, index_dir, epoch, chunk_size)?;
    let found = store.find_block(slot)?;
    tracing::debug!(
        hits = store.counters().hits(),
        misses = store.counters().misses(),
        "lookup finished"
    );
    let Some(resp) = found else {
        bail!("slot {slot} not found in epoch {epoch} (skipped or out of range)");
    };

    let json = serde_json::to_string_pretty(&resp).context("serialize response")?;
    println!("{json}");
    store.release_block(resp);
    Ok(())
}
