use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use solana_signature::Signature;

use crate::store::EpochStore;

pub fn get_transaction(
    car: &Path,
    index_dir: &Path,
    epoch: u64,
    signature: &str,
    chunk_size: usize,
) -> Result<()> {
    let sig = Signature::from_str(signature)
        .map_err(|e| anyhow!("invalid signature {signature}: {e}"))?;

    let store = EpochStore::open(car, index_dir, epoch, chunk_size)?;
    let found = store.find_transaction(&sig)?;
    tracing::debug!(
        hits = store.counters().hits(),
        misses = store.counters().misses(),
        "lookup finished"
    );
    let Some(resp) = found else {
        bail!("transaction {sig} not found in epoch {epoch}");
    };

    let json = serde_json::to_string_pretty(&resp).context("serialize response")?;
    println!("{json}");
    store.release_transaction(resp);
    Ok(())
}
