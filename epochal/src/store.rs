use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use car_reader::node::{decode_block, decode_transaction, first_signature};
use car_reader::{CachingReader, CarReadError, CarSectionReader, Kind, NodeMeta, ObjectAccumulator};
use compact_index::{index_filename, CompactIndex, IndexKind};
use solana_signature::Signature;

use crate::pool::Pool;
use crate::response::{BlockResponse, TransactionResponse};

/// Hit/miss tallies for index lookups, labelled the way the serving
/// telemetry wants them.
#[derive(Debug, Default)]
pub struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCounters {
    fn hit(&self, kind: &'static str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind, locality = "local", split = false, "index hit");
    }

    fn miss(&self, kind: &'static str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind, locality = "local", split = false, "index miss");
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// One epoch's archive plus its sealed indexes, ready to serve point
/// lookups. Opens a fresh archive handle per lookup, so `&self`
/// methods need no interior locking on the read path.
pub struct EpochStore {
    car_path: PathBuf,
    sig_index: CompactIndex,
    slot_index: CompactIndex,
    chunk_size: usize,
    tx_pool: Pool<TransactionResponse>,
    block_pool: Pool<BlockResponse>,
    counters: LookupCounters,
}

impl std::fmt::Debug for EpochStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochStore")
            .field("car_path", &self.car_path)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl EpochStore {
    /// Opens the archive together with the epoch's indexes from
    /// `index_dir`, named by the canonical per-kind scheme.
    pub fn open(car_path: &Path, index_dir: &Path, epoch: u64, chunk_size: usize) -> Result<Self> {
        let sig_path = index_dir.join(index_filename(epoch, IndexKind::SigToOffset));
        let slot_path = index_dir.join(index_filename(epoch, IndexKind::SlotToOffset));

        let sig_index = CompactIndex::open(&sig_path)
            .with_context(|| format!("open signature index {}", sig_path.display()))?;
        let slot_index = CompactIndex::open(&slot_path)
            .with_context(|| format!("open slot index {}", slot_path.display()))?;

        for (index, want) in [
            (&sig_index, IndexKind::SigToOffset),
            (&slot_index, IndexKind::SlotToOffset),
        ] {
            if index.kind() != want {
                bail!(
                    "index kind mismatch: expected {}, found {}",
                    want.name(),
                    index.kind().name()
                );
            }
            if index.epoch() != epoch {
                bail!(
                    "index epoch mismatch: expected {epoch}, found {}",
                    index.epoch()
                );
            }
        }

        // Fail fast on a missing archive rather than on first lookup.
        File::open(car_path).with_context(|| format!("open archive {}", car_path.display()))?;

        tracing::info!(
            epoch,
            archive = %car_path.display(),
            sig_entries = sig_index.entry_count(),
            slot_entries = slot_index.entry_count(),
            "opened epoch store"
        );

        Ok(Self {
            car_path: car_path.to_path_buf(),
            sig_index,
            slot_index,
            chunk_size,
            tx_pool: Pool::new(),
            block_pool: Pool::new(),
            counters: LookupCounters::default(),
        })
    }

    pub fn counters(&self) -> &LookupCounters {
        &self.counters
    }

    /// Resolves a signature to its transaction. `Ok(None)` when the
    /// signature is not in this epoch.
    pub fn find_transaction(&self, sig: &Signature) -> Result<Option<TransactionResponse>> {
        let Some(value) = self.sig_index.lookup_signature(sig) else {
            self.counters.miss(IndexKind::SigToOffset.name());
            return Ok(None);
        };
        self.counters.hit(IndexKind::SigToOffset.name());

        let mut car = self.reader_at(value.offset())?;
        let section = car.next_section()?.with_context(|| {
            format!("archive truncated at indexed offset {}", value.offset())
        })?;
        if section.length != value.size() {
            bail!(
                "index inconsistency for {sig}: indexed size {} but section spans {}",
                value.size(),
                section.length
            );
        }

        let node = decode_transaction(&section.payload)
            .with_context(|| format!("transaction node at offset {}", value.offset()))?;
        if !node.data.is_complete() || !node.metadata.is_complete() {
            bail!(
                "transaction node at offset {} chains its payload across dataframes; \
                 refusing to serve a truncated response",
                value.offset()
            );
        }

        let mut resp = self.tx_pool.acquire();
        resp.slot = node.slot;
        resp.signature = sig.to_string();
        resp.data.extend_from_slice(node.data.data);
        resp.metadata.extend_from_slice(node.metadata.data);
        Ok(Some(resp))
    }

    /// Resolves a slot to its whole block record. `Ok(None)` when the
    /// slot is not in this epoch (skipped slots included).
    pub fn find_block(&self, slot: u64) -> Result<Option<BlockResponse>> {
        let Some(value) = self.slot_index.lookup_slot(slot) else {
            self.counters.miss(IndexKind::SlotToOffset.name());
            return Ok(None);
        };
        self.counters.hit(IndexKind::SlotToOffset.name());

        let mut car = self.reader_at(value.offset())?;
        let resp = RefCell::new(self.block_pool.acquire());
        let done = Cell::new(false);

        let mut acc = ObjectAccumulator::new(Kind::Block, 0, |head: &NodeMeta, nodes: &[NodeMeta]| {
            let block = decode_block(&head.payload)?;
            let mut resp = resp.borrow_mut();
            resp.slot = block.slot;
            resp.parent_slot = block.meta.parent_slot;
            resp.blocktime = block.meta.blocktime;
            resp.block_height = block.meta.block_height;
            for node in nodes {
                if node.kind != Kind::Transaction {
                    continue;
                }
                let tx = decode_transaction(&node.payload)?;
                if !tx.data.is_complete() || !tx.metadata.is_complete() {
                    return Err(CarReadError::InvalidData(format!(
                        "transaction node at offset {} chains its payload across dataframes",
                        node.offset
                    )));
                }
                let sig = first_signature(tx.data.data).ok_or_else(|| {
                    CarReadError::InvalidData(format!(
                        "transaction node at offset {} carries no signature",
                        node.offset
                    ))
                })?;
                let mut t = self.tx_pool.acquire();
                t.slot = tx.slot;
                t.signature = sig.to_string();
                t.data.extend_from_slice(tx.data.data);
                t.metadata.extend_from_slice(tx.metadata.data);
                resp.transactions.push(t);
            }
            done.set(true);
            Ok(())
        });

        while !done.get() {
            match car.next_section()? {
                Some(section) => acc.push(NodeMeta::from_section(section)?)?,
                None => break,
            }
        }
        drop(acc);

        if !done.get() {
            bail!("record at offset {} is not closed by a block node", value.offset());
        }
        let resp = resp.into_inner();
        if resp.slot != slot {
            bail!(
                "index inconsistency for slot {slot}: record at offset {} belongs to slot {}",
                value.offset(),
                resp.slot
            );
        }
        Ok(Some(resp))
    }

    /// Returns a transaction response to the pool for reuse.
    pub fn release_transaction(&self, resp: TransactionResponse) {
        self.tx_pool.release(resp);
    }

    /// Returns a block response to the pool, recycling its transaction
    /// responses first.
    pub fn release_block(&self, mut resp: BlockResponse) {
        for t in resp.transactions.drain(..) {
            self.tx_pool.release(t);
        }
        self.block_pool.release(resp);
    }

    fn reader_at(&self, offset: u64) -> Result<CarSectionReader<CachingReader<File>>> {
        let mut file = File::open(&self.car_path)
            .with_context(|| format!("open archive {}", self.car_path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(CarSectionReader::resume(
            CachingReader::from_reader(file, self.chunk_size),
            offset,
        ))
    }
}
