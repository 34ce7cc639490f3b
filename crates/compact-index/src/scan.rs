//! Sequential archive passes: index build and exhaustive verify.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Instant;

use car_reader::node::{decode_block, decode_transaction, first_signature};
use car_reader::{CarSectionReader, Kind, NodeMeta, ObjectAccumulator};
use solana_signature::Signature;

use crate::builder::IndexBuilder;
use crate::error::{IndexError, Result};
use crate::format::{IndexKind, IndexValue, OffsetAndSize};
use crate::index::CompactIndex;

/// Keys derived from one block record during a sequential pass.
#[derive(Debug)]
pub struct RecordSummary {
    /// Slot of the block node closing the record.
    pub slot: u64,
    /// Offset of the record's first node plus the block node's own
    /// section length. Serving reads forward from this offset until
    /// the accumulator flushes on the block node again.
    pub record: OffsetAndSize,
    /// Signature and section span of every transaction node in the
    /// record, in archive order.
    pub transactions: Vec<(Signature, OffsetAndSize)>,
}

fn summarize(head: &NodeMeta, nodes: &[NodeMeta]) -> Result<RecordSummary> {
    let block = decode_block(&head.payload)?;
    let first_offset = nodes.first().map(|n| n.offset).unwrap_or(head.offset);

    let mut transactions = Vec::new();
    for n in nodes {
        if n.kind != Kind::Transaction {
            continue;
        }
        let tx = decode_transaction(&n.payload)?;
        let sig = first_signature(tx.data.data).ok_or_else(|| {
            IndexError::MalformedArchive(format!(
                "transaction node at offset {} carries no signature",
                n.offset
            ))
        })?;
        transactions.push((sig, OffsetAndSize::new(n.offset, n.length)));
    }

    Ok(RecordSummary {
        slot: block.slot,
        record: OffsetAndSize::new(first_offset, head.length),
        transactions,
    })
}

/// Single forward pass over an archive, invoking `on_record` for every
/// block record. Returns the number of records seen.
pub fn scan_records<F>(car_path: &Path, chunk_size: usize, mut on_record: F) -> Result<u64>
where
    F: FnMut(RecordSummary) -> Result<()>,
{
    let mut car = CarSectionReader::open(car_path, chunk_size)?;

    // The accumulator callback speaks CarReadError; index errors are
    // parked here and re-raised once the pass stops.
    let parked: RefCell<Option<IndexError>> = RefCell::new(None);
    let mut records = 0u64;

    let mut acc = ObjectAccumulator::new(Kind::Block, 0, |head, nodes| {
        let outcome = summarize(head, nodes).and_then(|rec| on_record(rec));
        match outcome {
            Ok(()) => {
                records += 1;
                Ok(())
            }
            Err(e) => {
                *parked.borrow_mut() = Some(e);
                Err(car_reader::CarReadError::InvalidData(
                    "record scan aborted".to_string(),
                ))
            }
        }
    });

    loop {
        let section = match car.next_section() {
            Ok(Some(s)) => s,
            Ok(None) => break,
            Err(e) => return Err(take_parked(&parked).unwrap_or_else(|| e.into())),
        };
        let node = NodeMeta::from_section(section)?;
        if let Err(e) = acc.push(node) {
            return Err(take_parked(&parked).unwrap_or_else(|| e.into()));
        }
    }

    let leftover = acc.finish();
    if !leftover.is_empty() {
        // Epoch/subset tail nodes after the last block are expected.
        tracing::debug!(count = leftover.len(), "non-record nodes after last block");
    }

    Ok(records)
}

fn take_parked(parked: &RefCell<Option<IndexError>>) -> Option<IndexError> {
    parked.borrow_mut().take()
}

/// Canonical file name for one epoch's index of the given kind.
pub fn index_filename(epoch: u64, kind: IndexKind) -> String {
    format!("epoch-{epoch}-{}.index", kind.name())
}

/// Paths and entry counts produced by [`build_archive_indexes`].
#[derive(Debug)]
pub struct BuiltIndexes {
    /// Final path of the signature index.
    pub sig_path: PathBuf,
    /// Final path of the slot index.
    pub slot_path: PathBuf,
    /// Entries written to the signature index.
    pub sig_entries: u64,
    /// Entries written to the slot index.
    pub slot_entries: u64,
}

/// Builds the signature and slot indexes for a completed archive in
/// one sequential pass. Both index files appear atomically; a failed
/// build leaves nothing visible at the final paths.
pub fn build_archive_indexes(
    car_path: &Path,
    out_dir: &Path,
    epoch: u64,
    chunk_size: usize,
) -> Result<BuiltIndexes> {
    let started = Instant::now();
    let mut sig_builder = IndexBuilder::new(IndexKind::SigToOffset, epoch);
    let mut slot_builder = IndexBuilder::new(IndexKind::SlotToOffset, epoch);

    let records = scan_records(car_path, chunk_size, |rec| {
        slot_builder.insert_slot(rec.slot, IndexValue::Plain(rec.record))?;
        for (sig, span) in &rec.transactions {
            sig_builder.insert_signature(sig, IndexValue::Plain(*span))?;
        }
        Ok(())
    })?;

    let sig_path = out_dir.join(index_filename(epoch, IndexKind::SigToOffset));
    let slot_path = out_dir.join(index_filename(epoch, IndexKind::SlotToOffset));
    let sig_entries = sig_builder.seal(&sig_path)?;
    let slot_entries = slot_builder.seal(&slot_path)?;

    tracing::info!(
        epoch,
        records,
        sig_entries,
        slot_entries,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built archive indexes"
    );

    Ok(BuiltIndexes {
        sig_path,
        slot_path,
        sig_entries,
        slot_entries,
    })
}

/// Outcome of a successful verification run.
#[derive(Debug)]
pub struct VerifyReport {
    /// Kind of the verified index.
    pub kind: IndexKind,
    /// Number of keys re-derived from the archive and matched.
    pub checked: u64,
}

fn expect_entry(
    index: &CompactIndex,
    key_printable: String,
    key: &[u8],
    expected: OffsetAndSize,
) -> Result<()> {
    let kind = index.kind().name();
    let raw = index.get(key).ok_or_else(|| IndexError::Inconsistent {
        kind,
        key: key_printable.clone(),
        expected: format!("offset {} size {}", expected.offset, expected.size),
        found: "absent".to_string(),
    })?;
    let value = IndexValue::from_bytes(raw)?;
    if value.offset() != expected.offset || value.size() != expected.size {
        return Err(IndexError::Inconsistent {
            kind,
            key: key_printable,
            expected: format!("offset {} size {}", expected.offset, expected.size),
            found: format!("offset {} size {}", value.offset(), value.size()),
        });
    }
    Ok(())
}

/// Exhaustively checks an index against its archive: every key the
/// archive yields must resolve to the derived value, and every index
/// entry must be accounted for by the pass. Read-only; intended as a
/// batch job, not a serving-path operation.
pub fn verify_archive_index(
    car_path: &Path,
    index_path: &Path,
    chunk_size: usize,
) -> Result<VerifyReport> {
    let started = Instant::now();
    let index = CompactIndex::open(index_path)?;
    let kind = index.kind();
    let mut checked = 0u64;

    scan_records(car_path, chunk_size, |rec| {
        match kind {
            IndexKind::SlotToOffset => {
                expect_entry(&index, rec.slot.to_string(), &rec.slot.to_be_bytes(), rec.record)?;
                checked += 1;
            }
            IndexKind::SigToOffset => {
                for (sig, span) in &rec.transactions {
                    expect_entry(&index, sig.to_string(), sig.as_ref(), *span)?;
                    checked += 1;
                }
            }
        }
        Ok(())
    })?;

    if checked != index.entry_count() {
        return Err(IndexError::Inconsistent {
            kind: kind.name(),
            key: "(entry count)".to_string(),
            expected: checked.to_string(),
            found: index.entry_count().to_string(),
        });
    }

    tracing::info!(
        kind = kind.name(),
        checked,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "verified index against archive"
    );

    Ok(VerifyReport { kind, checked })
}
