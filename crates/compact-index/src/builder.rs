//! Index build path: entry collection and atomic sealing.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use solana_signature::Signature;

use crate::error::{hex, IndexError, Result};
use crate::format::{Header, IndexKind, IndexValue, OffsetAndSize, ShardedOffsetAndSize};

/// Collects `(key, offset)` entries for one archive and seals them
/// into an immutable index file.
///
/// Entries are buffered in memory, sorted by key at seal time, and
/// written to `<path>.tmp` before an atomic rename. A crash mid-build
/// never leaves a partial index visible to readers.
pub struct IndexBuilder {
    kind: IndexKind,
    epoch: u64,
    sharded: bool,
    entries: Vec<(Box<[u8]>, IndexValue)>,
}

impl IndexBuilder {
    pub fn new(kind: IndexKind, epoch: u64) -> Self {
        Self::with_sharding(kind, epoch, false)
    }

    /// A builder for split archives; values carry a shard ordinal.
    pub fn with_sharding(kind: IndexKind, epoch: u64, sharded: bool) -> Self {
        Self {
            kind,
            epoch,
            sharded,
            entries: Vec::new(),
        }
    }

    /// The kind this builder produces.
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Number of entries inserted so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries have been inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn value_size(&self) -> usize {
        if self.sharded {
            ShardedOffsetAndSize::SIZE
        } else {
            OffsetAndSize::SIZE
        }
    }

    /// Appends a raw entry. The key must match the kind's fixed width
    /// and the value must fit its encoded field widths.
    pub fn insert(&mut self, key: &[u8], value: IndexValue) -> Result<()> {
        if key.len() != self.kind.key_size() {
            return Err(IndexError::MalformedArchive(format!(
                "{} key must be {} bytes, got {}",
                self.kind.name(),
                self.kind.key_size(),
                key.len()
            )));
        }
        if value.encoded_size() != self.value_size() {
            return Err(IndexError::MalformedArchive(format!(
                "{} builder expects {}-byte values, got {}",
                self.kind.name(),
                self.value_size(),
                value.encoded_size()
            )));
        }
        if !value.is_valid() {
            return Err(IndexError::MalformedArchive(format!(
                "offset {} or size {} out of encodable range",
                value.offset(),
                value.size()
            )));
        }
        self.entries.push((key.into(), value));
        Ok(())
    }

    /// Appends a signature key.
    pub fn insert_signature(&mut self, sig: &Signature, value: IndexValue) -> Result<()> {
        self.insert(sig.as_ref(), value)
    }

    /// Appends a slot key (stored big-endian so numeric order matches
    /// byte order).
    pub fn insert_slot(&mut self, slot: u64, value: IndexValue) -> Result<()> {
        self.insert(&slot.to_be_bytes(), value)
    }

    /// Sorts, checks for duplicate keys, and writes the final file.
    /// Returns the number of entries written.
    pub fn seal(mut self, path: &Path) -> Result<u64> {
        let started = Instant::now();
        self.entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for pair in self.entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(IndexError::MalformedArchive(format!(
                    "duplicate {} key {}",
                    self.kind.name(),
                    hex(&pair[0].0)
                )));
            }
        }

        let header = Header {
            kind: self.kind,
            key_size: self.kind.key_size() as u8,
            value_size: self.value_size() as u8,
            entry_count: self.entries.len() as u64,
            epoch: self.epoch,
        };

        let tmp_path = {
            let mut os = path.as_os_str().to_os_string();
            os.push(".tmp");
            std::path::PathBuf::from(os)
        };
        {
            let file = File::create(&tmp_path)?;
            let mut out = BufWriter::new(file);
            out.write_all(&header.to_bytes())?;
            let mut entry_buf = Vec::with_capacity(header.stride());
            for (key, value) in &self.entries {
                entry_buf.clear();
                entry_buf.extend_from_slice(key);
                value.write_to(&mut entry_buf);
                out.write_all(&entry_buf)?;
            }
            out.flush()?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        tracing::info!(
            kind = self.kind.name(),
            epoch = self.epoch,
            entries = self.entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            path = %path.display(),
            "sealed index"
        );
        Ok(self.entries.len() as u64)
    }
}
