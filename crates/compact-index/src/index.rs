//! Serving-path point lookups over a sealed index file.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use solana_signature::Signature;

use crate::error::{IndexError, Result};
use crate::format::{Header, IndexKind, IndexValue, ENTRIES_START};

/// An opened, immutable index file.
///
/// The file is mapped into memory once at open; lookups are pure
/// binary searches over the fixed-width entry table and allocate
/// nothing. A key that is absent is a normal outcome (`None`), kept
/// distinct from every failure mode.
#[derive(Debug)]
pub struct CompactIndex {
    mmap: Mmap,
    header: Header,
}

impl CompactIndex {
    /// Opens and validates an index file. The 8-byte format tag is
    /// checked before anything else; an unrecognized tag fails closed
    /// with [`IndexError::UnsupportedFormat`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: index files are immutable once sealed; nothing
        // rewrites them while mapped (the magic migration tool is an
        // offline operation on unopened files).
        let mmap = unsafe { Mmap::map(&file)? };
        let header = Header::parse(&mmap)?;

        let expected_len = header
            .entry_count
            .checked_mul(header.stride() as u64)
            .and_then(|table| table.checked_add(ENTRIES_START))
            .ok_or_else(|| {
                IndexError::MalformedArchive(format!(
                    "entry count {} overflows the file length",
                    header.entry_count
                ))
            })?;
        if mmap.len() as u64 != expected_len {
            return Err(IndexError::MalformedArchive(format!(
                "index file is {} bytes, header implies {}",
                mmap.len(),
                expected_len
            )));
        }
        Ok(Self { mmap, header })
    }

    /// What this index maps from.
    pub fn kind(&self) -> IndexKind {
        self.header.kind
    }

    /// Number of entries in the table.
    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    /// Epoch the indexed archive belongs to.
    pub fn epoch(&self) -> u64 {
        self.header.epoch
    }

    /// True when values carry a shard ordinal (split archive).
    pub fn is_sharded(&self) -> bool {
        self.header.value_size as usize == crate::format::ShardedOffsetAndSize::SIZE
    }

    fn entries(&self) -> &[u8] {
        &self.mmap[ENTRIES_START as usize..]
    }

    /// Raw fixed-width entry at `idx` (key then value). Used by the
    /// verifier for exhaustive walks.
    pub fn entry_at(&self, idx: u64) -> Result<(&[u8], &[u8])> {
        if idx >= self.header.entry_count {
            return Err(IndexError::MalformedArchive(format!(
                "entry index {idx} out of range ({})",
                self.header.entry_count
            )));
        }
        let stride = self.header.stride();
        let start = idx as usize * stride;
        let entry = &self.entries()[start..start + stride];
        Ok(entry.split_at(self.header.key_size as usize))
    }

    /// Binary search for a raw key. Returns the value bytes, or `None`
    /// when the key is not indexed.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        if key.len() != self.header.key_size as usize {
            return None;
        }
        let stride = self.header.stride();
        let key_size = self.header.key_size as usize;
        let entries = self.entries();

        let mut lo = 0usize;
        let mut hi = self.header.entry_count as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = &entries[mid * stride..(mid + 1) * stride];
            match entry[..key_size].cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(&entry[key_size..]),
            }
        }
        None
    }

    fn decode_value(&self, raw: &[u8]) -> Option<IndexValue> {
        // Widths were validated at open; decode cannot fail here.
        IndexValue::from_bytes(raw).ok()
    }

    /// Resolves a transaction signature, for `SigToOffset` indexes.
    pub fn lookup_signature(&self, sig: &Signature) -> Option<IndexValue> {
        self.get(sig.as_ref()).and_then(|raw| self.decode_value(raw))
    }

    /// Resolves a slot number, for `SlotToOffset` indexes.
    pub fn lookup_slot(&self, slot: u64) -> Option<IndexValue> {
        self.get(&slot.to_be_bytes())
            .and_then(|raw| self.decode_value(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::format::{OffsetAndSize, LEGACY_MAGIC, MAGIC};
    use std::io::Write;

    fn plain(offset: u64, size: u64) -> IndexValue {
        IndexValue::Plain(OffsetAndSize::new(offset, size))
    }

    fn sig(fill: u8) -> Signature {
        Signature::from([fill; 64])
    }

    #[test]
    fn absurd_entry_count_is_rejected_not_overflowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.index");

        // Valid magic and header shape, but an entry count whose table
        // length cannot exist. Open must fail cleanly, not wrap.
        let header = Header {
            kind: IndexKind::SlotToOffset,
            key_size: 8,
            value_size: 9,
            entry_count: u64::MAX,
            epoch: 0,
        };
        std::fs::write(&path, header.to_bytes()).unwrap();

        let err = CompactIndex::open(&path).unwrap_err();
        assert!(matches!(err, IndexError::MalformedArchive(_)), "{err}");
        assert!(err.to_string().contains("overflow"), "{err}");
    }

    #[test]
    fn build_then_lookup_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sigs.index");

        let mut b = IndexBuilder::new(IndexKind::SigToOffset, 0);
        b.insert_signature(&sig(1), plain(100, 64)).unwrap();
        b.insert_signature(&sig(2), plain(250, 64)).unwrap();
        b.insert_signature(&sig(3), plain(400, 64)).unwrap();
        b.seal(&path).unwrap();

        let index = CompactIndex::open(&path).unwrap();
        assert_eq!(index.kind(), IndexKind::SigToOffset);
        assert_eq!(index.lookup_signature(&sig(2)).unwrap().offset(), 250);
        assert_eq!(index.lookup_signature(&sig(1)).unwrap().offset(), 100);
        assert_eq!(index.lookup_signature(&sig(3)).unwrap().offset(), 400);
    }

    #[test]
    fn absent_keys_are_none_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots.index");

        let mut b = IndexBuilder::new(IndexKind::SlotToOffset, 0);
        for slot in [10u64, 20, 30] {
            b.insert_slot(slot, plain(slot, 1)).unwrap();
        }
        b.seal(&path).unwrap();

        let index = CompactIndex::open(&path).unwrap();
        // Between, below, and above existing keys.
        assert!(index.lookup_slot(15).is_none());
        assert!(index.lookup_slot(5).is_none());
        assert!(index.lookup_slot(35).is_none());
        // Wrong key width through the raw interface.
        assert!(index.get(&[0u8; 64]).is_none());
    }

    #[test]
    fn slot_order_is_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.index");

        // 256 sorts after 255 only with big-endian keys.
        let mut b = IndexBuilder::new(IndexKind::SlotToOffset, 0);
        for slot in [256u64, 1, 255] {
            b.insert_slot(slot, plain(slot, 1)).unwrap();
        }
        b.seal(&path).unwrap();

        let index = CompactIndex::open(&path).unwrap();
        for slot in [1u64, 255, 256] {
            assert_eq!(index.lookup_slot(slot).unwrap().offset(), slot);
        }
    }

    #[test]
    fn unknown_magic_refuses_to_parse_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alien.index");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"ALIENFMT").unwrap();
        // Bytes that would misparse as entries if the tag were ignored.
        f.write_all(&[0x41u8; 256]).unwrap();
        drop(f);

        match CompactIndex::open(&path) {
            Err(IndexError::UnsupportedFormat { found }) => {
                assert_eq!(&found, b"ALIENFMT");
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn legacy_magic_is_rejected_until_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.index");

        let mut b = IndexBuilder::new(IndexKind::SlotToOffset, 0);
        b.insert_slot(1, plain(1, 1)).unwrap();
        b.seal(&path).unwrap();

        // Stamp the legacy tag over the current one.
        let mut bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], &MAGIC);
        bytes[..8].copy_from_slice(&LEGACY_MAGIC);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            CompactIndex::open(&path),
            Err(IndexError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn truncated_entry_table_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.index");

        let mut b = IndexBuilder::new(IndexKind::SlotToOffset, 0);
        b.insert_slot(1, plain(1, 1)).unwrap();
        b.insert_slot(2, plain(2, 1)).unwrap();
        b.seal(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(matches!(
            CompactIndex::open(&path),
            Err(IndexError::MalformedArchive(_))
        ));
    }
}
