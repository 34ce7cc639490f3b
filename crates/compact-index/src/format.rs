//! On-disk layout: magic tags, header, fixed-width entry values.

use crate::error::{IndexError, Result};

/// First eight bytes of every index file in the current layout.
pub const MAGIC: [u8; 8] = *b"cmpidxv2";

/// Tag written by builds predating the format rename. The body layout
/// is identical; only the tag differs. See [`crate::migrate`].
pub const LEGACY_MAGIC: [u8; 8] = *b"cmpidxv1";

/// Format revision within the current magic.
pub const VERSION: u8 = 1;

pub(crate) const MAGIC_LEN: usize = 8;
pub(crate) const HEADER_BODY_LEN: usize = 20;
pub(crate) const ENTRIES_START: u64 = (MAGIC_LEN + 4 + HEADER_BODY_LEN) as u64;

/// Largest value a u24 field can hold.
pub const MAX_U24: u64 = (1 << 24) - 1;
/// Largest value a u48 field can hold.
pub const MAX_U48: u64 = (1 << 48) - 1;

/// What an index maps from. Determines the fixed key width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexKind {
    /// 64-byte transaction signature to archive offset.
    SigToOffset = 0,
    /// Big-endian slot number to archive offset. Big-endian so that
    /// numeric order matches byte order in the sorted entry table.
    SlotToOffset = 1,
}

impl IndexKind {
    /// Fixed key width in bytes.
    pub fn key_size(self) -> usize {
        match self {
            IndexKind::SigToOffset => 64,
            IndexKind::SlotToOffset => 8,
        }
    }

    /// Printable name, used in diagnostics and telemetry dimensions.
    pub fn name(self) -> &'static str {
        match self {
            IndexKind::SigToOffset => "sig-to-offset",
            IndexKind::SlotToOffset => "slot-to-offset",
        }
    }
}

impl TryFrom<u8> for IndexKind {
    type Error = IndexError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(IndexKind::SigToOffset),
            1 => Ok(IndexKind::SlotToOffset),
            other => Err(IndexError::MalformedArchive(format!(
                "unknown index kind id {other}"
            ))),
        }
    }
}

pub(crate) fn read_u64_le(b: &[u8]) -> u64 {
    let mut full = [0u8; 8];
    full.copy_from_slice(&b[..8]);
    u64::from_le_bytes(full)
}

pub(crate) fn u24_to_bytes(v: u64) -> [u8; 3] {
    let b = (v as u32).to_le_bytes();
    [b[0], b[1], b[2]]
}

pub(crate) fn u24_from_bytes(b: &[u8]) -> u64 {
    u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64
}

pub(crate) fn u48_to_bytes(v: u64) -> [u8; 6] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2], b[3], b[4], b[5]]
}

pub(crate) fn u48_from_bytes(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], 0, 0])
}

/// A byte position and section length inside one archive file.
///
/// Stored as little-endian u48 offset (max ~281 TB) plus u24 size
/// (max ~16.7 MB, covering any single section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetAndSize {
    /// Byte offset into the archive.
    pub offset: u64,
    /// Section length in bytes.
    pub size: u64,
}

impl OffsetAndSize {
    /// Encoded width in bytes.
    pub const SIZE: usize = 9;

    /// Pairs an offset with a section length.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// True when both fields fit their encoded widths.
    pub fn is_valid(&self) -> bool {
        self.offset <= MAX_U48 && self.size <= MAX_U24
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&u48_to_bytes(self.offset));
        out.extend_from_slice(&u24_to_bytes(self.size));
    }

    /// Parses a fixed-width value slice.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(IndexError::MalformedArchive(format!(
                "offset+size value must be {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }
        Ok(Self {
            offset: u48_from_bytes(&buf[..6]),
            size: u24_from_bytes(&buf[6..]),
        })
    }
}

/// [`OffsetAndSize`] plus the shard ordinal for split archives, where
/// one epoch spans several files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShardedOffsetAndSize {
    /// Ordinal of the archive file within the split set.
    pub shard: u16,
    /// Byte offset into that shard.
    pub offset: u64,
    /// Section length in bytes.
    pub size: u64,
}

impl ShardedOffsetAndSize {
    /// Encoded width in bytes.
    pub const SIZE: usize = 11;

    /// True when all fields fit their encoded widths.
    pub fn is_valid(&self) -> bool {
        self.offset <= MAX_U48 && self.size <= MAX_U24
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.shard.to_le_bytes());
        out.extend_from_slice(&u48_to_bytes(self.offset));
        out.extend_from_slice(&u24_to_bytes(self.size));
    }

    /// Parses a fixed-width value slice.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(IndexError::MalformedArchive(format!(
                "sharded offset+size value must be {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }
        Ok(Self {
            shard: u16::from_le_bytes([buf[0], buf[1]]),
            offset: u48_from_bytes(&buf[2..8]),
            size: u24_from_bytes(&buf[8..]),
        })
    }
}

/// A resolved index value, plain or sharded depending on how the
/// index was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexValue {
    /// Single-file archive value.
    Plain(OffsetAndSize),
    /// Split-archive value carrying the shard ordinal.
    Sharded(ShardedOffsetAndSize),
}

impl IndexValue {
    /// Byte offset into the (shard's) archive file.
    pub fn offset(&self) -> u64 {
        match self {
            IndexValue::Plain(v) => v.offset,
            IndexValue::Sharded(v) => v.offset,
        }
    }

    /// Section length in bytes.
    pub fn size(&self) -> u64 {
        match self {
            IndexValue::Plain(v) => v.size,
            IndexValue::Sharded(v) => v.size,
        }
    }

    /// Shard ordinal, `None` for single-file archives.
    pub fn shard(&self) -> Option<u16> {
        match self {
            IndexValue::Plain(_) => None,
            IndexValue::Sharded(v) => Some(v.shard),
        }
    }

    pub(crate) fn encoded_size(&self) -> usize {
        match self {
            IndexValue::Plain(_) => OffsetAndSize::SIZE,
            IndexValue::Sharded(_) => ShardedOffsetAndSize::SIZE,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self {
            IndexValue::Plain(v) => v.is_valid(),
            IndexValue::Sharded(v) => v.is_valid(),
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            IndexValue::Plain(v) => v.write_to(out),
            IndexValue::Sharded(v) => v.write_to(out),
        }
    }

    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Self> {
        match buf.len() {
            OffsetAndSize::SIZE => Ok(IndexValue::Plain(OffsetAndSize::from_bytes(buf)?)),
            ShardedOffsetAndSize::SIZE => {
                Ok(IndexValue::Sharded(ShardedOffsetAndSize::from_bytes(buf)?))
            }
            other => Err(IndexError::MalformedArchive(format!(
                "unexpected index value width {other}"
            ))),
        }
    }
}

/// Parsed index file header (the bytes between the magic and the
/// entry table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub kind: IndexKind,
    pub key_size: u8,
    pub value_size: u8,
    pub entry_count: u64,
    pub epoch: u64,
}

impl Header {
    /// Serializes magic + header length + header body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRIES_START as usize);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&(HEADER_BODY_LEN as u32).to_le_bytes());
        out.push(self.value_size);
        out.push(self.key_size);
        out.push(self.kind as u8);
        out.push(VERSION);
        out.extend_from_slice(&self.entry_count.to_le_bytes());
        out.extend_from_slice(&self.epoch.to_le_bytes());
        out
    }

    /// Parses the prefix of an index file. The magic is compared
    /// byte-for-byte before anything else is interpreted; unknown tags
    /// fail closed.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < MAGIC_LEN {
            return Err(IndexError::MalformedArchive(
                "index file shorter than its magic".to_string(),
            ));
        }
        let mut found = [0u8; 8];
        found.copy_from_slice(&buf[..MAGIC_LEN]);
        if found != MAGIC {
            return Err(IndexError::UnsupportedFormat { found });
        }
        if buf.len() < ENTRIES_START as usize {
            return Err(IndexError::MalformedArchive(
                "index file shorter than its header".to_string(),
            ));
        }
        let header_len = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        if header_len != HEADER_BODY_LEN {
            return Err(IndexError::MalformedArchive(format!(
                "unexpected header length {header_len}"
            )));
        }
        let body = &buf[MAGIC_LEN + 4..MAGIC_LEN + 4 + HEADER_BODY_LEN];
        let value_size = body[0];
        let key_size = body[1];
        let kind = IndexKind::try_from(body[2])?;
        let version = body[3];
        if version != VERSION {
            return Err(IndexError::MalformedArchive(format!(
                "unsupported index version: want {VERSION}, got {version}"
            )));
        }
        let entry_count = read_u64_le(&body[4..12]);
        let epoch = read_u64_le(&body[12..20]);
        if key_size as usize != kind.key_size() {
            return Err(IndexError::MalformedArchive(format!(
                "key size {key_size} does not match kind {}",
                kind.name()
            )));
        }
        if value_size as usize != OffsetAndSize::SIZE
            && value_size as usize != ShardedOffsetAndSize::SIZE
        {
            return Err(IndexError::MalformedArchive(format!(
                "unexpected value size {value_size}"
            )));
        }
        Ok(Self {
            kind,
            key_size,
            value_size,
            entry_count,
            epoch,
        })
    }

    pub fn stride(&self) -> usize {
        self.key_size as usize + self.value_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_helpers_roundtrip_at_bounds() {
        for v in [0, 1, MAX_U24] {
            assert_eq!(u24_from_bytes(&u24_to_bytes(v)), v);
        }
        for v in [0, 1, MAX_U48] {
            assert_eq!(u48_from_bytes(&u48_to_bytes(v)), v);
        }
    }

    #[test]
    fn offset_and_size_roundtrip() {
        let v = OffsetAndSize::new(123_456_789_012, 4096);
        assert!(v.is_valid());
        let mut buf = Vec::new();
        v.write_to(&mut buf);
        assert_eq!(buf.len(), OffsetAndSize::SIZE);
        assert_eq!(OffsetAndSize::from_bytes(&buf).unwrap(), v);

        assert!(!OffsetAndSize::new(MAX_U48 + 1, 0).is_valid());
        assert!(!OffsetAndSize::new(0, MAX_U24 + 1).is_valid());
    }

    #[test]
    fn sharded_value_roundtrip() {
        let v = ShardedOffsetAndSize {
            shard: 3,
            offset: 99,
            size: 1234,
        };
        let mut buf = Vec::new();
        v.write_to(&mut buf);
        match IndexValue::from_bytes(&buf).unwrap() {
            IndexValue::Sharded(got) => assert_eq!(got, v),
            other => panic!("expected sharded value, got {other:?}"),
        }
    }

    #[test]
    fn header_roundtrip() {
        let h = Header {
            kind: IndexKind::SlotToOffset,
            key_size: 8,
            value_size: OffsetAndSize::SIZE as u8,
            entry_count: 42,
            epoch: 612,
        };
        let bytes = h.to_bytes();
        assert_eq!(bytes.len() as u64, ENTRIES_START);
        assert_eq!(Header::parse(&bytes).unwrap(), h);
    }

    #[test]
    fn foreign_magic_fails_closed() {
        let h = Header {
            kind: IndexKind::SigToOffset,
            key_size: 64,
            value_size: OffsetAndSize::SIZE as u8,
            entry_count: 1,
            epoch: 0,
        };
        let mut bytes = h.to_bytes();
        bytes[..8].copy_from_slice(b"whatever");
        match Header::parse(&bytes) {
            Err(IndexError::UnsupportedFormat { found }) => {
                assert_eq!(&found, b"whatever");
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[test]
    fn legacy_magic_is_not_silently_read() {
        let h = Header {
            kind: IndexKind::SigToOffset,
            key_size: 64,
            value_size: OffsetAndSize::SIZE as u8,
            entry_count: 1,
            epoch: 0,
        };
        let mut bytes = h.to_bytes();
        bytes[..8].copy_from_slice(&LEGACY_MAGIC);
        assert!(matches!(
            Header::parse(&bytes),
            Err(IndexError::UnsupportedFormat { .. })
        ));
    }
}
