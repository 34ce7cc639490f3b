use std::fs::File;
use std::io::{BufRead, Read};
use std::path::Path;

use bytes::Bytes;
use cid::Cid;

use crate::caching::CachingReader;
use crate::cid::cid_bytes_len;
use crate::error::{CarReadError, CarReadResult};

const MAX_UVARINT_LEN_64: usize = 10;

/// One length-prefixed section of a CAR archive: the CID plus the node
/// payload, with its global position in the stream.
#[derive(Debug, Clone)]
pub struct Section {
    pub cid: Cid,
    /// Byte offset of the section start (the length prefix).
    pub offset: u64,
    /// Full section length: varint prefix + CID + payload.
    pub length: u64,
    pub payload: Bytes,
}

/// Streams sections out of a CAR archive.
///
/// Offsets are tracked from the start of the stream, so entries read
/// here can be fed straight into an offset index and later fetched
/// back with [`CarSectionReader::resume`].
pub struct CarSectionReader<R> {
    reader: R,
    offset: u64,
}

impl CarSectionReader<CachingReader<File>> {
    /// Opens a plain CAR file and skips its header.
    pub fn open(path: &Path, chunk_size: usize) -> CarReadResult<Self> {
        let reader = CachingReader::open(path, chunk_size)
            .map_err(|e| CarReadError::Io(format!("open {}: {e}", path.display())))?;
        let mut car = Self {
            reader,
            offset: 0,
        };
        car.skip_header()?;
        tracing::debug!(path = %path.display(), "opened car archive");
        Ok(car)
    }
}

impl CarSectionReader<CachingReader<zstd::Decoder<'static, std::io::BufReader<File>>>> {
    /// Opens a zstd-compressed CAR file. Offsets refer to positions in
    /// the decompressed stream.
    pub fn open_zstd(path: &Path, chunk_size: usize) -> CarReadResult<Self> {
        let file = File::open(path)
            .map_err(|e| CarReadError::Io(format!("open {}: {e}", path.display())))?;
        let zstd = zstd::Decoder::new(file)
            .map_err(|e| CarReadError::InvalidData(format!("zstd decoder init failed: {e}")))?;
        let mut car = Self {
            reader: CachingReader::from_reader(zstd, chunk_size),
            offset: 0,
        };
        car.skip_header()?;
        tracing::debug!(path = %path.display(), "opened zstd car archive");
        Ok(car)
    }
}

impl<R: BufRead> CarSectionReader<R> {
    /// Wraps a reader already positioned at `offset` inside an archive
    /// whose header has been consumed. Used on the serving path to
    /// start reading at an indexed offset.
    pub fn resume(reader: R, offset: u64) -> Self {
        Self { reader, offset }
    }

    /// Global offset of the next section to be read.
    pub fn position(&self) -> u64 {
        self.offset
    }

    fn skip_header(&mut self) -> CarReadResult<()> {
        let (header_len, varint_len) = read_uvarint64(&mut self.reader)?;
        let mut tmp = vec![0u8; header_len as usize];
        self.reader
            .read_exact(&mut tmp)
            .map_err(|e| CarReadError::UnexpectedEof(format!("car header: {e}")))?;
        self.offset += varint_len as u64 + header_len;
        Ok(())
    }

    /// Reads the next section. `Ok(None)` on clean end of stream.
    pub fn next_section(&mut self) -> CarReadResult<Option<Section>> {
        let section_offset = self.offset;
        let (entry_len, varint_len) = match read_uvarint64(&mut self.reader) {
            Ok(v) => v,
            Err(CarReadError::Eof) => return Ok(None),
            Err(e) => return Err(e),
        };
        let entry_len = entry_len as usize;

        if entry_len == 0 {
            return Err(CarReadError::InvalidData("section length 0".to_string()));
        }

        let mut entry = vec![0u8; entry_len];
        self.reader
            .read_exact(&mut entry)
            .map_err(|e| CarReadError::UnexpectedEof(format!("section body: {e}")))?;

        let cid_len = cid_bytes_len(&entry)?;
        if cid_len >= entry_len {
            return Err(CarReadError::InvalidData(format!(
                "section holds no payload past its cid ({entry_len})"
            )));
        }
        let cid = Cid::try_from(&entry[..cid_len])
            .map_err(|e| CarReadError::Cid(e.to_string()))?;

        let length = (varint_len + entry_len) as u64;
        self.offset += length;

        let entry = Bytes::from(entry);
        Ok(Some(Section {
            cid,
            offset: section_offset,
            length,
            payload: entry.slice(cid_len..),
        }))
    }
}

/// Reads a uvarint64, returning (value, bytes consumed).
fn read_uvarint64<R: BufRead>(r: &mut R) -> CarReadResult<(u64, usize)> {
    let mut x: u64 = 0;
    let mut shift: u32 = 0;
    let mut i: usize = 0;

    loop {
        if i >= MAX_UVARINT_LEN_64 {
            return Err(CarReadError::VarintOverflow("uvarint overflow".to_string()));
        }

        let buf = r.fill_buf().map_err(|e| CarReadError::Io(e.to_string()))?;
        if buf.is_empty() {
            if i != 0 {
                return Err(CarReadError::UnexpectedEof(
                    "EOF while reading uvarint".to_string(),
                ));
            }
            return Err(CarReadError::Eof);
        }

        let mut consumed = 0usize;

        for &byte in buf {
            consumed += 1;
            i += 1;

            if byte < 0x80 {
                if i == MAX_UVARINT_LEN_64 && byte > 1 {
                    return Err(CarReadError::VarintOverflow("uvarint overflow".to_string()));
                }
                x |= (byte as u64) << shift;
                r.consume(consumed);
                return Ok((x, i));
            }

            x |= ((byte & 0x7f) as u64) << shift;
            shift += 7;

            if shift > 63 {
                r.consume(consumed);
                return Err(CarReadError::VarintOverflow("uvarint too long".to_string()));
            }

            if i >= MAX_UVARINT_LEN_64 {
                r.consume(consumed);
                return Err(CarReadError::VarintOverflow("uvarint overflow".to_string()));
            }
        }

        r.consume(consumed);
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    /// Appends a uvarint encoding of `v`.
    pub fn push_uvarint(out: &mut Vec<u8>, mut v: u64) {
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(b);
                return;
            }
            out.push(b | 0x80);
        }
    }

    /// A CIDv1 (dag-cbor, sha2-256) with a fixed digest byte.
    pub fn fake_cid(digest: u8) -> Vec<u8> {
        let mut cid = vec![0x01, 0x71, 0x12, 0x20];
        cid.extend_from_slice(&[digest; 32]);
        cid
    }

    /// Appends one CAR section, returning its (offset, length).
    pub fn push_section(out: &mut Vec<u8>, digest: u8, payload: &[u8]) -> (u64, u64) {
        let offset = out.len() as u64;
        let cid = fake_cid(digest);
        let entry_len = cid.len() + payload.len();
        push_uvarint(out, entry_len as u64);
        out.extend_from_slice(&cid);
        out.extend_from_slice(payload);
        (offset, out.len() as u64 - offset)
    }

    /// A minimal CAR stream: header, then the given sections.
    pub fn make_car(sections: &[(u8, &[u8])]) -> (Vec<u8>, Vec<(u64, u64)>) {
        let mut out = Vec::new();
        let header = b"car-test-header";
        push_uvarint(&mut out, header.len() as u64);
        out.extend_from_slice(header);
        let spans = sections
            .iter()
            .map(|(digest, payload)| push_section(&mut out, *digest, payload))
            .collect();
        (out, spans)
    }
}
