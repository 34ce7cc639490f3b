use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::Path;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;

/// Default read-ahead chunk size. Archives are read as "small length
/// prefix, then object body", so a large chunk turns thousands of tiny
/// reads into one underlying read.
pub const DEFAULT_CHUNK_SIZE: usize = 12 * MIB;

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions and is thread-safe.
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ps > 0 {
        ps as usize
    } else {
        4096
    }
}

fn align_to_page_size(value: usize) -> usize {
    let ps = page_size();
    (value + ps - 1) & !(ps - 1)
}

/// Buffers a sequential byte source in large, page-aligned chunks.
///
/// Each refill issues exactly one underlying read of up to the chunk
/// size; callers are then served out of the buffer until it drains.
/// `close` is a no-op after the first call, and dropping the reader
/// releases the source as well.
pub struct CachingReader<R> {
    source: Option<R>,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
}

impl CachingReader<File> {
    /// Opens `path` with a read-ahead buffer of `chunk_size` bytes
    /// (rounded up to a page multiple; `0` selects the default).
    pub fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file, chunk_size))
    }
}

impl<R: Read> CachingReader<R> {
    pub fn from_reader(source: R, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let chunk_size = align_to_page_size(chunk_size);
        Self {
            source: Some(source),
            buf: vec![0u8; chunk_size].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    /// Releases the underlying source. Safe to call more than once;
    /// every call after the first is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        self.source.take();
        Ok(())
    }

    /// One underlying read of up to the chunk size. Returns false on
    /// end of data. `Interrupted` reads are retried so a short refill
    /// always makes forward progress.
    fn refill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let source = match self.source.as_mut() {
            Some(s) => s,
            None => return Err(io::Error::other("caching reader is closed")),
        };
        self.start = 0;
        self.end = 0;
        loop {
            match source.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.end = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Read for CachingReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.start == self.end && !self.refill()? {
            return Ok(0);
        }
        let n = out.len().min(self.end - self.start);
        out[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.start += n;
        Ok(n)
    }
}

impl<R: Read> BufRead for CachingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.start == self.end {
            self.refill()?;
        }
        Ok(&self.buf[self.start..self.end])
    }

    fn consume(&mut self, amt: usize) {
        self.start = (self.start + amt).min(self.end);
    }
}
