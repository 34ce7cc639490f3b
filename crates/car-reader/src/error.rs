use std::{error::Error as StdError, fmt, io};

#[derive(Debug, Clone)]
pub enum CarReadError {
    /// Clean end of stream at a section boundary.
    Eof,
    Io(String),
    UnexpectedEof(String),
    InvalidData(String),
    VarintOverflow(String),
    Cid(String),
    Cbor(String),
    UnknownKind(u64),
}

pub type CarReadResult<T> = std::result::Result<T, CarReadError>;

impl fmt::Display for CarReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarReadError::Eof => write!(f, "end of stream"),
            CarReadError::Io(s) => write!(f, "io error: {s}"),
            CarReadError::UnexpectedEof(s) => write!(f, "unexpected eof: {s}"),
            CarReadError::InvalidData(s) => write!(f, "invalid data: {s}"),
            CarReadError::VarintOverflow(s) => write!(f, "varint overflow: {s}"),
            CarReadError::Cid(s) => write!(f, "cid error: {s}"),
            CarReadError::Cbor(s) => write!(f, "cbor decode error: {s}"),
            CarReadError::UnknownKind(k) => write!(f, "unknown node kind id {k}"),
        }
    }
}

impl StdError for CarReadError {}

impl From<io::Error> for CarReadError {
    fn from(e: io::Error) -> Self {
        CarReadError::Io(e.to_string())
    }
}

impl From<minicbor::decode::Error> for CarReadError {
    fn from(e: minicbor::decode::Error) -> Self {
        CarReadError::Cbor(e.to_string())
    }
}
