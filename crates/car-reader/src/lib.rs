//! Sequential reading of content-addressed epoch archives (CAR files).
//!
//! Provides the chunked read-ahead reader the archive access pattern
//! wants (tiny length prefix, then object body), section streaming
//! with stable global offsets, node kind tagging, and the accumulator
//! that regroups a node stream into logical records.

pub mod accum;
pub mod caching;
mod cid;
pub mod error;
pub mod node;
pub mod reader;

pub use accum::{NodeMeta, ObjectAccumulator};
pub use caching::CachingReader;
pub use self::cid::cid_bytes_len;
pub use error::{CarReadError, CarReadResult};
pub use node::Kind;
pub use reader::{CarSectionReader, Section};
