use bytes::Bytes;
use cid::Cid;

use crate::error::{CarReadError, CarReadResult};
use crate::node::{peek_kind, Kind};
use crate::reader::Section;

/// A decoded node together with its position in the archive.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub cid: Cid,
    pub offset: u64,
    pub length: u64,
    pub kind: Kind,
    pub payload: Bytes,
}

impl NodeMeta {
    /// Builds a `NodeMeta` from a raw section by peeking the kind tag.
    pub fn from_section(section: Section) -> CarReadResult<Self> {
        let kind = peek_kind(&section.payload)?;
        Ok(Self {
            cid: section.cid,
            offset: section.offset,
            length: section.length,
            kind,
            payload: section.payload,
        })
    }
}

/// Default cap on pending nodes before the archive is considered
/// malformed (a boundary node never showed up).
pub const DEFAULT_MAX_PENDING: usize = 1 << 20;

/// Groups a stream of nodes into logical records.
///
/// Nodes are pushed in archive order. When a node of the configured
/// boundary kind arrives, the callback fires with the boundary node as
/// head plus everything accumulated since the previous flush (head
/// included, in order, head last). The pending buffer is reused across
/// records, so the callback must copy whatever it keeps.
pub struct ObjectAccumulator<F> {
    flush_kind: Kind,
    max_pending: usize,
    pending: Vec<NodeMeta>,
    callback: F,
}

impl<F> ObjectAccumulator<F>
where
    F: FnMut(&NodeMeta, &[NodeMeta]) -> CarReadResult<()>,
{
    /// `max_pending == 0` selects [`DEFAULT_MAX_PENDING`].
    pub fn new(flush_kind: Kind, max_pending: usize, callback: F) -> Self {
        let max_pending = if max_pending == 0 {
            DEFAULT_MAX_PENDING
        } else {
            max_pending
        };
        Self {
            flush_kind,
            max_pending,
            pending: Vec::new(),
            callback,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Accepts the next node in archive order, flushing if it is a
    /// boundary node. Errors returned by the callback propagate.
    pub fn push(&mut self, node: NodeMeta) -> CarReadResult<()> {
        if self.pending.len() >= self.max_pending {
            return Err(CarReadError::InvalidData(format!(
                "no {} boundary within {} nodes; archive is malformed",
                self.flush_kind.name(),
                self.max_pending,
            )));
        }
        let is_boundary = node.kind == self.flush_kind;
        self.pending.push(node);
        if is_boundary {
            if let Some((head, _)) = self.pending.split_last() {
                (self.callback)(head, &self.pending)?;
            }
            self.pending.clear();
        }
        Ok(())
    }

    /// Consumes the accumulator, returning nodes that never saw a
    /// boundary. Non-empty leftovers usually mean the archive has
    /// trailing non-record nodes (epoch/subset tails) or was cut short.
    pub fn finish(self) -> Vec<NodeMeta> {
        self.pending
    }
}
