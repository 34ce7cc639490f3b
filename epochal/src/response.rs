use serde::Serialize;

use crate::pool::Reset;

/// A transaction resolved through the signature index.
#[derive(Debug, Default, Serialize)]
pub struct TransactionResponse {
    pub slot: u64,
    pub signature: String,
    /// Wire-format transaction bytes.
    pub data: Vec<u8>,
    /// Serialized status metadata, empty when the archive carries none.
    pub metadata: Vec<u8>,
}

impl Reset for TransactionResponse {
    fn reset(&mut self) {
        self.slot = 0;
        self.signature.clear();
        self.data.clear();
        self.metadata.clear();
    }
}

/// A block record resolved through the slot index, with its
/// transactions in archive order.
#[derive(Debug, Default, Serialize)]
pub struct BlockResponse {
    pub slot: u64,
    pub parent_slot: Option<u64>,
    pub blocktime: Option<i64>,
    pub block_height: Option<u64>,
    pub transactions: Vec<TransactionResponse>,
}

impl Reset for BlockResponse {
    fn reset(&mut self) {
        self.slot = 0;
        self.parent_slot = None;
        self.blocktime = None;
        self.block_height = None;
        self.transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_fields_but_keeps_buffers() {
        let mut resp = TransactionResponse {
            slot: 9,
            signature: "abc".to_owned(),
            data: vec![1; 512],
            metadata: vec![2; 64],
        };
        resp.reset();
        assert_eq!(resp.slot, 0);
        assert!(resp.signature.is_empty());
        assert!(resp.data.is_empty());
        assert!(resp.data.capacity() >= 512);
    }

    #[test]
    fn block_reset_drops_transactions() {
        let mut resp = BlockResponse {
            slot: 3,
            parent_slot: Some(2),
            blocktime: Some(1_700_000_000),
            block_height: Some(1),
            transactions: vec![TransactionResponse::default()],
        };
        resp.reset();
        assert_eq!(resp.slot, 0);
        assert!(resp.parent_slot.is_none());
        assert!(resp.transactions.is_empty());
    }
}
