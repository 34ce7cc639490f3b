use core::marker::PhantomData;

use minicbor::data::Type;
use minicbor::decode::Error as CborError;
use minicbor::{Decode, Decoder};
use solana_signature::Signature;

use crate::error::{CarReadError, CarReadResult};

/// Kind tag carried by every node in an epoch archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Kind {
    Transaction = 0,
    Entry = 1,
    Block = 2,
    Subset = 3,
    Epoch = 4,
    Rewards = 5,
    DataFrame = 6,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Transaction => "transaction",
            Kind::Entry => "entry",
            Kind::Block => "block",
            Kind::Subset => "subset",
            Kind::Epoch => "epoch",
            Kind::Rewards => "rewards",
            Kind::DataFrame => "dataframe",
        }
    }

    pub const ALL: [Kind; 7] = [
        Kind::Transaction,
        Kind::Entry,
        Kind::Block,
        Kind::Subset,
        Kind::Epoch,
        Kind::Rewards,
        Kind::DataFrame,
    ];
}

impl TryFrom<u64> for Kind {
    type Error = CarReadError;

    fn try_from(v: u64) -> CarReadResult<Self> {
        Ok(match v {
            0 => Kind::Transaction,
            1 => Kind::Entry,
            2 => Kind::Block,
            3 => Kind::Subset,
            4 => Kind::Epoch,
            5 => Kind::Rewards,
            6 => Kind::DataFrame,
            other => return Err(CarReadError::UnknownKind(other)),
        })
    }
}

/// Reads the kind tag off the front of a node payload without decoding
/// the rest. Every node is a CBOR array whose first element is the
/// kind id.
#[inline]
pub fn peek_kind(payload: &[u8]) -> CarReadResult<Kind> {
    let mut peek = Decoder::new(payload);
    let _ = peek.array()?;
    Kind::try_from(peek.u64()?)
}

/// Borrowed view over an encoded CBOR array, allowing cheap deferred
/// decoding of the elements.
#[derive(Debug, Clone)]
pub struct CborArrayView<'b, T> {
    pub slice: &'b [u8],
    _t: PhantomData<T>,
}

impl<'b, C, T> Decode<'b, C> for CborArrayView<'b, T> {
    #[inline]
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> core::result::Result<Self, CborError> {
        let start = d.position();
        d.skip()?;
        let end = d.position();
        let input = d.input();

        Ok(Self {
            slice: &input[start..end],
            _t: PhantomData,
        })
    }
}

impl<'b, T> CborArrayView<'b, T>
where
    T: Decode<'b, ()>,
{
    #[inline]
    pub fn len(&self) -> usize {
        let mut d = Decoder::new(self.slice);
        d.array().ok().flatten().unwrap_or(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = core::result::Result<T, CborError>> + 'b {
        let mut d = Decoder::new(self.slice);
        let n = d.array().ok().flatten().unwrap_or(0);
        (0..n).map(move |_| d.decode_with(&mut ()))
    }
}

/// Raw CID bytes as they appear inside node bodies (tag 42).
#[derive(Debug, Clone, Copy)]
pub struct CborCidRef<'a> {
    pub bytes: &'a [u8],
}

impl<'a> CborCidRef<'a> {
    #[inline]
    pub fn hash_bytes(&self) -> &'a [u8] {
        &self.bytes[1..]
    }
}

impl<'b, C> Decode<'b, C> for CborCidRef<'b> {
    #[inline]
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> core::result::Result<Self, CborError> {
        if d.datatype()? == Type::Tag {
            let _ = d.tag()?;
        }
        let bytes = d.bytes()?;
        if bytes.len() <= 1 {
            return Err(CborError::message("invalid CID bytes"));
        }
        Ok(Self { bytes })
    }
}

#[derive(Debug, Decode)]
#[cbor(array)]
pub struct DataFrame<'a> {
    #[n(0)]
    pub kind: u64,
    #[n(1)]
    pub hash: Option<u64>,
    #[n(2)]
    pub index: Option<u64>,
    #[n(3)]
    pub total: Option<u64>,
    #[n(4)]
    #[cbor(decode_with = "minicbor::bytes::decode")]
    pub data: &'a [u8],
    #[n(5)]
    pub next: Option<CborCidRef<'a>>,
}

impl DataFrame<'_> {
    /// True when this frame carries the whole payload. A `next` link
    /// or a frame total above one means the payload continues in
    /// further dataframe nodes and `data` alone is a truncation.
    pub fn is_complete(&self) -> bool {
        self.next.is_none() && self.total.map_or(true, |t| t <= 1)
    }
}

#[derive(Debug, Decode, Clone)]
#[cbor(array)]
pub struct SlotMeta {
    #[n(0)]
    pub parent_slot: Option<u64>,
    #[n(1)]
    pub blocktime: Option<i64>,
    #[n(2)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Decode, Clone)]
#[cbor(array)]
pub struct Shredding {
    #[n(0)]
    pub entry_end_idx: i64,
    #[n(1)]
    pub shred_end_idx: i64,
}

#[derive(Debug, Decode)]
#[cbor(array)]
pub struct TransactionNode<'a> {
    #[n(0)]
    pub kind: u64,
    #[n(1)]
    #[cbor(borrow = "'a + 'bytes")]
    pub data: DataFrame<'a>,
    #[n(2)]
    pub metadata: DataFrame<'a>,
    #[n(3)]
    pub slot: u64,
    #[n(4)]
    pub index: Option<u64>,
}

#[derive(Debug, Decode, Clone)]
#[cbor(array)]
pub struct BlockNode<'a> {
    #[n(0)]
    pub kind: u64,
    #[n(1)]
    pub slot: u64,
    #[n(2)]
    pub shredding: Vec<Shredding>,
    #[n(3)]
    #[cbor(borrow = "'a + 'bytes")]
    pub entries: CborArrayView<'a, CborCidRef<'a>>,
    #[n(4)]
    pub meta: SlotMeta,
    #[n(5)]
    pub rewards: Option<CborCidRef<'a>>,
}

/// Decodes a transaction node payload. The caller is expected to have
/// checked the kind tag via [`peek_kind`] first.
#[inline]
pub fn decode_transaction(payload: &[u8]) -> CarReadResult<TransactionNode<'_>> {
    let mut d = Decoder::new(payload);
    let node: TransactionNode<'_> = d.decode()?;
    if node.kind != Kind::Transaction as u64 {
        return Err(CarReadError::UnknownKind(node.kind));
    }
    Ok(node)
}

#[inline]
pub fn decode_block(payload: &[u8]) -> CarReadResult<BlockNode<'_>> {
    let mut d = Decoder::new(payload);
    let node: BlockNode<'_> = d.decode()?;
    if node.kind != Kind::Block as u64 {
        return Err(CarReadError::UnknownKind(node.kind));
    }
    Ok(node)
}

const SIGNATURE_LEN: usize = 64;

/// Extracts the leading signature from wire-format transaction bytes:
/// a shortvec signature count followed by 64-byte signatures.
pub fn first_signature(tx_data: &[u8]) -> Option<Signature> {
    let (count, used) = read_shortvec_len(tx_data)?;
    if count == 0 || tx_data.len() < used + SIGNATURE_LEN {
        return None;
    }
    let raw: [u8; SIGNATURE_LEN] = tx_data[used..used + SIGNATURE_LEN].try_into().ok()?;
    Some(Signature::from(raw))
}

/// Solana shortvec (compact-u16): 7 bits per byte, max 3 bytes.
fn read_shortvec_len(data: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (i, &b) in data.iter().take(3).enumerate() {
        value |= ((b & 0x7f) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
