//! End-to-end pass over a synthetic archive: build both indexes, look
//! keys up, and verify the sealed files against the archive.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use compact_index::{
    build_archive_indexes, index_filename, verify_archive_index, CompactIndex, IndexError,
    IndexKind,
};
use minicbor::Encoder;
use solana_signature::Signature;

const KIND_TRANSACTION: u64 = 0;
const KIND_ENTRY: u64 = 1;
const KIND_BLOCK: u64 = 2;
const KIND_DATAFRAME: u64 = 6;

fn push_uvarint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let mut b = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            b |= 0x80;
        }
        out.push(b);
        if v == 0 {
            break;
        }
    }
}

fn fake_cid(digest: u8) -> Vec<u8> {
    let mut c = vec![0x01, 0x71, 0x12, 32];
    c.extend_from_slice(&[digest; 32]);
    c
}

fn push_section(out: &mut Vec<u8>, digest: u8, payload: &[u8]) {
    let cid = fake_cid(digest);
    push_uvarint(out, (cid.len() + payload.len()) as u64);
    out.extend_from_slice(&cid);
    out.extend_from_slice(payload);
}

fn wire_transaction(sig_byte: u8) -> Vec<u8> {
    let mut tx = vec![0x01];
    tx.extend_from_slice(&[sig_byte; 64]);
    tx.extend_from_slice(b"message-body");
    tx
}

fn encode_dataframe(e: &mut Encoder<&mut Vec<u8>>, data: &[u8]) {
    e.array(6).unwrap();
    e.u64(KIND_DATAFRAME).unwrap();
    e.null().unwrap();
    e.null().unwrap();
    e.null().unwrap();
    e.bytes(data).unwrap();
    e.null().unwrap();
}

fn encode_transaction_node(tx_data: &[u8], meta: &[u8], slot: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(5).unwrap();
    e.u64(KIND_TRANSACTION).unwrap();
    encode_dataframe(&mut e, tx_data);
    encode_dataframe(&mut e, meta);
    e.u64(slot).unwrap();
    e.null().unwrap();
    buf
}

fn encode_entry_node() -> Vec<u8> {
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(1).unwrap();
    e.u64(KIND_ENTRY).unwrap();
    buf
}

fn encode_block_node(slot: u64, blocktime: Option<i64>) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(6).unwrap();
    e.u64(KIND_BLOCK).unwrap();
    e.u64(slot).unwrap();
    e.array(0).unwrap();
    e.array(0).unwrap();
    e.array(3).unwrap();
    e.u64(slot.saturating_sub(1)).unwrap();
    match blocktime {
        Some(t) => e.i64(t).unwrap(),
        None => e.null().unwrap(),
    };
    e.null().unwrap();
    e.null().unwrap();
    buf
}

/// Three blocks at slots 100, 101 and 103 (102 skipped), five
/// transactions total.
fn write_archive(dir: &Path) -> PathBuf {
    let mut car = Vec::new();
    push_uvarint(&mut car, 4);
    car.extend_from_slice(&[0xa0, 0, 0, 0]);

    let mut digest = 0u8;
    let mut block = |car: &mut Vec<u8>, slot: u64, sig_bytes: &[u8]| {
        for &s in sig_bytes {
            digest += 1;
            push_section(
                car,
                digest,
                &encode_transaction_node(&wire_transaction(s), b"status-meta", slot),
            );
        }
        digest += 1;
        push_section(car, digest, &encode_entry_node());
        digest += 1;
        push_section(car, digest, &encode_block_node(slot, Some(1_700_000_000)));
    };

    block(&mut car, 100, &[0x11, 0x12]);
    block(&mut car, 101, &[0x21]);
    block(&mut car, 103, &[0x31, 0x32]);

    let path = dir.join("epoch-42.car");
    let mut f = File::create(&path).unwrap();
    f.write_all(&car).unwrap();
    path
}

#[test]
fn build_lookup_verify_round() {
    let dir = tempfile::tempdir().unwrap();
    let car = write_archive(dir.path());

    let built = build_archive_indexes(&car, dir.path(), 42, 0).unwrap();
    assert_eq!(built.sig_entries, 5);
    assert_eq!(built.slot_entries, 3);

    let sig_index = CompactIndex::open(&built.sig_path).unwrap();
    let slot_index = CompactIndex::open(&built.slot_path).unwrap();
    assert_eq!(sig_index.kind(), IndexKind::SigToOffset);
    assert_eq!(slot_index.kind(), IndexKind::SlotToOffset);
    assert_eq!(sig_index.epoch(), 42);

    // A transaction in the middle block resolves to a span that reads
    // back as that very node.
    let sig = Signature::from([0x21u8; 64]);
    let value = sig_index.lookup_signature(&sig).unwrap();
    let mut f = File::open(&car).unwrap();
    f.seek(SeekFrom::Start(value.offset())).unwrap();
    let mut section = vec![0u8; value.size() as usize];
    f.read_exact(&mut section).unwrap();
    let node = encode_transaction_node(&wire_transaction(0x21), b"status-meta", 101);
    assert!(section.ends_with(&node));

    // Skipped slot stays absent.
    assert!(slot_index.lookup_slot(102).is_none());
    assert!(slot_index.lookup_slot(103).is_some());

    let report = verify_archive_index(&car, &built.sig_path, 0).unwrap();
    assert_eq!(report.checked, 5);
    let report = verify_archive_index(&car, &built.slot_path, 0).unwrap();
    assert_eq!(report.checked, 3);
}

#[test]
fn verify_catches_corrupted_entry() {
    let dir = tempfile::tempdir().unwrap();
    let car = write_archive(dir.path());
    build_archive_indexes(&car, dir.path(), 42, 0).unwrap();

    let slot_path = dir.path().join(index_filename(42, IndexKind::SlotToOffset));
    // Flip a byte inside the first entry's value field (entries start
    // at byte 32, the slot key is 8 bytes wide).
    let mut f = OpenOptions::new().read(true).write(true).open(&slot_path).unwrap();
    f.seek(SeekFrom::Start(32 + 8)).unwrap();
    let mut b = [0u8; 1];
    f.read_exact(&mut b).unwrap();
    f.seek(SeekFrom::Start(32 + 8)).unwrap();
    f.write_all(&[b[0] ^ 0xff]).unwrap();
    drop(f);

    let err = verify_archive_index(&car, &slot_path, 0).unwrap_err();
    assert!(matches!(err, IndexError::Inconsistent { .. }), "{err}");
}

#[test]
fn verify_catches_missing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let car = write_archive(dir.path());
    build_archive_indexes(&car, dir.path(), 42, 0).unwrap();

    // Grow the archive by one more record; the sealed index no longer
    // covers it.
    let mut extra = Vec::new();
    push_section(
        &mut extra,
        0xEE,
        &encode_transaction_node(&wire_transaction(0x41), b"status-meta", 104),
    );
    push_section(&mut extra, 0xEF, &encode_block_node(104, None));
    let mut f = OpenOptions::new().append(true).open(&car).unwrap();
    f.write_all(&extra).unwrap();
    drop(f);

    let sig_path = dir.path().join(index_filename(42, IndexKind::SigToOffset));
    let err = verify_archive_index(&car, &sig_path, 0).unwrap_err();
    assert!(matches!(err, IndexError::Inconsistent { .. }), "{err}");
}
