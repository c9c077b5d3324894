//! Integration tests driving whole stages (and the `Pipeline`) against the
//! `mem` backend, covering the concrete scenarios and round-trip laws a
//! staged chain-state synchronizer is expected to satisfy: forward/unwind for
//! `BlockHashes`, sender recovery and cancellation for `Senders`, and the
//! cross-stage progress invariant the driver is responsible for.

use alloy_primitives::{Address, B256, U256};
use alloy_rlp::Encodable;
use esync_config::{EtlConfig, SenderRecoveryConfig};
use esync_db::MemDatabase;
use esync_db_api::{
    BlockBodies, BlockBodyKey, BlockNumberKey, CanonicalHashes, Database, DbCursorRO, DbTx, DbTxMut, HeaderNumbers, Senders as SendersTable,
    SyncStageProgress,
};
use esync_primitives::{
    transaction::{LegacyTx, TxKind},
    ChainConfig, StageId, StopSignal, TxEnvelope,
};
use esync_stages::{BlockHashesStage, SendersStage};
use esync_stages_api::{ExecInput, Pipeline, Stage, StageContext, StageError, UnwindInput};

fn etl_config(dir: &std::path::Path) -> EtlConfig {
    EtlConfig { dir: Some(dir.to_path_buf()), file_size: EtlConfig::DEFAULT_FILE_SIZE, log_every_percent: 10 }
}

fn set_bodies_progress(db: &MemDatabase, height: u64) {
    let tx = db.tx_mut().unwrap();
    tx.put::<SyncStageProgress>(StageId::Bodies.as_str().as_bytes().to_vec(), height).unwrap();
    tx.commit().unwrap();
}

fn seed_canonical_chain(db: &MemDatabase, hashes: &[(u64, B256)]) {
    let tx = db.tx_mut().unwrap();
    for (number, hash) in hashes {
        tx.put::<CanonicalHashes>(BlockNumberKey(*number), *hash).unwrap();
    }
    tx.commit().unwrap();
}

fn context<'a>(stop: &'a StopSignal, registry: &'a esync_provider::ProgressRegistry) -> StageContext<'a> {
    StageContext { stop, registry }
}

/// A `CanonicalHashes`-named table with a raw `Vec<u8>` value, used only to
/// plant a malformed (non-32-byte) entry the typed `CanonicalHashes` API
/// could never encode.
#[derive(Debug)]
struct CanonicalHashesMalformed;

impl esync_db_api::Table for CanonicalHashesMalformed {
    const NAME: &'static str = CanonicalHashes::NAME;
    type Key = BlockNumberKey;
    type Value = Vec<u8>;
}

// --- scenario 1 & 2: BlockHashes forward happy path + unwind -------------

#[test]
fn block_hashes_forward_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (2, B256::repeat_byte(0xbb)), (3, B256::repeat_byte(0xcc))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 3);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    let input = ExecInput { checkpoint: 0, target: Some(3), first_cycle: true };
    let output = Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, input).unwrap();
    assert_eq!(output.checkpoint, 3);

    let tx = db.tx().unwrap();
    for (number, hash) in &hashes {
        assert_eq!(tx.get::<HeaderNumbers>(hash).unwrap(), Some(*number));
    }
    assert_eq!(registry.get_progress(&tx, StageId::BlockHashes).unwrap(), 3);
}

#[test]
fn block_hashes_unwind_removes_inverse_entries_above_the_target_height() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (2, B256::repeat_byte(0xbb)), (3, B256::repeat_byte(0xcc))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 3);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(3), first_cycle: true }).unwrap();

    let tx = db.tx_mut().unwrap();
    let output = Stage::<MemDatabase>::unwind(&mut stage, tx, &ctx, UnwindInput { checkpoint: 3, unwind_to: 1 }).unwrap();
    assert_eq!(output.checkpoint, 1);

    let tx = db.tx().unwrap();
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[0].1).unwrap(), Some(1));
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[1].1).unwrap(), None);
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[2].1).unwrap(), None);
    assert_eq!(registry.get_progress(&tx, StageId::BlockHashes).unwrap(), 1);
}

#[test]
fn block_hashes_forward_rejects_a_malformed_hash() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (3, B256::repeat_byte(0xcc))];
    seed_canonical_chain(&db, &hashes);
    // Block 2's hash is planted directly as 31 bytes, which the typed
    // `CanonicalHashes: BlockNum_BE -> B256` API could never encode.
    let tx = db.tx_mut().unwrap();
    tx.put::<CanonicalHashesMalformed>(BlockNumberKey(2), vec![0xdd; 31]).unwrap();
    tx.commit().unwrap();
    set_bodies_progress(&db, 3);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    let err = Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(3), first_cycle: true }).unwrap_err();
    assert!(matches!(err, StageError::BadBlockHash), "expected BadBlockHash, got {err:?}");

    // Nothing should have been committed: the watermark stays untouched.
    let tx = db.tx().unwrap();
    assert_eq!(registry.get_progress(&tx, StageId::BlockHashes).unwrap(), 0);
}

#[test]
fn block_hashes_forward_rejects_a_gap_in_the_canonical_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    // Block 2 is missing entirely: the sequence jumps from 1 straight to 3.
    let hashes = [(1, B256::repeat_byte(0xaa)), (3, B256::repeat_byte(0xcc))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 3);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    let err = Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(3), first_cycle: true }).unwrap_err();
    assert!(matches!(err, StageError::BadChainSequence), "expected BadChainSequence, got {err:?}");

    let tx = db.tx().unwrap();
    assert_eq!(registry.get_progress(&tx, StageId::BlockHashes).unwrap(), 0);
}

#[test]
fn block_hashes_forward_is_a_noop_when_checkpoint_already_equals_target() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (2, B256::repeat_byte(0xbb))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 2);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(2), first_cycle: true }).unwrap();

    // Calling forward again with checkpoint already at target must be a pure
    // no-op: no watermark change, and (since nothing is re-collected) no writes.
    let tx = db.tx_mut().unwrap();
    let output = Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 2, target: Some(2), first_cycle: false }).unwrap();
    assert_eq!(output.checkpoint, 2);

    let tx = db.tx().unwrap();
    assert_eq!(registry.get_progress(&tx, StageId::BlockHashes).unwrap(), 2);
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[0].1).unwrap(), Some(1));
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[1].1).unwrap(), Some(2));
}

#[test]
fn block_hashes_unwind_called_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (2, B256::repeat_byte(0xbb))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 2);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(2), first_cycle: true }).unwrap();

    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::unwind(&mut stage, tx, &ctx, UnwindInput { checkpoint: 2, unwind_to: 1 }).unwrap();

    // Second unwind call to the same height: an early no-op, not a failure.
    let tx = db.tx_mut().unwrap();
    let output = Stage::<MemDatabase>::unwind(&mut stage, tx, &ctx, UnwindInput { checkpoint: 1, unwind_to: 1 }).unwrap();
    assert_eq!(output.checkpoint, 1);

    let tx = db.tx().unwrap();
    assert_eq!(tx.get::<HeaderNumbers>(&hashes[0].1).unwrap(), Some(1));
}

#[test]
fn unwind_then_forward_reproduces_an_uninterrupted_forward_from_the_same_height() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();
    let hashes = [(1, B256::repeat_byte(0xaa)), (2, B256::repeat_byte(0xbb)), (3, B256::repeat_byte(0xcc))];
    seed_canonical_chain(&db, &hashes);
    set_bodies_progress(&db, 3);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut stage = BlockHashesStage::new(etl_config(dir.path()));

    // Uninterrupted forward from height 1 straight to 3.
    let reference_db = MemDatabase::new();
    seed_canonical_chain(&reference_db, &hashes);
    set_bodies_progress(&reference_db, 3);
    {
        let registry = esync_provider::ProgressRegistry::new();
        let ctx = context(&stop, &registry);
        let mut stage = BlockHashesStage::new(etl_config(dir.path()));
        let tx = reference_db.tx_mut().unwrap();
        Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(1), first_cycle: true }).unwrap();
        let tx = reference_db.tx_mut().unwrap();
        Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 1, target: Some(3), first_cycle: false }).unwrap();
    }

    // Forward to 3, unwind to 1, forward back to 3.
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 0, target: Some(3), first_cycle: true }).unwrap();
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::unwind(&mut stage, tx, &ctx, UnwindInput { checkpoint: 3, unwind_to: 1 }).unwrap();
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut stage, tx, &ctx, ExecInput { checkpoint: 1, target: Some(3), first_cycle: false }).unwrap();

    let read = |db: &MemDatabase| -> Vec<(B256, u64)> {
        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<HeaderNumbers>().unwrap();
        let mut out = Vec::new();
        let mut entry = cursor.first().unwrap();
        while let Some((k, v)) = entry {
            out.push((k, v));
            entry = cursor.next().unwrap();
        }
        out
    };
    assert_eq!(read(&db), read(&reference_db));
}

// --- scenario 4: Senders on a 1-block chain with 2 legacy transactions ----

#[derive(alloy_rlp::RlpEncodable)]
struct LegacyItem {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Vec<u8>,
    value: U256,
    input: Vec<u8>,
    v: U256,
    r: U256,
    s: U256,
}

fn sign_legacy(secret: &secp256k1::SecretKey, chain_id: u64, nonce: u64) -> (LegacyTx, Vec<u8>, Address) {
    let tx = LegacyTx {
        chain_id: Some(chain_id),
        nonce,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x42)),
        value: U256::from(1u64),
        input: Vec::new(),
    };
    let signing_hash = TxEnvelope::Legacy(tx.clone()).signing_hash();

    let message = secp256k1::Message::from_slice(signing_hash.as_slice()).unwrap();
    let (recovery_id, sig_bytes) = secp256k1::SECP256K1.sign_ecdsa_recoverable(&message, secret).serialize_compact();
    let r = U256::from_be_slice(&sig_bytes[..32]);
    let s = U256::from_be_slice(&sig_bytes[32..]);
    let parity = u64::from(recovery_id.to_i32() == 1);
    let v = U256::from(chain_id) * U256::from(2) + U256::from(35) + U256::from(parity);

    let public = secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, secret);
    let uncompressed = public.serialize_uncompressed();
    let hash = alloy_primitives::keccak256(&uncompressed[1..]);
    let sender = Address::from_slice(&hash[12..]);

    let item = LegacyItem {
        nonce: tx.nonce,
        gas_price: tx.gas_price,
        gas_limit: tx.gas_limit,
        to: match tx.to {
            TxKind::Create => Vec::new(),
            TxKind::Call(addr) => addr.to_vec(),
        },
        value: tx.value,
        input: tx.input.clone(),
        v,
        r,
        s,
    };
    let mut out = Vec::new();
    item.encode(&mut out);
    (tx, out, sender)
}

fn wrap_transactions_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut txns = Vec::new();
    alloy_rlp::Header { list: true, payload_length: payload_len }.encode(&mut txns);
    for item in items {
        txns.extend_from_slice(item);
    }
    let mut body = Vec::new();
    let ommers_header_len = {
        let mut buf = Vec::new();
        alloy_rlp::Header { list: true, payload_length: 0 }.encode(&mut buf);
        buf.len()
    };
    alloy_rlp::Header { list: true, payload_length: txns.len() + ommers_header_len }.encode(&mut body);
    body.extend_from_slice(&txns);
    alloy_rlp::Header { list: true, payload_length: 0 }.encode(&mut body);
    body
}

#[test]
fn senders_recovers_both_signers_of_a_single_block_with_two_legacy_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();

    let secret_a = secp256k1::SecretKey::from_slice(&[0x11; 32]).unwrap();
    let secret_b = secp256k1::SecretKey::from_slice(&[0x22; 32]).unwrap();
    let (_, item_a, sender_a) = sign_legacy(&secret_a, 1, 0);
    let (_, item_b, sender_b) = sign_legacy(&secret_b, 1, 1);
    let body = wrap_transactions_list(&[item_a, item_b]);

    let hash = B256::repeat_byte(0x01);
    let tx = db.tx_mut().unwrap();
    tx.put::<CanonicalHashes>(BlockNumberKey(1), hash).unwrap();
    tx.put::<BlockBodies>(BlockBodyKey { number: 1, hash }, body).unwrap();
    tx.commit().unwrap();
    set_bodies_progress(&db, 1);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut block_hashes = BlockHashesStage::new(etl_config(dir.path()));
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut block_hashes, tx, &ctx, ExecInput { checkpoint: 0, target: Some(1), first_cycle: true }).unwrap();

    let mut senders = SendersStage::new(etl_config(dir.path()), SenderRecoveryConfig::default(), ChainConfig::MAINNET);
    let tx = db.tx_mut().unwrap();
    let output = Stage::<MemDatabase>::forward(&mut senders, tx, &ctx, ExecInput { checkpoint: 0, target: Some(1), first_cycle: true }).unwrap();
    assert_eq!(output.checkpoint, 1);

    let tx = db.tx().unwrap();
    let stored = tx.get::<SendersTable>(&BlockNumberKey(1)).unwrap().unwrap();
    assert_eq!(stored.len(), 40);
    let mut expected = Vec::new();
    expected.extend_from_slice(sender_a.as_slice());
    expected.extend_from_slice(sender_b.as_slice());
    assert_eq!(stored, expected);
    assert_eq!(registry.get_progress(&tx, StageId::Senders).unwrap(), 1);
}

#[test]
fn senders_unwind_deletes_rows_above_the_target_height() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();

    let secret = secp256k1::SecretKey::from_slice(&[0x33; 32]).unwrap();
    let (_, item, _sender) = sign_legacy(&secret, 1, 0);
    let body = wrap_transactions_list(&[item]);

    let tx = db.tx_mut().unwrap();
    for number in 1u64..=2 {
        let hash = B256::repeat_byte(number as u8);
        tx.put::<CanonicalHashes>(BlockNumberKey(number), hash).unwrap();
        tx.put::<BlockBodies>(BlockBodyKey { number, hash }, body.clone()).unwrap();
    }
    tx.commit().unwrap();
    set_bodies_progress(&db, 2);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut block_hashes = BlockHashesStage::new(etl_config(dir.path()));
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut block_hashes, tx, &ctx, ExecInput { checkpoint: 0, target: Some(2), first_cycle: true }).unwrap();

    let mut senders = SendersStage::new(etl_config(dir.path()), SenderRecoveryConfig::default(), ChainConfig::MAINNET);
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut senders, tx, &ctx, ExecInput { checkpoint: 0, target: Some(2), first_cycle: true }).unwrap();

    let tx = db.tx_mut().unwrap();
    let output = Stage::<MemDatabase>::unwind(&mut senders, tx, &ctx, UnwindInput { checkpoint: 2, unwind_to: 1 }).unwrap();
    assert_eq!(output.checkpoint, 1);

    let tx = db.tx().unwrap();
    assert!(tx.get::<SendersTable>(&BlockNumberKey(1)).unwrap().is_some());
    assert!(tx.get::<SendersTable>(&BlockNumberKey(2)).unwrap().is_none());
}

#[test]
fn senders_forward_rejects_a_high_s_signature() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();

    // A syntactically well-formed legacy transaction whose `s` sits above
    // `n/2`; EIP-2 makes this a protocol-invalid signature regardless of
    // whether it recovers to a real key, so the stage must reject it before
    // ever calling into the recovery farm.
    let item = LegacyItem {
        nonce: 0,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: Address::repeat_byte(0x42).to_vec(),
        value: U256::from(1u64),
        input: Vec::new(),
        v: U256::from(37u64),
        r: U256::from(1u64),
        s: U256::MAX,
    };
    let mut body_item = Vec::new();
    item.encode(&mut body_item);
    let body = wrap_transactions_list(&[body_item]);

    let hash = B256::repeat_byte(0x01);
    let tx = db.tx_mut().unwrap();
    tx.put::<CanonicalHashes>(BlockNumberKey(1), hash).unwrap();
    tx.put::<BlockBodies>(BlockBodyKey { number: 1, hash }, body).unwrap();
    tx.commit().unwrap();
    set_bodies_progress(&db, 1);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut block_hashes = BlockHashesStage::new(etl_config(dir.path()));
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut block_hashes, tx, &ctx, ExecInput { checkpoint: 0, target: Some(1), first_cycle: true }).unwrap();

    let mut senders = SendersStage::new(etl_config(dir.path()), SenderRecoveryConfig::default(), ChainConfig::MAINNET);
    let tx = db.tx_mut().unwrap();
    let err = Stage::<MemDatabase>::forward(&mut senders, tx, &ctx, ExecInput { checkpoint: 0, target: Some(1), first_cycle: true }).unwrap_err();
    assert!(matches!(err, StageError::InvalidTransaction), "expected InvalidTransaction, got {err:?}");

    let tx = db.tx().unwrap();
    assert_eq!(registry.get_progress(&tx, StageId::Senders).unwrap(), 0);
}

// --- scenario 5: cancellation ---------------------------------------------

#[test]
fn senders_forward_aborts_without_committing_once_the_stop_signal_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();

    let secret = secp256k1::SecretKey::from_slice(&[0x44; 32]).unwrap();
    let (_, item, _sender) = sign_legacy(&secret, 1, 0);
    let body = wrap_transactions_list(&[item]);

    let tx = db.tx_mut().unwrap();
    for number in 1u64..=5 {
        let hash = B256::repeat_byte(number as u8);
        tx.put::<CanonicalHashes>(BlockNumberKey(number), hash).unwrap();
        tx.put::<BlockBodies>(BlockBodyKey { number, hash }, body.clone()).unwrap();
    }
    tx.commit().unwrap();
    set_bodies_progress(&db, 5);

    let registry = esync_provider::ProgressRegistry::new();
    let stop = StopSignal::new();
    let ctx = context(&stop, &registry);
    let mut block_hashes = BlockHashesStage::new(etl_config(dir.path()));
    let tx = db.tx_mut().unwrap();
    Stage::<MemDatabase>::forward(&mut block_hashes, tx, &ctx, ExecInput { checkpoint: 0, target: Some(5), first_cycle: true }).unwrap();

    stop.set();
    let mut senders = SendersStage::new(etl_config(dir.path()), SenderRecoveryConfig::default(), ChainConfig::MAINNET);
    let tx = db.tx_mut().unwrap();
    let err = Stage::<MemDatabase>::forward(&mut senders, tx, &ctx, ExecInput { checkpoint: 0, target: Some(5), first_cycle: true }).unwrap_err();
    assert!(matches!(err, StageError::Aborted));

    let tx = db.tx().unwrap();
    assert!(tx.get::<SendersTable>(&BlockNumberKey(1)).unwrap().is_none());
    assert_eq!(registry.get_progress(&tx, StageId::Senders).unwrap(), 0);

    let leftover = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".etl"))
        .count();
    assert_eq!(leftover, 0);
}

// --- cross-stage invariant via the Pipeline -------------------------------

#[test]
fn pipeline_forward_cycle_keeps_senders_progress_behind_block_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let db = MemDatabase::new();

    let secret = secp256k1::SecretKey::from_slice(&[0x55; 32]).unwrap();
    let (_, item, _sender) = sign_legacy(&secret, 1, 0);
    let body = wrap_transactions_list(&[item]);

    let tx = db.tx_mut().unwrap();
    for number in 1u64..=3 {
        let hash = B256::repeat_byte(number as u8);
        tx.put::<CanonicalHashes>(BlockNumberKey(number), hash).unwrap();
        tx.put::<BlockBodies>(BlockBodyKey { number, hash }, body.clone()).unwrap();
    }
    tx.commit().unwrap();
    set_bodies_progress(&db, 3);

    let mut pipeline = Pipeline::new(db.clone());
    pipeline.push_stage(Box::new(BlockHashesStage::new(etl_config(dir.path()))));
    pipeline.push_stage(Box::new(SendersStage::new(etl_config(dir.path()), SenderRecoveryConfig::default(), ChainConfig::MAINNET)));
    pipeline.run_forward_cycle().unwrap();

    let tx = db.tx().unwrap();
    let registry = esync_provider::ProgressRegistry::new();
    let block_hashes_progress = registry.get_progress(&tx, StageId::BlockHashes).unwrap();
    let senders_progress = registry.get_progress(&tx, StageId::Senders).unwrap();
    assert_eq!(block_hashes_progress, 3);
    assert_eq!(senders_progress, 3);
    assert!(senders_progress <= block_hashes_progress);

    // A second cycle with no new source data is a no-op (idempotence).
    pipeline.run_forward_cycle().unwrap();
    let tx = db.tx().unwrap();
    assert_eq!(registry.get_progress(&tx, StageId::Senders).unwrap(), 3);
}
