//! Commonly used types for the staged chain-state synchronizer.
//!
//! This crate has no dependency on the storage layer or the stage pipeline: it only
//! defines the data model shared by every stage (block numbers, hashes, addresses,
//! stage identifiers) and the pure functions needed to recover a transaction sender
//! from its signature.

pub mod body;
mod chain_config;
mod signal;
mod signer;
mod stage_id;
pub mod transaction;

pub use alloy_primitives::{Address, B256};
pub use body::{decode_canonical_transactions, BodyDecodeError};
pub use chain_config::ChainConfig;
pub use signal::{register_stop_handler, StopSignal};
pub use signer::{recover_signer, RecoveryError};
pub use stage_id::StageId;
pub use transaction::{Signature, TransactionSigned, TxEnvelope};

/// A monotone Ethereum block height. Zero is genesis.
pub type BlockNumber = u64;

/// 32-byte header hash, aliased for readability at call sites that mean "a header"
/// rather than "any 32-byte value".
pub type HeaderHash = B256;

/// 32-byte transaction hash.
pub type TxHash = B256;

/// The EIP-155 chain identifier.
pub type ChainId = u64;

/// Encodes a [`BlockNumber`] as its canonical big-endian 8-byte key representation.
///
/// This is the key encoding used by every table keyed on block number
/// (`CanonicalHeaders`, `Senders`, `SyncStageProgress`'s value, ...).
#[must_use]
pub fn block_number_key(number: BlockNumber) -> [u8; 8] {
    number.to_be_bytes()
}

/// Decodes a big-endian 8-byte block number key. Returns `None` if `bytes` is not
/// exactly 8 bytes long.
#[must_use]
pub fn decode_block_number_key(bytes: &[u8]) -> Option<BlockNumber> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}
