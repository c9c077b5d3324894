//! The three transaction envelopes the Senders stage recovers signers for, and the
//! pure signing-hash functions each envelope type exposes.
//!
//! This module does not implement the RLP wire codec for *blocks* (that decoder is
//! external to this core); it does use [`alloy_rlp`] — a general-purpose RLP
//! crate, not a hand-rolled one — to reconstruct the exact preimage each signature
//! was produced over, and to give this workspace's own KV backend a concrete way to
//! persist a decoded body without inventing a second ad hoc format.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

use crate::ChainId;

/// An account/contract access-list entry (EIP-2930).
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccessListItem {
    /// The account address the following storage keys belong to.
    pub address: Address,
    /// Storage slots the transaction pre-declares it will touch.
    pub storage_keys: Vec<B256>,
}

/// An EIP-2930 access list: an ordered sequence of [`AccessListItem`]s.
pub type AccessList = Vec<AccessListItem>;

/// Whether a transaction creates a contract or calls an existing address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Contract creation; the recipient is derived from `(sender, nonce)`.
    Create,
    /// A call (or plain value transfer) to an existing address.
    Call(Address),
}

/// The raw `(r, s, v)` signature carried by a signed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// The `r` component.
    pub r: U256,
    /// The `s` component.
    pub s: U256,
    /// `y_parity` after EIP-155/2718 normalization: `true` if the recovery id is odd.
    pub odd_y_parity: bool,
}

/// `secp256k1`'s curve order, `n`. Used by [`Signature::is_low_s`] (EIP-2).
const SECP256K1_N: U256 = U256::from_be_bytes([
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
]);

impl Signature {
    /// EIP-2: rejects signatures with `s` in the upper half of the curve order, which
    /// are a second valid encoding of the same signature and a common source of
    /// transaction-malleability bugs.
    #[must_use]
    pub fn is_low_s(&self) -> bool {
        self.s <= SECP256K1_N / U256::from(2)
    }
}

/// A legacy (pre-EIP-2718) transaction, optionally EIP-155 replay-protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    /// `Some` once EIP-155 folds the chain id into `v`; `None` for pre-Spurious-Dragon
    /// transactions, which sign over the bare five-field tuple.
    pub chain_id: Option<ChainId>,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub input: Vec<u8>,
}

/// An EIP-2930 (type `0x01`) access-list transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip2930Tx {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: AccessList,
}

/// An EIP-1559 (type `0x02`) dynamic-fee transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub input: Vec<u8>,
    pub access_list: AccessList,
}

/// One of the three transaction envelopes this core recovers senders for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEnvelope {
    Legacy(LegacyTx),
    Eip2930(Eip2930Tx),
    Eip1559(Eip1559Tx),
}

/// A decoded transaction together with the signature it was broadcast with.
///
/// This is the unit the Senders stage iterates: one per transaction, in the
/// block's original order. `signing_hash` is computed on demand via
/// [`TxEnvelope::signing_hash`] rather than stored, since it is a pure function of
/// the other fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSigned {
    pub hash: crate::TxHash,
    pub transaction: TxEnvelope,
    pub signature: Signature,
}

impl TxEnvelope {
    /// The EIP-155 chain id this transaction was signed against, if any.
    ///
    /// Legacy transactions signed before Spurious Dragon have none; typed
    /// transactions always carry one.
    #[must_use]
    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::Eip2930(tx) => Some(tx.chain_id),
            Self::Eip1559(tx) => Some(tx.chain_id),
        }
    }

    /// The EIP-2718 transaction type byte legacy transactions implicitly occupy
    /// position `0x00` for.
    #[must_use]
    pub fn tx_type(&self) -> u8 {
        match self {
            Self::Legacy(_) => 0x00,
            Self::Eip2930(_) => 0x01,
            Self::Eip1559(_) => 0x02,
        }
    }

    /// The Keccak-256 hash of the exact byte sequence the sender signed.
    ///
    /// This is the value a Recovery Package carries as `signing_hash`. It is
    /// reconstructed here from the decoded envelope fields by re-deriving the
    /// exact preimage each rule defines, using a general-purpose RLP encoder
    /// rather than a hand-rolled one.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        let mut buf = Vec::new();
        match self {
            Self::Legacy(tx) => {
                let fields = RlpLegacySigningFields {
                    nonce: tx.nonce,
                    gas_price: tx.gas_price,
                    gas_limit: tx.gas_limit,
                    to: tx_kind_rlp(tx.to),
                    value: tx.value,
                    input: tx.input.clone(),
                };
                match tx.chain_id {
                    Some(chain_id) => {
                        let with_chain_id = RlpLegacyEip155SigningFields {
                            nonce: tx.nonce,
                            gas_price: tx.gas_price,
                            gas_limit: tx.gas_limit,
                            to: tx_kind_rlp(tx.to),
                            value: tx.value,
                            input: tx.input.clone(),
                            chain_id,
                            zero1: 0u8,
                            zero2: 0u8,
                        };
                        with_chain_id.encode(&mut buf);
                    }
                    None => fields.encode(&mut buf),
                }
            }
            Self::Eip2930(tx) => {
                buf.push(0x01);
                let fields = RlpEip2930SigningFields {
                    chain_id: tx.chain_id,
                    nonce: tx.nonce,
                    gas_price: tx.gas_price,
                    gas_limit: tx.gas_limit,
                    to: tx_kind_rlp(tx.to),
                    value: tx.value,
                    input: tx.input.clone(),
                    access_list: tx.access_list.clone(),
                };
                fields.encode(&mut buf);
            }
            Self::Eip1559(tx) => {
                buf.push(0x02);
                let fields = RlpEip1559SigningFields {
                    chain_id: tx.chain_id,
                    nonce: tx.nonce,
                    max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
                    max_fee_per_gas: tx.max_fee_per_gas,
                    gas_limit: tx.gas_limit,
                    to: tx_kind_rlp(tx.to),
                    value: tx.value,
                    input: tx.input.clone(),
                    access_list: tx.access_list.clone(),
                };
                fields.encode(&mut buf);
            }
        }
        keccak256(buf)
    }
}

/// `alloy_rlp` encodes `TxKind` naturally as either the empty string (create) or
/// the 20-byte address; this local newtype carries that mapping.
#[derive(Debug, Clone, Copy)]
struct RlpTxKind(TxKind);

impl alloy_rlp::Encodable for RlpTxKind {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self.0 {
            TxKind::Create => "".encode(out),
            TxKind::Call(addr) => addr.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self.0 {
            TxKind::Create => "".length(),
            TxKind::Call(addr) => addr.length(),
        }
    }
}

fn tx_kind_rlp(kind: TxKind) -> RlpTxKind {
    RlpTxKind(kind)
}

#[derive(RlpEncodable)]
struct RlpLegacySigningFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpTxKind,
    value: U256,
    input: Vec<u8>,
}

#[derive(RlpEncodable)]
struct RlpLegacyEip155SigningFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpTxKind,
    value: U256,
    input: Vec<u8>,
    chain_id: ChainId,
    zero1: u8,
    zero2: u8,
}

#[derive(RlpEncodable)]
struct RlpEip2930SigningFields {
    chain_id: ChainId,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: RlpTxKind,
    value: U256,
    input: Vec<u8>,
    access_list: AccessList,
}

#[derive(RlpEncodable)]
struct RlpEip1559SigningFields {
    chain_id: ChainId,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: RlpTxKind,
    value: U256,
    input: Vec<u8>,
    access_list: AccessList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_s_boundary() {
        let half_n = SECP256K1_N / U256::from(2);
        let low = Signature { r: U256::from(1), s: half_n, odd_y_parity: false };
        let high = Signature { r: U256::from(1), s: half_n + U256::from(1), odd_y_parity: false };
        assert!(low.is_low_s());
        assert!(!high.is_low_s());
    }

    #[test]
    fn legacy_signing_hash_is_deterministic() {
        let tx = LegacyTx {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            input: Vec::new(),
        };
        let a = TxEnvelope::Legacy(tx.clone()).signing_hash();
        let b = TxEnvelope::Legacy(tx).signing_hash();
        assert_eq!(a, b);
    }

    #[test]
    fn pre_eip155_and_eip155_hashes_differ() {
        let base = LegacyTx {
            chain_id: None,
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            to: TxKind::Create,
            value: U256::ZERO,
            input: Vec::new(),
        };
        let with_chain_id = LegacyTx { chain_id: Some(1), ..base.clone() };
        assert_ne!(
            TxEnvelope::Legacy(base).signing_hash(),
            TxEnvelope::Legacy(with_chain_id).signing_hash()
        );
    }

    #[test]
    fn tx_type_bytes_match_eip2718() {
        let legacy = TxEnvelope::Legacy(LegacyTx {
            chain_id: None,
            nonce: 0,
            gas_price: 0,
            gas_limit: 0,
            to: TxKind::Create,
            value: U256::ZERO,
            input: Vec::new(),
        });
        assert_eq!(legacy.tx_type(), 0x00);
    }
}
