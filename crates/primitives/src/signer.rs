//! Pure ECDSA public-key recovery: the one cryptographic primitive the Senders
//! stage's worker farm calls for every transaction it is handed.

use alloy_primitives::{keccak256, Address, B256};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message,
};

use crate::transaction::Signature;

/// Recovery failed: either the `(r, s)` pair is not a valid curve point for any
/// recovery id, or the caller-supplied `v_parity` does not correspond to a point on
/// the curve for this `(signing_hash, r, s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ECDSA public key recovery failed")]
pub struct RecoveryError;

/// Recovers the 20-byte Ethereum address that produced `signature` over
/// `signing_hash`.
///
/// This is the low-20-bytes-of-Keccak-256 construction used for every Ethereum
/// `Address`, applied to the uncompressed public key `secp256k1` recovers. Callers
/// are expected to have already rejected high-`s` signatures via
/// [`Signature::is_low_s`] (EIP-2); this function does not re-check that, since it
/// is a transaction-validity rule, not a recovery precondition.
pub fn recover_signer(signing_hash: B256, signature: &Signature) -> Result<Address, RecoveryError> {
    let recovery_id = RecoveryId::from_i32(i32::from(signature.odd_y_parity)).map_err(|_| RecoveryError)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r.to_be_bytes::<32>());
    sig_bytes[32..].copy_from_slice(&signature.s.to_be_bytes::<32>());

    let recoverable = RecoverableSignature::from_compact(&sig_bytes, recovery_id).map_err(|_| RecoveryError)?;
    let message = Message::from_slice(signing_hash.as_slice()).map_err(|_| RecoveryError)?;

    let public_key = secp256k1::SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| RecoveryError)?;

    let uncompressed = public_key.serialize_uncompressed();
    // Drop the leading 0x04 prefix before hashing, per the Ethereum address
    // derivation rule: address = keccak256(pubkey_x || pubkey_y)[12..].
    let hash = keccak256(&uncompressed[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use secp256k1::{Message as Secp256Message, SecretKey};

    #[test]
    fn recovers_address_matching_the_signing_key() {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let public = secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, &secret);
        let expected_addr = {
            let uncompressed = public.serialize_uncompressed();
            let hash = keccak256(&uncompressed[1..]);
            Address::from_slice(&hash[12..])
        };

        let digest = keccak256(b"hello world");
        let message = Secp256Message::from_slice(digest.as_slice()).unwrap();
        let (recovery_id, sig_bytes) = secp256k1::SECP256K1
            .sign_ecdsa_recoverable(&message, &secret)
            .serialize_compact();

        let signature = Signature {
            r: U256::from_be_slice(&sig_bytes[..32]),
            s: U256::from_be_slice(&sig_bytes[32..]),
            odd_y_parity: recovery_id.to_i32() == 1,
        };

        let recovered = recover_signer(digest, &signature).unwrap();
        assert_eq!(recovered, expected_addr);
    }

    #[test]
    fn garbage_signature_fails_cleanly() {
        let signature = Signature { r: U256::from(1), s: U256::from(1), odd_y_parity: false };
        assert!(recover_signer(B256::ZERO, &signature).is_err());
    }
}
