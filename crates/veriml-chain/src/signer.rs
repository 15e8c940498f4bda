//! Operator key handling. The key never leaves this process: only signatures
//! and the derived address are exposed.

use std::fmt;

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{ChainError, Result};

/// An ECDSA signature over secp256k1 in the `(y_parity, r, s)` form used by
/// typed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub y_parity: bool,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// Private key used to sign operator transactions.
#[derive(Clone)]
pub struct OperatorKey {
    key: SigningKey,
    address: Address,
}

impl OperatorKey {
    /// Parse a hex-encoded 32-byte private key (with or without `0x`).
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|_| ChainError::Signing("operator key is not valid hex".to_string()))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| ChainError::Signing("operator key is not a valid secp256k1 scalar".to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Account address derived from the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte prehash, returning a low-S recoverable signature.
    pub fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature> {
        let (mut signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let mut y_parity = recovery_id.is_y_odd();
        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            y_parity = !y_parity;
        }

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature { y_parity, r, s })
    }
}

impl fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorKey")
            .field("address", &self.address.to_checksum(None))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Derive the account address of a public key: last 20 bytes of the keccak
/// hash of the uncompressed point without its tag byte.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn derives_known_address() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        assert_eq!(
            key.address().to_checksum(None),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn accepts_key_without_prefix() {
        let with = OperatorKey::from_hex(KEY).unwrap();
        let without = OperatorKey::from_hex(KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with.address(), without.address());
    }

    #[test]
    fn rejects_garbage_keys() {
        assert!(matches!(
            OperatorKey::from_hex("not-hex"),
            Err(ChainError::Signing(_))
        ));
        assert!(matches!(
            OperatorKey::from_hex("0x1234"),
            Err(ChainError::Signing(_))
        ));
        let zero = format!("0x{}", "00".repeat(32));
        assert!(OperatorKey::from_hex(&zero).is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("4c0883a6"));
    }

    #[test]
    fn signature_recovers_to_operator() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        let hash = keccak256(b"veriml");
        let sig = key.sign_hash(&hash).unwrap();

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&sig.r);
        bytes[32..].copy_from_slice(&sig.s);
        let signature = Signature::from_slice(&bytes).unwrap();
        assert!(signature.normalize_s().is_none(), "signature must be low-S");

        let recovery_id = RecoveryId::new(sig.y_parity, false);
        let recovered =
            VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id).unwrap();
        assert_eq!(address_of(&recovered), key.address());
    }
}
