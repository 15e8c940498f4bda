//! EIP-1559 transaction construction and signing.

use alloy_primitives::{keccak256, Address, B256};

use crate::error::Result;
use crate::rlp;
use crate::signer::{OperatorKey, RecoverableSignature};

/// EIP-2718 type byte for dynamic-fee transactions.
const EIP1559_TX_TYPE: u8 = 0x02;

/// One gwei in wei.
pub const GWEI: u128 = 1_000_000_000;

/// Gas limit and fee caps applied to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasPolicy {
    /// Contract creation: higher limit than a plain call.
    pub const DEPLOYMENT: GasPolicy = GasPolicy {
        gas_limit: 3_500_000,
        max_fee_per_gas: 30 * GWEI,
        max_priority_fee_per_gas: 2 * GWEI,
    };

    /// Function call on an existing contract.
    pub const CALL: GasPolicy = GasPolicy {
        gas_limit: 2_000_000,
        max_fee_per_gas: 30 * GWEI,
        max_priority_fee_per_gas: 2 * GWEI,
    };
}

/// Destination of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Contract creation; the payload is init code.
    Create,
    /// Call into an existing contract; the payload is calldata.
    Call(Address),
}

/// An unsigned transaction, built fresh for every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub kind: TxKind,
    pub data: Vec<u8>,
    pub nonce: u64,
    pub gas: GasPolicy,
    pub chain_id: u64,
}

impl TransactionRequest {
    /// Hash that the operator signs.
    pub fn signing_hash(&self) -> B256 {
        let mut payload = vec![EIP1559_TX_TYPE];
        payload.extend_from_slice(&rlp::encode_list(&self.fields()));
        keccak256(payload)
    }

    /// Sign locally, consuming the request.
    pub fn sign(self, key: &OperatorKey) -> Result<SignedTransaction> {
        let signature = key.sign_hash(&self.signing_hash())?;
        Ok(SignedTransaction {
            request: self,
            signature,
        })
    }

    fn fields(&self) -> Vec<Vec<u8>> {
        let to = match self.kind {
            TxKind::Create => rlp::encode_bytes(&[]),
            TxKind::Call(address) => rlp::encode_bytes(address.as_slice()),
        };
        vec![
            rlp::encode_u128(self.chain_id as u128),
            rlp::encode_u128(self.nonce as u128),
            rlp::encode_u128(self.gas.max_priority_fee_per_gas),
            rlp::encode_u128(self.gas.max_fee_per_gas),
            rlp::encode_u128(self.gas.gas_limit as u128),
            to,
            rlp::encode_u128(0),
            rlp::encode_bytes(&self.data),
            rlp::encode_list(&[]),
        ]
    }
}

/// A signed, immutable transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    request: TransactionRequest,
    signature: RecoverableSignature,
}

impl SignedTransaction {
    /// Raw EIP-2718 envelope bytes as accepted by `eth_sendRawTransaction`.
    pub fn raw(&self) -> Vec<u8> {
        let mut fields = self.request.fields();
        fields.push(rlp::encode_u128(self.signature.y_parity as u128));
        fields.push(rlp::encode_uint_be(&self.signature.r));
        fields.push(rlp::encode_uint_be(&self.signature.s));

        let mut out = vec![EIP1559_TX_TYPE];
        out.extend_from_slice(&rlp::encode_list(&fields));
        out
    }

    /// Transaction hash: keccak of the raw envelope.
    pub fn hash(&self) -> B256 {
        keccak256(self.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn request(kind: TxKind) -> TransactionRequest {
        let key = OperatorKey::from_hex(KEY).unwrap();
        TransactionRequest {
            from: key.address(),
            kind,
            data: vec![0x60, 0x80, 0x60, 0x40],
            nonce: 7,
            gas: GasPolicy::CALL,
            chain_id: 31337,
        }
    }

    #[test]
    fn deployment_allows_more_gas_than_calls() {
        assert!(GasPolicy::DEPLOYMENT.gas_limit > GasPolicy::CALL.gas_limit);
        assert_eq!(GasPolicy::CALL.max_fee_per_gas, 30_000_000_000);
        assert_eq!(GasPolicy::CALL.max_priority_fee_per_gas, 2_000_000_000);
    }

    #[test]
    fn raw_envelope_is_typed() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        let signed = request(TxKind::Create).sign(&key).unwrap();
        let raw = signed.raw();
        assert_eq!(raw[0], 0x02);
        // list prefix follows the type byte
        assert!(raw[1] >= 0xc0);
        assert_eq!(signed.hash(), keccak256(&raw));
    }

    #[test]
    fn signing_is_deterministic() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        let a = request(TxKind::Create).sign(&key).unwrap();
        let b = request(TxKind::Create).sign(&key).unwrap();
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn destination_changes_signing_hash() {
        let to: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        assert_ne!(
            request(TxKind::Create).signing_hash(),
            request(TxKind::Call(to)).signing_hash()
        );
    }

    #[test]
    fn call_envelope_embeds_destination() {
        let key = OperatorKey::from_hex(KEY).unwrap();
        let to: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let raw = request(TxKind::Call(to)).sign(&key).unwrap().raw();
        let needle = [&[0x94u8][..], to.as_slice()].concat();
        assert!(raw.windows(needle.len()).any(|w| w == needle.as_slice()));
    }
}
