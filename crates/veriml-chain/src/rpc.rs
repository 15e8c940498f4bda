//! JSON-RPC transport and the handful of typed calls the submitter needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ChainError, Result};

/// Transport for JSON-RPC requests.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Perform one request and return its `result` member.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// HTTP JSON-RPC transport.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("veriml-chain/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChainError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::ChainUnavailable(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::ChainUnavailable(format!(
                "{} answered HTTP {status}",
                self.url
            )));
        }

        let payload: Value = response.json().await.map_err(|e| ChainError::Rpc {
            method: method.to_string(),
            message: format!("invalid response body: {e}"),
        })?;
        into_result(method, payload)
    }
}

/// Unwrap a JSON-RPC response envelope.
pub fn into_result(method: &str, mut payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ChainError::Rpc {
            method: method.to_string(),
            message,
        });
    }
    match payload.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ChainError::Rpc {
            method: method.to_string(),
            message: "response has neither result nor error".to_string(),
        }),
    }
}

/// Confirmed outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub success: bool,
    pub contract_address: Option<Address>,
    pub transaction_hash: B256,
}

impl TransactionReceipt {
    fn from_json(method: &str, value: &Value) -> Result<Self> {
        let malformed = |what: &str| ChainError::Rpc {
            method: method.to_string(),
            message: format!("malformed receipt: {what}"),
        };

        let status = value
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing status"))?;
        let success = parse_quantity(status).map_err(|_| malformed("status"))? == 1;

        let contract_address = match value.get("contractAddress") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_str()
                    .and_then(|s| s.parse::<Address>().ok())
                    .ok_or_else(|| malformed("contractAddress"))?,
            ),
        };

        let transaction_hash = value
            .get("transactionHash")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<B256>().ok())
            .ok_or_else(|| malformed("transactionHash"))?;

        Ok(Self {
            success,
            contract_address,
            transaction_hash,
        })
    }
}

/// Typed helpers over a transport.
pub struct EthRpc<'a> {
    transport: &'a dyn RpcTransport,
}

impl<'a> EthRpc<'a> {
    pub fn new(transport: &'a dyn RpcTransport) -> Self {
        Self { transport }
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let value = self.transport.request("eth_chainId", json!([])).await?;
        quantity("eth_chainId", &value)
    }

    /// Confirmed transaction count of `address`, used as the next nonce.
    pub async fn transaction_count(&self, address: Address) -> Result<u64> {
        let method = "eth_getTransactionCount";
        let value = self
            .transport
            .request(method, json!([address.to_checksum(None), "latest"]))
            .await?;
        quantity(method, &value)
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let method = "eth_sendRawTransaction";
        let value = self
            .transport
            .request(method, json!([format!("0x{}", hex::encode(raw))]))
            .await?;
        value
            .as_str()
            .and_then(|s| s.parse::<B256>().ok())
            .ok_or_else(|| ChainError::Rpc {
                method: method.to_string(),
                message: format!("expected transaction hash, got {value}"),
            })
    }

    /// `None` while the transaction is still pending.
    pub async fn transaction_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>> {
        let method = "eth_getTransactionReceipt";
        let value = self
            .transport
            .request(method, json!([hash_hex(hash)]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        TransactionReceipt::from_json(method, &value).map(Some)
    }
}

/// `0x`-prefixed lowercase hex rendering of a 32-byte hash.
pub fn hash_hex(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash.as_slice()))
}

fn quantity(method: &str, value: &Value) -> Result<u64> {
    value
        .as_str()
        .and_then(|s| parse_quantity(s).ok())
        .ok_or_else(|| ChainError::Rpc {
            method: method.to_string(),
            message: format!("expected hex quantity, got {value}"),
        })
}

fn parse_quantity(s: &str) -> std::result::Result<u64, std::num::ParseIntError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_is_surfaced() {
        let err = into_result(
            "eth_chainId",
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "boom"}}),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::Rpc { ref message, .. } if message == "boom"));
    }

    #[test]
    fn envelope_result_is_extracted() {
        let v = into_result("eth_chainId", json!({"jsonrpc": "2.0", "id": 1, "result": "0x7a69"}))
            .unwrap();
        assert_eq!(v, json!("0x7a69"));
        assert_eq!(quantity("eth_chainId", &v).unwrap(), 31337);
    }

    #[test]
    fn null_result_is_not_an_error() {
        let v = into_result("eth_getTransactionReceipt", json!({"id": 1, "result": null})).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn parses_deployment_receipt() {
        let receipt = TransactionReceipt::from_json(
            "eth_getTransactionReceipt",
            &json!({
                "status": "0x1",
                "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "transactionHash": format!("0x{}", "ab".repeat(32)),
            }),
        )
        .unwrap();
        assert!(receipt.success);
        assert_eq!(
            receipt.contract_address.unwrap().to_checksum(None),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert_eq!(hash_hex(&receipt.transaction_hash), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn failed_status_and_missing_address() {
        let receipt = TransactionReceipt::from_json(
            "eth_getTransactionReceipt",
            &json!({
                "status": "0x0",
                "contractAddress": null,
                "transactionHash": format!("0x{}", "01".repeat(32)),
            }),
        )
        .unwrap();
        assert!(!receipt.success);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn malformed_receipt_is_rejected() {
        let err = TransactionReceipt::from_json("m", &json!({"status": "0x1"})).unwrap_err();
        assert!(matches!(err, ChainError::Rpc { .. }));
    }
}
