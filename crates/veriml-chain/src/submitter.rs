//! Build → sign → broadcast → confirm.
//!
//! Every submission re-queries the sender's confirmed transaction count for
//! its nonce; there is no client-side nonce cache. A receipt with a failure
//! status is terminal for that submission and nothing is resubmitted.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use tracing::{info, warn};

use crate::error::{ChainError, Result};
use crate::rpc::{hash_hex, EthRpc, RpcTransport, TransactionReceipt};
use crate::signer::OperatorKey;
use crate::tx::{GasPolicy, TransactionRequest, TxKind};

/// Default wait for a receipt before giving up.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default delay between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Result of a successful contract deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub transaction_hash: B256,
}

/// Submits operator transactions to one chain endpoint.
pub struct TransactionSubmitter {
    transport: Arc<dyn RpcTransport>,
    key: OperatorKey,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(transport: Arc<dyn RpcTransport>, key: OperatorKey) -> Self {
        Self {
            transport,
            key,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sender address.
    pub fn operator(&self) -> Address {
        self.key.address()
    }

    /// Deploy init code with no constructor arguments.
    pub async fn deploy(&self, bytecode: Vec<u8>) -> Result<Deployment> {
        if bytecode.is_empty() {
            return Err(ChainError::Compiler("verifier bytecode is empty".to_string()));
        }
        let receipt = self
            .submit(TxKind::Create, bytecode, GasPolicy::DEPLOYMENT)
            .await?;
        let address = receipt.contract_address.ok_or_else(|| ChainError::Rpc {
            method: "eth_getTransactionReceipt".to_string(),
            message: "deployment receipt carries no contract address".to_string(),
        })?;
        Ok(Deployment {
            address,
            transaction_hash: receipt.transaction_hash,
        })
    }

    /// Call a function on an existing contract with pre-encoded calldata.
    pub async fn call(&self, to: Address, calldata: Vec<u8>) -> Result<TransactionReceipt> {
        self.submit(TxKind::Call(to), calldata, GasPolicy::CALL).await
    }

    /// Submit one transaction and wait for its receipt.
    pub async fn submit(
        &self,
        kind: TxKind,
        data: Vec<u8>,
        gas: GasPolicy,
    ) -> Result<TransactionReceipt> {
        let rpc = EthRpc::new(self.transport.as_ref());
        let from = self.key.address();

        let nonce = rpc.transaction_count(from).await?;
        let chain_id = rpc.chain_id().await?;
        let request = TransactionRequest {
            from,
            kind,
            data,
            nonce,
            gas,
            chain_id,
        };

        let signed = request.sign(&self.key)?;
        let local_hash = signed.hash();
        let tx_hash = rpc.send_raw_transaction(&signed.raw()).await?;
        if tx_hash != local_hash {
            warn!(
                local = %hash_hex(&local_hash),
                remote = %hash_hex(&tx_hash),
                "endpoint returned a different transaction hash"
            );
        }
        info!(
            event = "chain.tx_submitted",
            tx_hash = %hash_hex(&tx_hash),
            nonce,
            chain_id,
            create = matches!(kind, TxKind::Create),
        );

        let receipt = self.wait_for_receipt(&rpc, &tx_hash).await?;
        info!(
            event = "chain.tx_confirmed",
            tx_hash = %hash_hex(&tx_hash),
            success = receipt.success,
        );
        if !receipt.success {
            return Err(ChainError::TransactionReverted {
                tx_hash: hash_hex(&tx_hash),
            });
        }
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, rpc: &EthRpc<'_>, tx_hash: &B256) -> Result<TransactionReceipt> {
        let poll = async {
            loop {
                if let Some(receipt) = rpc.transaction_receipt(tx_hash).await? {
                    return Ok::<_, ChainError>(receipt);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.receipt_timeout, poll)
            .await
            .map_err(|_| ChainError::Timeout {
                tx_hash: hash_hex(tx_hash),
                after: self.receipt_timeout,
            })?
    }
}
