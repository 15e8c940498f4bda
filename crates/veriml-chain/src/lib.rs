//! veriml-chain - on-chain submission for veriml
//!
//! Builds EIP-1559 transactions, signs them locally with the operator key,
//! broadcasts them over JSON-RPC and blocks until a receipt is available.
//! Used for two submissions per task:
//! - deploying the generated verifier contract
//! - registering the model with a pre-deployed registry contract

pub mod abi;
pub mod compiler;
pub mod error;
pub mod fakes;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod submitter;
pub mod tx;

pub use abi::{AbiValue, ContractAbi, Function};
pub use compiler::{ContractCompiler, SolcCompiler};
pub use error::{ChainError, Result};
pub use rpc::{hash_hex, EthRpc, HttpTransport, RpcTransport, TransactionReceipt};
pub use signer::{OperatorKey, RecoverableSignature};
pub use submitter::{
    Deployment, TransactionSubmitter, DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT,
};
pub use tx::{GasPolicy, SignedTransaction, TransactionRequest, TxKind};

pub use alloy_primitives::{Address, B256, U256};
