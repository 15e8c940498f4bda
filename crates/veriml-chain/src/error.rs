//! Error types for on-chain submission.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building, signing, broadcasting or confirming a transaction.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The JSON-RPC endpoint could not be reached.
    #[error("chain endpoint unavailable: {0}")]
    ChainUnavailable(String),

    /// The endpoint answered with a JSON-RPC error object or a malformed payload.
    #[error("rpc error in {method}: {message}")]
    Rpc { method: String, message: String },

    /// The operator key is unusable or signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// The transaction was mined with a failure status.
    #[error("transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    /// The registry interface does not expose the requested function.
    #[error("function '{0}' not found in registry ABI")]
    FunctionNotFound(String),

    /// ABI parsing or argument encoding failed.
    #[error("abi error: {0}")]
    Abi(String),

    /// The verifier contract could not be compiled.
    #[error("compiler error: {0}")]
    Compiler(String),

    /// A required source, ABI or bytecode file is missing.
    #[error("{what} not found at {path}")]
    MissingFile { what: &'static str, path: String },

    /// Chain configuration is present but unusable.
    #[error("invalid chain configuration: {0}")]
    InvalidConfig(String),

    /// No receipt was observed within the configured wait.
    #[error("timed out after {after:?} waiting for receipt of {tx_hash}")]
    Timeout { tx_hash: String, after: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
