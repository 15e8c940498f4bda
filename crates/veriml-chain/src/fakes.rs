//! In-memory doubles for the transport and compiler seams (testing only).
//!
//! `ScriptedTransport` answers each JSON-RPC method from a queue of scripted
//! replies; the last reply for a method repeats once the queue is drained.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::compiler::ContractCompiler;
use crate::error::{ChainError, Result};
use crate::rpc::RpcTransport;

/// A scripted reply for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Result(Value),
    RpcError(String),
    Unavailable(String),
}

/// JSON-RPC transport that replays scripted replies and records every call.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for `method`.
    pub fn reply(self, method: &str, result: Value) -> Self {
        self.push(method, Reply::Result(result))
    }

    /// Queue an arbitrary reply for `method`.
    pub fn push(self, method: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// A transport scripted for a healthy dev chain: chain id 31337, nonce 0,
    /// every broadcast accepted and immediately mined with success.
    pub fn healthy_chain(contract_address: &str, tx_hash: &str) -> Self {
        Self::new()
            .reply("eth_chainId", json!("0x7a69"))
            .reply("eth_getTransactionCount", json!("0x0"))
            .reply("eth_sendRawTransaction", json!(tx_hash))
            .reply(
                "eth_getTransactionReceipt",
                json!({
                    "status": "0x1",
                    "contractAddress": contract_address,
                    "transactionHash": tx_hash,
                }),
            )
    }

    /// Every request made so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests made for `method`.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(method).ok_or_else(|| ChainError::Rpc {
                method: method.to_string(),
                message: "method not scripted".to_string(),
            })?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match reply {
            Some(Reply::Result(value)) => Ok(value),
            Some(Reply::RpcError(message)) => Err(ChainError::Rpc {
                method: method.to_string(),
                message,
            }),
            Some(Reply::Unavailable(message)) => Err(ChainError::ChainUnavailable(message)),
            None => Err(ChainError::Rpc {
                method: method.to_string(),
                message: "method not scripted".to_string(),
            }),
        }
    }
}

/// Compiler that returns fixed bytecode for any existing source file.
#[derive(Debug, Clone)]
pub struct StaticCompiler {
    bytecode: Vec<u8>,
}

impl StaticCompiler {
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }
}

#[async_trait]
impl ContractCompiler for StaticCompiler {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>> {
        if !source.is_file() {
            return Err(ChainError::MissingFile {
                what: "verifier source",
                path: source.display().to_string(),
            });
        }
        Ok(self.bytecode.clone())
    }
}
