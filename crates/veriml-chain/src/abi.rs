//! Contract interface parsing and call encoding.
//!
//! Only the value kinds the registry call needs are supported: unsigned
//! integers, addresses, fixed and dynamic byte strings, and strings.

use std::path::Path;

use alloy_primitives::{keccak256, Address, U256};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ChainError, Result};

/// A value to be passed to a contract function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Address(Address),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
}

/// One declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// One function entry of a contract interface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
}

impl Function {
    /// Canonical signature, e.g. `registerModel(string,bytes32,address,bytes,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(|p| canonical_type(&p.ty)).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// First four bytes of the keccak hash of the signature.
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(ChainError::Abi(format!(
                "{} expects {} arguments, got {}",
                self.signature(),
                self.inputs.len(),
                args.len()
            )));
        }
        let tokens = self
            .inputs
            .iter()
            .zip(args)
            .map(|(param, value)| Token::coerce(&canonical_type(&param.ty), value))
            .collect::<Result<Vec<_>>>()?;

        let mut out = self.selector().to_vec();
        out.extend_from_slice(&encode_tokens(&tokens));
        Ok(out)
    }
}

/// A parsed contract interface.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    functions: Vec<Function>,
}

impl ContractAbi {
    /// Parse an ABI document: either a bare entry array or an artifact object
    /// carrying it under `abi`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let entries = match value {
            Value::Array(entries) => entries,
            Value::Object(map) => map
                .get("abi")
                .and_then(Value::as_array)
                .ok_or_else(|| ChainError::Abi("abi document has no entry array".to_string()))?,
            _ => return Err(ChainError::Abi("abi document must be an array".to_string())),
        };

        let mut functions = Vec::new();
        for entry in entries {
            if entry.get("type").and_then(Value::as_str) != Some("function") {
                continue;
            }
            let function: Function = serde_json::from_value(entry.clone())
                .map_err(|e| ChainError::Abi(format!("malformed function entry: {e}")))?;
            functions.push(function);
        }
        Ok(Self { functions })
    }

    /// Read and parse an ABI file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ChainError::MissingFile {
                what: "contract ABI",
                path: path.display().to_string(),
            });
        }
        let raw = std::fs::read(path)?;
        let value: Value = serde_json::from_slice(&raw)
            .map_err(|e| ChainError::Abi(format!("{}: {e}", path.display())))?;
        Self::from_json(&value)
    }

    /// Resolve a function by name. Overloaded names are rejected as ambiguous.
    pub fn function(&self, name: &str) -> Result<&Function> {
        let mut matches = self.functions.iter().filter(|f| f.name == name);
        let first = matches
            .next()
            .ok_or_else(|| ChainError::FunctionNotFound(name.to_string()))?;
        if matches.next().is_some() {
            return Err(ChainError::Abi(format!(
                "function '{name}' is overloaded; cannot pick one by name"
            )));
        }
        Ok(first)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
}

/// Normalise type aliases (`uint` is `uint256`, `int` is `int256`).
pub fn canonical_type(ty: &str) -> String {
    match ty {
        "uint" => "uint256".to_string(),
        "int" => "int256".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word([u8; 32]),
    Dynamic(Vec<u8>),
}

impl Token {
    fn coerce(ty: &str, value: &AbiValue) -> Result<Token> {
        let mismatch = || ChainError::Abi(format!("cannot encode {value:?} as {ty}"));

        match value {
            AbiValue::Uint(v) => {
                let bits = ty
                    .strip_prefix("uint")
                    .and_then(|b| b.parse::<usize>().ok())
                    .ok_or_else(mismatch)?;
                if bits == 0 || bits > 256 || bits % 8 != 0 || v.bit_len() > bits {
                    return Err(mismatch());
                }
                Ok(Token::Word(v.to_be_bytes::<32>()))
            }
            AbiValue::Address(address) if ty == "address" => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(address.as_slice());
                Ok(Token::Word(word))
            }
            AbiValue::String(s) if ty == "string" => Ok(Token::Dynamic(s.as_bytes().to_vec())),
            AbiValue::Bytes(data) | AbiValue::FixedBytes(data) => {
                if ty == "bytes" {
                    return Ok(Token::Dynamic(data.clone()));
                }
                let size = ty
                    .strip_prefix("bytes")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(mismatch)?;
                if size == 0 || size > 32 || data.len() > size {
                    return Err(mismatch());
                }
                let mut word = [0u8; 32];
                word[..data.len()].copy_from_slice(data);
                Ok(Token::Word(word))
            }
            _ => Err(mismatch()),
        }
    }
}

fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Word(word) => head.extend_from_slice(word),
            Token::Dynamic(data) => {
                head.extend_from_slice(&U256::from(head_len + tail.len()).to_be_bytes::<32>());
                tail.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
                tail.extend_from_slice(data);
                let padding = (32 - data.len() % 32) % 32;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}
