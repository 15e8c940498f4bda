//! Verifier contract compilation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ChainError, Result};

/// Turns contract source into deployable bytecode.
#[async_trait]
pub trait ContractCompiler: Send + Sync {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>>;
}

/// Drives a local `solc` binary through its standard-JSON interface.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    binary: PathBuf,
    version: String,
    optimizer_runs: u32,
}

impl SolcCompiler {
    pub fn new(binary: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            version: version.into(),
            optimizer_runs: 200,
        }
    }

    /// Fail unless the binary reports the configured version.
    async fn check_version(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                ChainError::Compiler(format!("cannot run {}: {e}", self.binary.display()))
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || !reports_version(&stdout, &self.version) {
            return Err(ChainError::Compiler(format!(
                "{} does not report version {} (got: {})",
                self.binary.display(),
                self.version,
                stdout.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractCompiler for SolcCompiler {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>> {
        if !source.is_file() {
            return Err(ChainError::MissingFile {
                what: "verifier source",
                path: source.display().to_string(),
            });
        }
        self.check_version().await?;

        let source_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Verifier.sol".to_string());
        let content = tokio::fs::read_to_string(source).await?;
        let input = standard_json_input(&source_name, &content, self.optimizer_runs);

        info!(source = %source.display(), version = %self.version, "compiling verifier contract");
        let mut child = Command::new(&self.binary)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ChainError::Compiler(format!("cannot run {}: {e}", self.binary.display()))
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.to_string().as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ChainError::Compiler(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let compiled: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ChainError::Compiler(format!("unreadable solc output: {e}")))?;
        let bytecode = extract_bytecode(&compiled, &source_name)?;
        debug!(bytes = bytecode.len(), "verifier bytecode ready");
        Ok(bytecode)
    }
}

fn reports_version(version_output: &str, version: &str) -> bool {
    version_output
        .lines()
        .filter_map(|line| line.strip_prefix("Version: "))
        .any(|v| v == version || v.starts_with(&format!("{version}+")))
}

/// Standard-JSON request: optimizer enabled, bytecode output only.
pub fn standard_json_input(source_name: &str, content: &str, optimizer_runs: u32) -> Value {
    json!({
        "language": "Solidity",
        "sources": { source_name: { "content": content } },
        "settings": {
            "optimizer": { "enabled": true, "runs": optimizer_runs },
            "outputSelection": { "*": { "*": ["evm.bytecode"] } },
        },
    })
}

/// Pull the first non-empty contract bytecode for `source_name` out of solc's
/// standard-JSON output.
pub fn extract_bytecode(compiled: &Value, source_name: &str) -> Result<Vec<u8>> {
    if let Some(errors) = compiled.get("errors").and_then(Value::as_array) {
        let fatal: Vec<String> = errors
            .iter()
            .filter(|e| e.get("severity").and_then(Value::as_str) == Some("error"))
            .map(|e| {
                e.get("formattedMessage")
                    .or_else(|| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown compiler error")
                    .trim()
                    .to_string()
            })
            .collect();
        if !fatal.is_empty() {
            return Err(ChainError::Compiler(fatal.join("\n")));
        }
    }

    let contracts = compiled
        .get("contracts")
        .and_then(|c| c.get(source_name))
        .and_then(Value::as_object)
        .ok_or_else(|| ChainError::Compiler("compilation output missing contract data".to_string()))?;

    let object = contracts
        .values()
        .filter_map(|c| c.pointer("/evm/bytecode/object").and_then(Value::as_str))
        .find(|object| !object.is_empty())
        .ok_or_else(|| ChainError::Compiler("verifier bytecode is empty".to_string()))?;

    hex::decode(object.strip_prefix("0x").unwrap_or(object))
        .map_err(|e| ChainError::Compiler(format!("bytecode is not plain hex (unlinked library?): {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_matching() {
        let out = "solc, the solidity compiler commandline interface\nVersion: 0.8.20+commit.a1b79de6.Linux.g++\n";
        assert!(reports_version(out, "0.8.20"));
        assert!(!reports_version(out, "0.8.2"));
        assert!(!reports_version(out, "0.8.19"));
    }

    #[test]
    fn input_enables_optimizer() {
        let input = standard_json_input("Verifier.sol", "contract V {}", 200);
        assert_eq!(input["settings"]["optimizer"]["enabled"], json!(true));
        assert_eq!(input["settings"]["optimizer"]["runs"], json!(200));
        assert_eq!(input["sources"]["Verifier.sol"]["content"], json!("contract V {}"));
    }

    #[test]
    fn extracts_first_nonempty_bytecode() {
        let output = json!({
            "contracts": {
                "Verifier.sol": {
                    "Abstract": {"evm": {"bytecode": {"object": ""}}},
                    "Halo2Verifier": {"evm": {"bytecode": {"object": "6080604052"}}}
                }
            }
        });
        assert_eq!(
            extract_bytecode(&output, "Verifier.sol").unwrap(),
            vec![0x60, 0x80, 0x60, 0x40, 0x52]
        );
    }

    #[test]
    fn compiler_errors_are_reported() {
        let output = json!({
            "errors": [
                {"severity": "warning", "formattedMessage": "unused variable"},
                {"severity": "error", "formattedMessage": "ParserError: expected ';'"}
            ]
        });
        let err = extract_bytecode(&output, "Verifier.sol").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ParserError"));
        assert!(!msg.contains("unused variable"));
    }

    #[test]
    fn empty_bytecode_is_rejected() {
        let output = json!({
            "contracts": {"Verifier.sol": {"V": {"evm": {"bytecode": {"object": ""}}}}}
        });
        assert!(matches!(
            extract_bytecode(&output, "Verifier.sol"),
            Err(ChainError::Compiler(_))
        ));
    }

    #[tokio::test]
    async fn missing_source_is_reported_before_running_solc() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = SolcCompiler::new("/nonexistent/solc", "0.8.20");
        let err = compiler
            .compile(&dir.path().join("Verifier.sol"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::MissingFile { .. }));
    }
}
