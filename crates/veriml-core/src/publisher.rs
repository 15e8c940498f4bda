//! Chain tail of a run: deploy the exported verifier, then register the
//! model with the registry contract.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;
use veriml_chain::{
    AbiValue, Address, ChainError, ContractAbi, ContractCompiler, Deployment, HttpTransport,
    SolcCompiler, TransactionSubmitter, B256, U256,
};

use crate::artifacts::{ArtifactRole, ArtifactSet};
use crate::config::{ChainConfig, RegistryConfig};
use crate::inference::{proof_bytes, scale_accuracy};

/// Arguments of one registry call.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub task_id: &'a str,
    pub model: &'a Path,
    pub proof: &'a Value,
    pub verifier: Address,
    pub accuracy: Option<f64>,
}

pub struct ChainPublisher {
    submitter: TransactionSubmitter,
    compiler: Arc<dyn ContractCompiler>,
    registry: Option<RegistryConfig>,
}

impl ChainPublisher {
    pub fn new(submitter: TransactionSubmitter, compiler: Arc<dyn ContractCompiler>) -> Self {
        Self {
            submitter,
            compiler,
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = Some(registry);
        self
    }

    /// HTTP transport, local `solc` and the configured registry.
    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainError> {
        let transport = HttpTransport::new(config.rpc_url.clone())?;
        let submitter = TransactionSubmitter::new(Arc::new(transport), config.operator_key.clone())
            .with_receipt_timeout(config.receipt_timeout)
            .with_poll_interval(config.poll_interval);
        let compiler = SolcCompiler::new(config.solc_binary.clone(), config.solc_version.clone());

        let mut publisher = Self::new(submitter, Arc::new(compiler));
        if let Some(registry) = &config.registry {
            publisher = publisher.with_registry(registry.clone());
        }
        Ok(publisher)
    }

    pub fn operator(&self) -> Address {
        self.submitter.operator()
    }

    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    /// Compile the exported verifier and deploy it with no constructor arguments.
    pub async fn deploy_verifier(&self, artifacts: &ArtifactSet) -> Result<Deployment, ChainError> {
        let source = artifacts.path(ArtifactRole::VerifierSol);
        let abi = artifacts.path(ArtifactRole::VerifierAbi);
        for (what, path) in [("verifier source", &source), ("verifier ABI", &abi)] {
            if !path.is_file() {
                return Err(ChainError::MissingFile {
                    what,
                    path: path.display().to_string(),
                });
            }
        }

        let bytecode = self.compiler.compile(&source).await?;
        let deployment = self.submitter.deploy(bytecode).await?;
        info!(
            verifier = %deployment.address.to_checksum(None),
            "verifier contract deployed"
        );
        Ok(deployment)
    }

    /// Call the registry function with
    /// `(task id, sha256(model), verifier, proof bytes, accuracy in millionths)`.
    /// The function is resolved before anything is sent.
    pub async fn register_model(&self, registration: Registration<'_>) -> Result<B256, ChainError> {
        let registry = self.registry.as_ref().ok_or_else(|| {
            ChainError::InvalidConfig("no registry contract configured".to_string())
        })?;
        let abi = ContractAbi::load(&registry.abi_path)?;
        let function = abi.function(&registry.function)?;

        let model = tokio::fs::read(registration.model).await?;
        let model_hash = Sha256::digest(&model).to_vec();
        let proof = proof_bytes(registration.proof).map_err(|e| ChainError::Abi(e.to_string()))?;
        let accuracy = U256::from(scale_accuracy(registration.accuracy));

        let calldata = function.encode_call(&[
            AbiValue::String(registration.task_id.to_string()),
            AbiValue::FixedBytes(model_hash),
            AbiValue::Address(registration.verifier),
            AbiValue::Bytes(proof),
            AbiValue::Uint(accuracy),
        ])?;

        let receipt = self.submitter.call(registry.address, calldata).await?;
        Ok(receipt.transaction_hash)
    }
}
