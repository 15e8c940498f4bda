//! Runtime settings shared by the `veriml` CLI and the `verimld` daemon.
//!
//! Every flag can also come from the environment (or a `.env` file loaded by
//! the binary before parsing).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use veriml_chain::ChainError;

use crate::config::{
    ChainConfig, ChainSettings, PipelineConfig, StageTimeouts, DEFAULT_ARTIFACTS_ROOT,
    DEFAULT_CALIBRATION_SAMPLES, DEFAULT_REGISTRY_FUNCTION, DEFAULT_SOLC_VERSION,
    DEFAULT_VALIDATION_CSV,
};
use crate::coordinator::PipelineCoordinator;
use crate::dataset::CALIBRATION_SEED;
use crate::publisher::ChainPublisher;
use crate::toolkit::EzklCli;

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    /// Root directory for per-task artifacts
    #[arg(long, env = "ARTIFACTS_ROOT", default_value = DEFAULT_ARTIFACTS_ROOT)]
    pub artifacts_root: PathBuf,

    /// Validation CSV (features, then the label column)
    #[arg(long, env = "VALIDATION_CSV", default_value = DEFAULT_VALIDATION_CSV)]
    pub validation_csv: PathBuf,

    /// Rows sampled for calibration
    #[arg(long, env = "CALIBRATION_SAMPLES", default_value_t = DEFAULT_CALIBRATION_SAMPLES)]
    pub calibration_samples: usize,

    /// Proving toolkit binary
    #[arg(long, env = "EZKL_BINARY", default_value = "ezkl")]
    pub ezkl_binary: PathBuf,

    /// Limit for SRS retrieval in seconds (0 disables)
    #[arg(long, env = "SRS_TIMEOUT_SECS", default_value_t = 600)]
    pub srs_timeout_secs: u64,

    /// Limit for verifier export in seconds (0 disables)
    #[arg(long, env = "VERIFIER_EXPORT_TIMEOUT_SECS", default_value_t = 600)]
    pub verifier_export_timeout_secs: u64,

    /// JSON-RPC endpoint; chain stages are skipped without it
    #[arg(long, env = "WEB3_HTTP_PROVIDER")]
    pub rpc_url: Option<String>,

    /// Operator private key (hex); chain stages are skipped without it
    #[arg(long, env = "WEB3_OPERATOR_KEY", hide_env_values = true)]
    pub operator_key: Option<String>,

    /// Registry contract; registration is skipped without it
    #[arg(long, env = "GENERAL_CONTRACT_ADDRESS")]
    pub registry_address: Option<String>,

    /// Registry contract ABI (JSON)
    #[arg(long, env = "GENERAL_CONTRACT_ABI_PATH")]
    pub registry_abi_path: Option<PathBuf>,

    /// Registry function to call
    #[arg(long, env = "REGISTRY_FUNCTION_NAME", default_value = DEFAULT_REGISTRY_FUNCTION)]
    pub registry_function: String,

    /// Solidity compiler binary
    #[arg(long, env = "SOLC_BINARY", default_value = "solc")]
    pub solc_binary: PathBuf,

    /// Required solc version
    #[arg(long, env = "SOLC_VERSION", default_value = DEFAULT_SOLC_VERSION)]
    pub solc_version: String,

    /// Wait for a transaction receipt, in seconds
    #[arg(long, env = "RECEIPT_TIMEOUT_SECS", default_value_t = 300)]
    pub receipt_timeout_secs: u64,
}

fn limit(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl RuntimeArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            artifacts_root: self.artifacts_root.clone(),
            validation_csv: self.validation_csv.clone(),
            calibration_samples: self.calibration_samples,
            calibration_seed: CALIBRATION_SEED,
            input_seed: None,
            timeouts: StageTimeouts {
                srs: limit(self.srs_timeout_secs),
                verifier_export: limit(self.verifier_export_timeout_secs),
            },
        }
    }

    pub fn chain_config(&self) -> Result<Option<ChainConfig>, ChainError> {
        ChainConfig::from_parts(ChainSettings {
            rpc_url: self.rpc_url.clone(),
            operator_key: self.operator_key.clone(),
            registry_address: self.registry_address.clone(),
            registry_abi_path: self.registry_abi_path.clone(),
            registry_function: Some(self.registry_function.clone()),
            solc_binary: Some(self.solc_binary.clone()),
            solc_version: Some(self.solc_version.clone()),
            receipt_timeout: Some(Duration::from_secs(self.receipt_timeout_secs)),
        })
    }

    /// Coordinator over the `ezkl` binary, with the chain tail when configured.
    pub fn coordinator(&self) -> Result<PipelineCoordinator, ChainError> {
        let toolkit = Arc::new(EzklCli::new(self.ezkl_binary.clone()));
        let coordinator = PipelineCoordinator::new(self.pipeline_config(), toolkit);
        match self.chain_config()? {
            Some(chain) => {
                let publisher = ChainPublisher::from_config(&chain)?;
                tracing::info!(
                    operator = %publisher.operator().to_checksum(None),
                    registry = chain.registry.is_some(),
                    "chain publishing enabled"
                );
                Ok(coordinator.with_publisher(publisher))
            }
            None => {
                tracing::info!("chain publishing disabled");
                Ok(coordinator)
            }
        }
    }
}
