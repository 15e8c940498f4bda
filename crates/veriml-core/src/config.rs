//! Configuration objects, built once at startup and shared read-only.

use std::path::PathBuf;
use std::time::Duration;

use veriml_chain::{
    Address, ChainError, OperatorKey, DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT,
};

use crate::dataset::CALIBRATION_SEED;

pub const DEFAULT_ARTIFACTS_ROOT: &str = "./artifacts";
pub const DEFAULT_VALIDATION_CSV: &str = "iris_test_split.csv";
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 5;
pub const DEFAULT_REGISTRY_FUNCTION: &str = "registerModel";
pub const DEFAULT_SOLC_VERSION: &str = "0.8.20";
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bounds for the stages that wait on network I/O. `None` waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub srs: Option<Duration>,
    pub verifier_export: Option<Duration>,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            srs: Some(DEFAULT_STAGE_TIMEOUT),
            verifier_export: Some(DEFAULT_STAGE_TIMEOUT),
        }
    }
}

/// Settings for the proving part of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub artifacts_root: PathBuf,
    pub validation_csv: PathBuf,
    pub calibration_samples: usize,
    pub calibration_seed: u64,
    /// Seed for picking the proof input row; `None` draws from OS entropy.
    pub input_seed: Option<u64>,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from(DEFAULT_ARTIFACTS_ROOT),
            validation_csv: PathBuf::from(DEFAULT_VALIDATION_CSV),
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            calibration_seed: CALIBRATION_SEED,
            input_seed: None,
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Pre-deployed registry contract.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub address: Address,
    pub abi_path: PathBuf,
    pub function: String,
}

/// Everything needed to deploy verifiers and register models.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub operator_key: OperatorKey,
    pub registry: Option<RegistryConfig>,
    pub solc_binary: PathBuf,
    pub solc_version: String,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

/// Raw chain settings as read from the environment or command line.
#[derive(Debug, Clone, Default)]
pub struct ChainSettings {
    pub rpc_url: Option<String>,
    pub operator_key: Option<String>,
    pub registry_address: Option<String>,
    pub registry_abi_path: Option<PathBuf>,
    pub registry_function: Option<String>,
    pub solc_binary: Option<PathBuf>,
    pub solc_version: Option<String>,
    pub receipt_timeout: Option<Duration>,
}

impl ChainConfig {
    /// `Ok(None)` when the endpoint or the key is absent, which disables both
    /// chain stages. Values that are present but unusable are errors.
    pub fn from_parts(settings: ChainSettings) -> Result<Option<Self>, ChainError> {
        let (rpc_url, key) = match (non_empty(settings.rpc_url), non_empty(settings.operator_key)) {
            (Some(url), Some(key)) => (url, key),
            _ => return Ok(None),
        };
        let operator_key = OperatorKey::from_hex(&key)?;

        let registry = match non_empty(settings.registry_address) {
            None => None,
            Some(address) => {
                let address = address.parse::<Address>().map_err(|e| {
                    ChainError::InvalidConfig(format!("registry address {address:?}: {e}"))
                })?;
                let abi_path = settings.registry_abi_path.ok_or_else(|| {
                    ChainError::InvalidConfig(
                        "registry address is set but the registry ABI path is not".to_string(),
                    )
                })?;
                Some(RegistryConfig {
                    address,
                    abi_path,
                    function: non_empty(settings.registry_function)
                        .unwrap_or_else(|| DEFAULT_REGISTRY_FUNCTION.to_string()),
                })
            }
        };

        Ok(Some(Self {
            rpc_url,
            operator_key,
            registry,
            solc_binary: settings.solc_binary.unwrap_or_else(|| PathBuf::from("solc")),
            solc_version: non_empty(settings.solc_version)
                .unwrap_or_else(|| DEFAULT_SOLC_VERSION.to_string()),
            receipt_timeout: settings.receipt_timeout.unwrap_or(DEFAULT_RECEIPT_TIMEOUT),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn with_chain() -> ChainSettings {
        ChainSettings {
            rpc_url: Some("http://127.0.0.1:8545".to_string()),
            operator_key: Some(KEY.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_or_key_absent_disables_chain() {
        assert!(ChainConfig::from_parts(ChainSettings::default()).unwrap().is_none());

        let no_key = ChainSettings {
            operator_key: Some("  ".to_string()),
            ..with_chain()
        };
        assert!(ChainConfig::from_parts(no_key).unwrap().is_none());
    }

    #[test]
    fn registry_is_optional() {
        let config = ChainConfig::from_parts(with_chain()).unwrap().unwrap();
        assert!(config.registry.is_none());
        assert_eq!(config.solc_version, DEFAULT_SOLC_VERSION);
        assert_eq!(config.receipt_timeout, DEFAULT_RECEIPT_TIMEOUT);
    }

    #[test]
    fn registry_defaults_function_name() {
        let settings = ChainSettings {
            registry_address: Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string()),
            registry_abi_path: Some(PathBuf::from("abi.json")),
            ..with_chain()
        };
        let registry = ChainConfig::from_parts(settings)
            .unwrap()
            .unwrap()
            .registry
            .unwrap();
        assert_eq!(registry.function, DEFAULT_REGISTRY_FUNCTION);
    }

    #[test]
    fn unusable_values_are_errors() {
        let bad_key = ChainSettings {
            operator_key: Some("0x1234".to_string()),
            ..with_chain()
        };
        assert!(matches!(
            ChainConfig::from_parts(bad_key),
            Err(ChainError::Signing(_))
        ));

        let bad_address = ChainSettings {
            registry_address: Some("not-an-address".to_string()),
            registry_abi_path: Some(PathBuf::from("abi.json")),
            ..with_chain()
        };
        assert!(matches!(
            ChainConfig::from_parts(bad_address),
            Err(ChainError::InvalidConfig(_))
        ));

        let no_abi = ChainSettings {
            registry_address: Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string()),
            ..with_chain()
        };
        assert!(matches!(
            ChainConfig::from_parts(no_abi),
            Err(ChainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.calibration_samples, 5);
        assert_eq!(config.calibration_seed, 42);
        assert_eq!(config.timeouts.srs, Some(Duration::from_secs(600)));
    }
}
