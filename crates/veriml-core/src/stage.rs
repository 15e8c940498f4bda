//! The fixed, ordered list of pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StoreModel,
    PrepareInput,
    GenerateSettings,
    BuildCalibrationSet,
    CalibrateSettings,
    CompileCircuit,
    FetchSrs,
    GenerateWitness,
    Setup,
    Prove,
    Verify,
    ExportVerifier,
    DeployVerifier,
    RegisterModel,
}

impl Stage {
    pub const ALL: [Stage; 14] = [
        Stage::StoreModel,
        Stage::PrepareInput,
        Stage::GenerateSettings,
        Stage::BuildCalibrationSet,
        Stage::CalibrateSettings,
        Stage::CompileCircuit,
        Stage::FetchSrs,
        Stage::GenerateWitness,
        Stage::Setup,
        Stage::Prove,
        Stage::Verify,
        Stage::ExportVerifier,
        Stage::DeployVerifier,
        Stage::RegisterModel,
    ];

    /// Status step name.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::StoreModel => "store_model",
            Stage::PrepareInput => "prepare_input",
            Stage::GenerateSettings => "generate_settings",
            Stage::BuildCalibrationSet => "build_calibration_set",
            Stage::CalibrateSettings => "calibrate_settings",
            Stage::CompileCircuit => "compile_circuit",
            Stage::FetchSrs => "fetch_srs",
            Stage::GenerateWitness => "generate_witness",
            Stage::Setup => "setup",
            Stage::Prove => "prove",
            Stage::Verify => "verify",
            Stage::ExportVerifier => "export_verifier",
            Stage::DeployVerifier => "deploy_verifier",
            Stage::RegisterModel => "register_model",
        }
    }

    /// Message recorded when the stage begins.
    pub fn start_message(&self) -> &'static str {
        match self {
            Stage::StoreModel => "Storing model",
            Stage::PrepareInput => "Preparing validation input",
            Stage::GenerateSettings => "Generating settings",
            Stage::BuildCalibrationSet => "Building calibration set",
            Stage::CalibrateSettings => "Calibrating settings",
            Stage::CompileCircuit => "Compiling circuit",
            Stage::FetchSrs => "Fetching SRS",
            Stage::GenerateWitness => "Generating witness",
            Stage::Setup => "Running setup",
            Stage::Prove => "Generating proof",
            Stage::Verify => "Verifying proof",
            Stage::ExportVerifier => "Exporting EVM verifier",
            Stage::DeployVerifier => "Deploying verifier contract",
            Stage::RegisterModel => "Registering model on-chain",
        }
    }

    /// Message recorded when the stage succeeds.
    pub fn done_message(&self) -> &'static str {
        match self {
            Stage::StoreModel => "Model stored",
            Stage::PrepareInput => "Validation input ready",
            Stage::GenerateSettings => "Settings generated",
            Stage::BuildCalibrationSet => "Calibration set ready",
            Stage::CalibrateSettings => "Settings calibrated",
            Stage::CompileCircuit => "Circuit compiled",
            Stage::FetchSrs => "SRS ready",
            Stage::GenerateWitness => "Witness generated",
            Stage::Setup => "Keys generated",
            Stage::Prove => "Proof generated",
            Stage::Verify => "Proof checked",
            Stage::ExportVerifier => "EVM verifier exported",
            Stage::DeployVerifier => "Verifier contract deployed",
            Stage::RegisterModel => "Model registered on-chain",
        }
    }

    /// Stages 13 and 14 depend on chain configuration.
    pub(crate) fn is_chain_stage(&self) -> bool {
        matches!(self, Stage::DeployVerifier | Stage::RegisterModel)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
