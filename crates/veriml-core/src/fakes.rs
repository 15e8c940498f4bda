//! In-memory proving toolkit for tests.
//!
//! `FakeToolkit` checks that each operation's inputs exist, writes small
//! deterministic outputs and records the order of calls. It can be told to
//! fail at, or stall in, a given stage.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::stage::Stage;
use crate::toolkit::{CalibrationTarget, ProvingToolkit, Result, ToolkitError, Visibility};

/// Little-endian hex of the field element 1.
pub const FAKE_INSTANCE_ONE: &str =
    "0100000000000000000000000000000000000000000000000000000000000000";

/// Proof bytes written by `FakeToolkit::prove`.
pub const FAKE_PROOF_HEX: &str = "0xdeadbeef";

#[derive(Debug)]
pub struct FakeToolkit {
    scores: Vec<f64>,
    verified: bool,
    proof: Option<serde_json::Value>,
    fail_at: Option<Stage>,
    stall: Option<(Stage, Duration)>,
    calls: Mutex<Vec<Stage>>,
}

impl Default for FakeToolkit {
    fn default() -> Self {
        Self {
            scores: vec![0.1, 0.8, 0.1],
            verified: true,
            proof: None,
            fail_at: None,
            stall: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescaled outputs written into the witness.
    pub fn with_scores(mut self, scores: Vec<f64>) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_verification(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Proof document written by `prove` in place of the default one.
    pub fn with_proof_payload(mut self, proof: serde_json::Value) -> Self {
        self.proof = Some(proof);
        self
    }

    pub fn failing_at(mut self, stage: Stage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Sleep for `delay` before completing `stage`.
    pub fn stalling_at(mut self, stage: Stage, delay: Duration) -> Self {
        self.stall = Some((stage, delay));
        self
    }

    /// Stages invoked so far, in order.
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, stage: Stage, inputs: &[&Path]) -> Result<()> {
        self.calls.lock().unwrap().push(stage);
        if let Some((stalled, delay)) = self.stall {
            if stalled == stage {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail_at == Some(stage) {
            return Err(ToolkitError::Failed {
                command: format!("fake {stage}"),
                code: Some(1),
                stderr: format!("injected failure in {stage}"),
            });
        }
        for input in inputs {
            if !input.is_file() {
                return Err(ToolkitError::Failed {
                    command: format!("fake {stage}"),
                    code: Some(2),
                    stderr: format!("missing input {}", input.display()),
                });
            }
        }
        Ok(())
    }
}

fn write_json(path: &Path, value: serde_json::Value) -> Result<()> {
    std::fs::write(path, serde_json::to_vec_pretty(&value).map_err(std::io::Error::from)?)?;
    Ok(())
}

#[async_trait]
impl ProvingToolkit for FakeToolkit {
    async fn gen_settings(
        &self,
        model: &Path,
        settings: &Path,
        visibility: &Visibility,
    ) -> Result<()> {
        self.enter(Stage::GenerateSettings, &[model]).await?;
        write_json(
            settings,
            json!({
                "run_args": {
                    "input_visibility": visibility.input,
                    "output_visibility": visibility.output,
                    "param_visibility": visibility.param,
                }
            }),
        )
    }

    async fn calibrate_settings(
        &self,
        data: &Path,
        model: &Path,
        settings: &Path,
        target: &CalibrationTarget,
    ) -> Result<()> {
        self.enter(Stage::CalibrateSettings, &[data, model, settings])
            .await?;
        write_json(
            settings,
            json!({
                "run_args": {"logrows": target.max_logrows, "scales": target.scales},
                "calibrated_for": target.target,
            }),
        )
    }

    async fn compile_circuit(&self, model: &Path, compiled: &Path, settings: &Path) -> Result<()> {
        self.enter(Stage::CompileCircuit, &[model, settings]).await?;
        std::fs::write(compiled, b"compiled-circuit")?;
        Ok(())
    }

    async fn get_srs(&self, settings: &Path, srs: &Path) -> Result<()> {
        self.enter(Stage::FetchSrs, &[settings]).await?;
        std::fs::write(srs, b"srs")?;
        Ok(())
    }

    async fn gen_witness(&self, input: &Path, compiled: &Path, witness: &Path) -> Result<()> {
        self.enter(Stage::GenerateWitness, &[input, compiled]).await?;
        let outputs: Vec<String> = self.scores.iter().map(|s| s.to_string()).collect();
        write_json(
            witness,
            json!({"pretty_elements": {"rescaled_outputs": [outputs]}}),
        )
    }

    async fn setup(&self, compiled: &Path, srs: &Path, vk: &Path, pk: &Path) -> Result<()> {
        self.enter(Stage::Setup, &[compiled, srs]).await?;
        std::fs::write(vk, b"vk")?;
        std::fs::write(pk, b"pk")?;
        Ok(())
    }

    async fn prove(
        &self,
        witness: &Path,
        compiled: &Path,
        pk: &Path,
        srs: &Path,
        proof: &Path,
    ) -> Result<()> {
        self.enter(Stage::Prove, &[witness, compiled, pk, srs]).await?;
        let payload = self.proof.clone().unwrap_or_else(|| {
            json!({"instances": [[FAKE_INSTANCE_ONE, "02"]], "proof": FAKE_PROOF_HEX})
        });
        write_json(proof, payload)
    }

    async fn verify(&self, proof: &Path, settings: &Path, vk: &Path, srs: &Path) -> Result<bool> {
        self.enter(Stage::Verify, &[proof, settings, vk, srs]).await?;
        Ok(self.verified)
    }

    async fn create_evm_verifier(
        &self,
        vk: &Path,
        srs: &Path,
        settings: &Path,
        sol: &Path,
        abi: &Path,
    ) -> Result<()> {
        self.enter(Stage::ExportVerifier, &[vk, srs, settings]).await?;
        std::fs::write(sol, "// SPDX-License-Identifier: MIT\ncontract Halo2Verifier {}\n")?;
        write_json(
            abi,
            json!([{
                "type": "function",
                "name": "verifyProof",
                "inputs": [
                    {"name": "proof", "type": "bytes"},
                    {"name": "instances", "type": "uint256[]"}
                ],
                "outputs": [{"name": "", "type": "bool"}],
                "stateMutability": "view"
            }]),
        )
    }
}
