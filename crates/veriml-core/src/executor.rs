//! Stage sequencing for the proving part of a run.
//!
//! `StageExecutor::stage` is the single place that records status around a
//! stage, applies its timeout and logs its outcome. `prove` drives stages
//! 1-12 in order and stops at the first failure.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use crate::artifacts::{ArtifactRole, ArtifactSet};
use crate::config::PipelineConfig;
use crate::dataset::{input_document, ValidationDataset};
use crate::error::{PipelineError, StageFault};
use crate::inference::{extract_prediction, format_public_inputs, Prediction, PublicInputs};
use crate::obs;
use crate::stage::Stage;
use crate::status::StatusLedger;
use crate::toolkit::{CalibrationTarget, ProvingToolkit, Visibility};

/// What the proving stages hand to the chain tail and the result.
#[derive(Debug, Clone)]
pub struct ProvingOutcome {
    pub proof: Value,
    pub public_inputs: PublicInputs,
    pub prediction: Prediction,
    pub verified: bool,
    pub target_index: Option<usize>,
}

pub struct StageExecutor {
    toolkit: Arc<dyn ProvingToolkit>,
    ledger: StatusLedger,
    config: Arc<PipelineConfig>,
}

impl StageExecutor {
    pub fn new(
        toolkit: Arc<dyn ProvingToolkit>,
        ledger: StatusLedger,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            toolkit,
            ledger,
            config,
        }
    }

    /// Write a status record. A failed write is logged, never raised.
    pub fn mark(&self, artifacts: &ArtifactSet, step: &str, message: &str, error: Option<&str>) {
        if let Err(e) = self.ledger.record(artifacts, step, message, error) {
            obs::emit_status_write_failed(artifacts.task_id(), step, &e);
        }
    }

    /// Record a chain stage as deliberately not run.
    pub fn skip(&self, artifacts: &ArtifactSet, stage: Stage, reason: &str) {
        debug_assert!(stage.is_chain_stage(), "{stage} cannot be skipped");
        self.mark(artifacts, stage.name(), reason, None);
        obs::emit_stage_skipped(stage.name(), reason);
    }

    fn timeout_for(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::FetchSrs => self.config.timeouts.srs,
            Stage::ExportVerifier => self.config.timeouts.verifier_export,
            _ => None,
        }
    }

    /// Run one stage: status before, work under the stage's timeout, status after.
    pub async fn stage<T, E, F>(
        &self,
        artifacts: &ArtifactSet,
        stage: Stage,
        work: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, E>>,
        E: StageFault,
    {
        self.mark(artifacts, stage.name(), stage.start_message(), None);
        obs::emit_stage_started(stage.name());
        let start = Instant::now();

        let outcome = match self.timeout_for(stage) {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result.map_err(|e| e.at(stage)),
                Err(_) => Err(PipelineError::Timeout {
                    stage,
                    after: limit,
                }),
            },
            None => work.await.map_err(|e| e.at(stage)),
        };

        match &outcome {
            Ok(_) => {
                self.mark(artifacts, stage.name(), stage.done_message(), None);
                obs::emit_stage_finished(stage.name(), start.elapsed().as_millis() as u64);
            }
            Err(e) => obs::emit_stage_failed(stage.name(), e),
        }
        outcome
    }

    /// Stages 1-12: from storing the model to exporting the verifier.
    pub async fn prove(
        &self,
        artifacts: &ArtifactSet,
        model: &[u8],
    ) -> Result<ProvingOutcome, PipelineError> {
        let path = |role| artifacts.path(role);
        let toolkit = self.toolkit.as_ref();

        self.stage(
            artifacts,
            Stage::StoreModel,
            tokio::fs::write(path(ArtifactRole::Model), model),
        )
        .await?;

        let (dataset, target_index) = self
            .stage(artifacts, Stage::PrepareInput, async {
                let dataset = ValidationDataset::load(&self.config.validation_csv)?;
                let labels = dataset.label_index();
                let mut rng = match self.config.input_seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let sample = dataset.sample(&mut rng);
                let target_index = labels.get(&sample.label).copied();
                write_json(&path(ArtifactRole::Input), &sample.input_document())?;
                Ok::<_, PipelineError>((dataset, target_index))
            })
            .await?;

        self.stage(
            artifacts,
            Stage::GenerateSettings,
            toolkit.gen_settings(
                &path(ArtifactRole::Model),
                &path(ArtifactRole::Settings),
                &Visibility::default(),
            ),
        )
        .await?;

        self.stage(artifacts, Stage::BuildCalibrationSet, async {
            let rows =
                dataset.calibration_rows(self.config.calibration_samples, self.config.calibration_seed);
            write_json(&path(ArtifactRole::Calibration), &input_document(&rows))
        })
        .await?;

        self.stage(
            artifacts,
            Stage::CalibrateSettings,
            toolkit.calibrate_settings(
                &path(ArtifactRole::Calibration),
                &path(ArtifactRole::Model),
                &path(ArtifactRole::Settings),
                &CalibrationTarget::default(),
            ),
        )
        .await?;

        self.stage(
            artifacts,
            Stage::CompileCircuit,
            toolkit.compile_circuit(
                &path(ArtifactRole::Model),
                &path(ArtifactRole::Compiled),
                &path(ArtifactRole::Settings),
            ),
        )
        .await?;

        self.stage(
            artifacts,
            Stage::FetchSrs,
            toolkit.get_srs(&path(ArtifactRole::Settings), &path(ArtifactRole::Srs)),
        )
        .await?;

        let prediction = self
            .stage(artifacts, Stage::GenerateWitness, async {
                toolkit
                    .gen_witness(
                        &path(ArtifactRole::Input),
                        &path(ArtifactRole::Compiled),
                        &path(ArtifactRole::Witness),
                    )
                    .await
                    .map_err(|e| e.at(Stage::GenerateWitness))?;
                let witness = read_json(&path(ArtifactRole::Witness))?;
                extract_prediction(&witness).map_err(|e| e.at(Stage::GenerateWitness))
            })
            .await?;

        self.stage(
            artifacts,
            Stage::Setup,
            toolkit.setup(
                &path(ArtifactRole::Compiled),
                &path(ArtifactRole::Srs),
                &path(ArtifactRole::Vk),
                &path(ArtifactRole::Pk),
            ),
        )
        .await?;

        let (proof, public_inputs) = self
            .stage(artifacts, Stage::Prove, async {
                toolkit
                    .prove(
                        &path(ArtifactRole::Witness),
                        &path(ArtifactRole::Compiled),
                        &path(ArtifactRole::Pk),
                        &path(ArtifactRole::Srs),
                        &path(ArtifactRole::Proof),
                    )
                    .await
                    .map_err(|e| e.at(Stage::Prove))?;
                let proof = read_json(&path(ArtifactRole::Proof))?;
                let public_inputs =
                    format_public_inputs(&proof).map_err(|e| e.at(Stage::Prove))?;
                Ok::<_, PipelineError>((proof, public_inputs))
            })
            .await?;

        let verified = self
            .stage(
                artifacts,
                Stage::Verify,
                toolkit.verify(
                    &path(ArtifactRole::Proof),
                    &path(ArtifactRole::Settings),
                    &path(ArtifactRole::Vk),
                    &path(ArtifactRole::Srs),
                ),
            )
            .await?;

        self.stage(
            artifacts,
            Stage::ExportVerifier,
            toolkit.create_evm_verifier(
                &path(ArtifactRole::Vk),
                &path(ArtifactRole::Srs),
                &path(ArtifactRole::Settings),
                &path(ArtifactRole::VerifierSol),
                &path(ArtifactRole::VerifierAbi),
            ),
        )
        .await?;

        Ok(ProvingOutcome {
            proof,
            public_inputs,
            prediction,
            verified,
            target_index,
        })
    }
}

pub(crate) fn write_json(path: &Path, value: &Value) -> Result<(), PipelineError> {
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

pub(crate) fn read_json(path: &Path) -> Result<Value, PipelineError> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}
