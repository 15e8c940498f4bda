//! Top-level driver for one task run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use veriml_chain::hash_hex;

use crate::artifacts::{validate_task_id, ArtifactError, ArtifactRole, ArtifactSet, ArtifactStore};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::{ProvingOutcome, StageExecutor};
use crate::inference::{accuracy, Prediction};
use crate::locks::TaskLocks;
use crate::obs;
use crate::publisher::{ChainPublisher, Registration};
use crate::stage::Stage;
use crate::status::{StatusLedger, StatusRecord, STEP_COMPLETE, STEP_FAILED};
use crate::toolkit::ProvingToolkit;

/// Summary of a run, returned to the caller and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub task_id: String,
    pub artifacts: BTreeMap<String, PathBuf>,
    pub pub_inputs: Vec<String>,
    pub pub_inputs_pretty: String,
    pub prediction: Prediction,
    pub verification: bool,
    pub accuracy: Option<f64>,
    pub verifier_contract: Option<String>,
    pub verifier_deploy_tx: Option<String>,
    pub tx_hash: Option<String>,
}

impl PipelineResult {
    fn assemble(artifacts: &ArtifactSet, proved: &ProvingOutcome) -> Self {
        Self {
            task_id: artifacts.task_id().to_string(),
            artifacts: artifacts.to_map(),
            pub_inputs: proved.public_inputs.list.clone(),
            pub_inputs_pretty: proved.public_inputs.pretty.clone(),
            prediction: proved.prediction.clone(),
            accuracy: accuracy(proved.prediction.predicted_index, proved.target_index),
            verification: proved.verified,
            verifier_contract: None,
            verifier_deploy_tx: None,
            tx_hash: None,
        }
    }
}

pub struct PipelineCoordinator {
    store: ArtifactStore,
    ledger: StatusLedger,
    executor: StageExecutor,
    publisher: Option<ChainPublisher>,
    locks: TaskLocks,
}

impl PipelineCoordinator {
    pub fn new(config: PipelineConfig, toolkit: Arc<dyn ProvingToolkit>) -> Self {
        let store = ArtifactStore::new(config.artifacts_root.clone());
        let ledger = StatusLedger::new(store.clone());
        let executor = StageExecutor::new(toolkit, ledger.clone(), Arc::new(config));
        Self {
            store,
            ledger,
            executor,
            publisher: None,
            locks: TaskLocks::new(),
        }
    }

    /// Enable the chain tail. Without a publisher both chain stages are skipped.
    pub fn with_publisher(mut self, publisher: ChainPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn chain_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn status(&self, task_id: &str) -> Result<StatusRecord, ArtifactError> {
        self.ledger.read(task_id)
    }

    pub fn fetch(&self, task_id: &str, name: &str) -> Result<Vec<u8>, ArtifactError> {
        self.store.fetch(task_id, name)
    }

    /// Run every stage for `task_id` over the uploaded model bytes.
    ///
    /// Once the run has started, the last status record is `complete` or
    /// `failed` when this returns.
    pub async fn run(&self, task_id: &str, model: &[u8]) -> Result<PipelineResult, PipelineError> {
        validate_task_id(task_id).map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        if model.is_empty() {
            return Err(PipelineError::InvalidInput(
                "model upload is empty".to_string(),
            ));
        }
        let _guard = self
            .locks
            .try_acquire(task_id)
            .ok_or_else(|| PipelineError::TaskBusy(task_id.to_string()))?;

        self.run_locked(task_id, model)
            .instrument(obs::task_span(task_id))
            .await
    }

    async fn run_locked(&self, task_id: &str, model: &[u8]) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        obs::emit_pipeline_started(task_id, model.len(), self.chain_enabled());

        let artifacts = self.store.resolve(task_id)?;
        let outcome = match self.store.purge(&artifacts) {
            Ok(()) => self.execute(&artifacts, model).await,
            Err(e) => Err(e.into()),
        };

        match &outcome {
            Ok(_) => self
                .executor
                .mark(&artifacts, STEP_COMPLETE, "Pipeline finished", None),
            Err(err) => {
                self.executor
                    .mark(&artifacts, STEP_FAILED, "Pipeline error", Some(&err.to_string()))
            }
        }
        obs::emit_pipeline_finished(
            task_id,
            start.elapsed().as_millis() as u64,
            outcome.is_ok(),
        );
        outcome
    }

    async fn execute(
        &self,
        artifacts: &ArtifactSet,
        model: &[u8],
    ) -> Result<PipelineResult, PipelineError> {
        let proved = self.executor.prove(artifacts, model).await?;
        let mut result = PipelineResult::assemble(artifacts, &proved);
        self.publish(artifacts, &proved, &mut result)
            .await
            .map_err(|e| e.with_partial(&result))?;
        Ok(result)
    }

    /// Stages 13-14. Skips are recorded distinctly from failures.
    async fn publish(
        &self,
        artifacts: &ArtifactSet,
        proved: &ProvingOutcome,
        result: &mut PipelineResult,
    ) -> Result<(), PipelineError> {
        let Some(publisher) = &self.publisher else {
            let reason = "chain endpoint or operator key not configured";
            self.executor.skip(
                artifacts,
                Stage::DeployVerifier,
                &format!("Skipping verifier deployment ({reason})"),
            );
            self.executor.skip(
                artifacts,
                Stage::RegisterModel,
                &format!("Skipping on-chain registration ({reason})"),
            );
            return Ok(());
        };

        let deployment = self
            .executor
            .stage(
                artifacts,
                Stage::DeployVerifier,
                publisher.deploy_verifier(artifacts),
            )
            .await?;
        result.verifier_contract = Some(deployment.address.to_checksum(None));
        result.verifier_deploy_tx = Some(hash_hex(&deployment.transaction_hash));

        if !publisher.has_registry() {
            self.executor.skip(
                artifacts,
                Stage::RegisterModel,
                "Skipping on-chain registration (registry address not configured)",
            );
            return Ok(());
        }

        let model_path = artifacts.path(ArtifactRole::Model);
        let registration = Registration {
            task_id: artifacts.task_id(),
            model: &model_path,
            proof: &proved.proof,
            verifier: deployment.address,
            accuracy: result.accuracy,
        };
        let tx_hash = self
            .executor
            .stage(
                artifacts,
                Stage::RegisterModel,
                publisher.register_model(registration),
            )
            .await?;
        result.tx_hash = Some(hash_hex(&tx_hash));
        Ok(())
    }
}
