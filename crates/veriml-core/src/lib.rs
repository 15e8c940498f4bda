//! veriml-core - task pipeline for verifiable model inference
//!
//! Drives one run per task ID: store the uploaded model, produce and verify a
//! proof of inference with the proving toolkit, then optionally deploy the
//! generated verifier contract and register the model on-chain.
//!
//! - [`ArtifactStore`] derives every per-task path from the task ID
//! - [`StatusLedger`] persists the latest stage of each task
//! - [`StageExecutor`] sequences the proving stages
//! - [`PipelineCoordinator`] owns a run end to end

pub mod args;
pub mod artifacts;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod inference;
pub mod locks;
pub mod obs;
pub mod publisher;
pub mod stage;
pub mod status;
pub mod telemetry;
pub mod toolkit;

pub use args::RuntimeArgs;
pub use artifacts::{ArtifactError, ArtifactRole, ArtifactSet, ArtifactStore};
pub use config::{ChainConfig, ChainSettings, PipelineConfig, RegistryConfig, StageTimeouts};
pub use coordinator::{PipelineCoordinator, PipelineResult};
pub use dataset::{DatasetError, ValidationDataset};
pub use error::PipelineError;
pub use executor::{ProvingOutcome, StageExecutor};
pub use inference::{Prediction, PublicInputs};
pub use locks::TaskLocks;
pub use publisher::{ChainPublisher, Registration};
pub use stage::Stage;
pub use status::{StatusLedger, StatusRecord, STEP_COMPLETE, STEP_FAILED};
pub use telemetry::init_tracing;
pub use toolkit::{EzklCli, ProvingToolkit, ToolkitError};
