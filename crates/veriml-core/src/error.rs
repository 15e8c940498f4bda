//! Pipeline error taxonomy.

use std::time::Duration;

use thiserror::Error;
use veriml_chain::ChainError;

use crate::artifacts::ArtifactError;
use crate::coordinator::PipelineResult;
use crate::dataset::DatasetError;
use crate::inference::PayloadError;
use crate::stage::Stage;
use crate::toolkit::ToolkitError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before the run starts; no status is written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another run holds this task ID; no status is written.
    #[error("task {0} already has a run in progress")]
    TaskBusy(String),

    /// Validation dataset missing or malformed.
    #[error("data error: {0}")]
    Data(String),

    #[error("stage {stage} failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("stage {stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    /// Chain tail failed. `partial` carries whatever was computed before it.
    #[error("chain error: {source}")]
    Chain {
        #[source]
        source: ChainError,
        partial: Option<Box<PipelineResult>>,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Attach the result computed so far to a chain failure.
    pub fn with_partial(self, result: &PipelineResult) -> Self {
        match self {
            PipelineError::Chain { source, .. } => PipelineError::Chain {
                source,
                partial: Some(Box::new(result.clone())),
            },
            other => other,
        }
    }

    pub fn partial(&self) -> Option<&PipelineResult> {
        match self {
            PipelineError::Chain { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }

    /// Raised after the run started, so the status ledger records it.
    pub fn is_recorded(&self) -> bool {
        !matches!(
            self,
            PipelineError::InvalidInput(_) | PipelineError::TaskBusy(_)
        )
    }
}

impl From<ChainError> for PipelineError {
    fn from(source: ChainError) -> Self {
        PipelineError::Chain {
            source,
            partial: None,
        }
    }
}

impl From<DatasetError> for PipelineError {
    fn from(err: DatasetError) -> Self {
        PipelineError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Io(err.into())
    }
}

/// Errors a stage body may raise, given the stage they happened in.
pub trait StageFault {
    fn at(self, stage: Stage) -> PipelineError;
}

impl StageFault for PipelineError {
    fn at(self, _stage: Stage) -> PipelineError {
        self
    }
}

impl StageFault for ToolkitError {
    fn at(self, stage: Stage) -> PipelineError {
        PipelineError::Stage {
            stage,
            message: self.to_string(),
        }
    }
}

impl StageFault for PayloadError {
    fn at(self, stage: Stage) -> PipelineError {
        PipelineError::Stage {
            stage,
            message: self.to_string(),
        }
    }
}

impl StageFault for ChainError {
    fn at(self, _stage: Stage) -> PipelineError {
        self.into()
    }
}

impl StageFault for DatasetError {
    fn at(self, _stage: Stage) -> PipelineError {
        self.into()
    }
}

impl StageFault for std::io::Error {
    fn at(self, _stage: Stage) -> PipelineError {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolkit_failures_name_the_stage() {
        let err = ToolkitError::Failed {
            command: "ezkl prove".to_string(),
            code: Some(1),
            stderr: "bad witness".to_string(),
        }
        .at(Stage::Prove);
        let msg = err.to_string();
        assert!(msg.starts_with("stage prove failed"), "{msg}");
        assert!(msg.contains("bad witness"));
    }

    #[test]
    fn input_errors_are_not_recorded() {
        assert!(!PipelineError::InvalidInput("x".into()).is_recorded());
        assert!(!PipelineError::TaskBusy("t".into()).is_recorded());
        assert!(PipelineError::Data("x".into()).is_recorded());
    }

    #[test]
    fn only_chain_errors_carry_partials() {
        let err = PipelineError::from(ChainError::Signing("nope".into()));
        assert!(err.partial().is_none());
        assert!(matches!(err, PipelineError::Chain { .. }));
    }
}
