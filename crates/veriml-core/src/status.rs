//! Per-task status record, replaced wholesale on every transition.
//!
//! The record lives in the task directory as `status.json`, so a status
//! query works from any process, including one started after a crash.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactError, ArtifactRole, ArtifactSet, ArtifactStore, STAGING_PREFIX};

/// Terminal step of a successful run.
pub const STEP_COMPLETE: &str = "complete";
/// Terminal step of a failed run.
pub const STEP_FAILED: &str = "failed";

/// The latest observable state of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub step: String,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(step: &str, message: &str, error: Option<&str>) -> Self {
        Self {
            step: step.to_string(),
            message: message.to_string(),
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step == STEP_COMPLETE || self.step == STEP_FAILED
    }
}

/// Reads and replaces status records under an artifact store.
#[derive(Debug, Clone)]
pub struct StatusLedger {
    store: ArtifactStore,
}

impl StatusLedger {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Replace the task's status with a fresh snapshot.
    ///
    /// The record is written to a staging file in the task directory and
    /// renamed over `status.json`, so readers see either the old or the new
    /// record.
    pub fn record(
        &self,
        artifacts: &ArtifactSet,
        step: &str,
        message: &str,
        error: Option<&str>,
    ) -> std::io::Result<StatusRecord> {
        let record = StatusRecord::new(step, message, error);
        let json = serde_json::to_vec_pretty(&record)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(artifacts.base())?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(artifacts.path(ArtifactRole::Status))
            .map_err(|e| e.error)?;
        Ok(record)
    }

    /// The latest record for `task_id`.
    pub fn read(&self, task_id: &str) -> Result<StatusRecord, ArtifactError> {
        let bytes = self
            .store
            .fetch(task_id, ArtifactRole::Status.file_name())?;
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Io(e.into()))
    }
}
