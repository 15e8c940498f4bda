//! Structured lifecycle events for pipeline runs.
//!
//! Every run is instrumented with a `veriml.task` span carrying the task ID, and
//! each lifecycle transition emits one `info!` line with an `event` field:
//! `pipeline.started`, `stage.started`, `stage.finished`, `stage.skipped`,
//! `stage.failed`, `pipeline.finished`. Chain submissions log their own
//! `chain.*` events from `veriml-chain`.

use tracing::{info, warn};

/// Span for one run. Instrument the run future with it so every event
/// emitted underneath carries the task ID.
///
/// ```ignore
/// coordinator.execute(..).instrument(task_span("iris-42")).await
/// ```
pub fn task_span(task_id: &str) -> tracing::Span {
    tracing::info_span!("veriml.task", task_id = %task_id)
}

pub fn emit_pipeline_started(task_id: &str, model_bytes: usize, chain_enabled: bool) {
    info!(
        event = "pipeline.started",
        task_id = %task_id,
        model_bytes = model_bytes,
        chain_enabled = chain_enabled,
    );
}

pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

pub fn emit_stage_finished(stage: &str, duration_ms: u64) {
    info!(event = "stage.finished", stage = %stage, duration_ms = duration_ms);
}

pub fn emit_stage_skipped(stage: &str, reason: &str) {
    info!(event = "stage.skipped", stage = %stage, reason = %reason);
}

pub fn emit_stage_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", stage = %stage, error = %error);
}

/// Final outcome of a run, written after the terminal status.
pub fn emit_pipeline_finished(task_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "pipeline.finished",
        task_id = %task_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// A status record could not be persisted. Never fatal on its own.
pub fn emit_status_write_failed(task_id: &str, step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "status.write_failed", task_id = %task_id, step = %step, error = %error);
}
