//! Request handlers. Every error body is `{"error": ...}`.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use veriml_core::{ArtifactError, PipelineError};

use crate::AppState;

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Fields of the upload form. Unknown fields are ignored.
#[derive(Default)]
struct Upload {
    task_id: Option<String>,
    model: Option<Bytes>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, Response> {
    let mut upload = Upload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(error(e.status(), e.body_text())),
        };
        let name = field.name().map(str::to_owned);
        let read = match name.as_deref() {
            Some("task_id") => field.text().await.map(|t| {
                upload.task_id = Some(t.trim().to_string());
            }),
            Some("model") => field.bytes().await.map(|b| {
                upload.model = Some(b);
            }),
            _ => continue,
        };
        read.map_err(|e| error(e.status(), e.body_text()))?;
    }
    Ok(upload)
}

/// `POST /models`
pub async fn upload_model(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };
    let Some(task_id) = upload.task_id.filter(|t| !t.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "task_id is required");
    };
    let Some(model) = upload.model else {
        return error(StatusCode::BAD_REQUEST, "model (ONNX) file is required");
    };

    // The run outlives a dropped connection.
    let coordinator = state.coordinator.clone();
    let run = tokio::spawn(async move { coordinator.run(&task_id, &model).await });

    match run.await {
        Ok(Ok(result)) => (StatusCode::CREATED, Json(result)).into_response(),
        Ok(Err(err)) => pipeline_failure(&err),
        Err(join) => {
            tracing::error!(error = %join, "pipeline task aborted");
            error(StatusCode::INTERNAL_SERVER_ERROR, join.to_string())
        }
    }
}

fn pipeline_failure(err: &PipelineError) -> Response {
    let status = match err {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::TaskBusy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut body = json!({ "error": err.to_string() });
    if let Some(partial) = err.partial() {
        body["result"] = json!(partial);
    }
    (status, Json(body)).into_response()
}

/// `GET /models/:task_id/status`
pub async fn task_status(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.coordinator.status(&task_id) {
        Ok(record) => Json(record).into_response(),
        Err(ArtifactError::NotFound { .. } | ArtifactError::InvalidTaskId(_)) => {
            error(StatusCode::NOT_FOUND, "unknown task id")
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "cannot read status");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `GET /models/:task_id/artifacts/:artifact`
pub async fn task_artifact(
    State(state): State<AppState>,
    Path((task_id, artifact)): Path<(String, String)>,
) -> Response {
    match state.coordinator.fetch(&task_id, &artifact) {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(ArtifactError::Io(e)) => {
            tracing::warn!(task_id = %task_id, artifact = %artifact, error = %e, "cannot read artifact");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(_) => error(StatusCode::NOT_FOUND, "artifact not found"),
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "chain_enabled": state.coordinator.chain_enabled(),
        })),
    )
}
