//! Routes exercised in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use veriml_core::fakes::FakeToolkit;
use veriml_core::{PipelineConfig, PipelineCoordinator, Stage};
use verimld::{router, AppState, DEFAULT_MAX_UPLOAD_BYTES};

const BOUNDARY: &str = "veriml-test-boundary";

struct Daemon {
    _dir: tempfile::TempDir,
    app: Router,
}

fn daemon(toolkit: FakeToolkit) -> Daemon {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("validation.csv"),
        "f1,f2,label\n0.1,0.2,0\n0.3,0.4,1\n0.5,0.6,1\n",
    )
    .unwrap();
    let config = PipelineConfig {
        artifacts_root: dir.path().join("artifacts"),
        validation_csv: dir.path().join("validation.csv"),
        calibration_samples: 2,
        input_seed: Some(3),
        ..PipelineConfig::default()
    };
    let coordinator = PipelineCoordinator::new(config, Arc::new(toolkit));
    Daemon {
        app: router(AppState::new(coordinator), DEFAULT_MAX_UPLOAD_BYTES),
        _dir: dir,
    }
}

fn multipart(task_id: Option<&str>, model: Option<&[u8]>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(id) = task_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"task_id\"\r\n\r\n{id}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = model {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"model\"; filename=\"network.onnx\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/models")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_chain_state() {
    let d = daemon(FakeToolkit::new());
    let (status, body) = send_json(&d.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chain_enabled"], false);
}

#[tokio::test]
async fn upload_runs_the_pipeline_and_returns_created() {
    let d = daemon(FakeToolkit::new());
    let (status, body) = send_json(&d.app, multipart(Some("iris"), Some(b"onnx"))).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["task_id"], "iris");
    assert_eq!(body["verification"], true);
    assert_eq!(body["prediction"]["predicted_index"], 1);
    assert!(body["verifier_contract"].is_null());
    assert!(body["tx_hash"].is_null());

    let (status, record) = send_json(&d.app, get("/models/iris/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["step"], "complete");
    assert_eq!(record["message"], "Pipeline finished");
    assert!(record["error"].is_null());
}

#[tokio::test]
async fn missing_fields_are_rejected_before_any_run() {
    let d = daemon(FakeToolkit::new());

    let (status, body) = send_json(&d.app, multipart(None, Some(b"onnx"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "task_id is required");

    let (status, body) = send_json(&d.app, multipart(Some("iris"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "model (ONNX) file is required");

    let (status, _) = send_json(&d.app, get("/models/iris/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsafe_task_id_is_a_bad_request() {
    let d = daemon(FakeToolkit::new());
    let (status, body) = send_json(&d.app, multipart(Some("../escape"), Some(b"onnx"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid input"));
}

#[tokio::test]
async fn stage_failure_is_a_server_error_and_recorded() {
    let d = daemon(FakeToolkit::new().failing_at(Stage::Prove));
    let (status, body) = send_json(&d.app, multipart(Some("iris"), Some(b"onnx"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("prove"));
    assert!(body.get("result").is_none());

    let (_, record) = send_json(&d.app, get("/models/iris/status")).await;
    assert_eq!(record["step"], "failed");
    assert_eq!(record["message"], "Pipeline error");
    assert!(record["error"].as_str().unwrap().contains("prove"));
}

#[tokio::test]
async fn concurrent_upload_for_the_same_task_conflicts() {
    let d = daemon(FakeToolkit::new().stalling_at(Stage::FetchSrs, Duration::from_millis(200)));

    let first = send_json(&d.app, multipart(Some("iris"), Some(b"onnx")));
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        send_json(&d.app, multipart(Some("iris"), Some(b"onnx"))).await
    };
    let ((first_status, _), (second_status, body)) = tokio::join!(first, second);

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("in progress"));
}

#[tokio::test]
async fn artifacts_are_served_as_octet_streams() {
    let d = daemon(FakeToolkit::new());
    let (status, _) = send_json(&d.app, multipart(Some("iris"), Some(b"onnx-bytes"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let response = d
        .app
        .clone()
        .oneshot(get("/models/iris/artifacts/network.onnx"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"onnx-bytes");

    let (status, proof) = send(&d.app, get("/models/iris/artifacts/test.pf")).await;
    assert_eq!(status, StatusCode::OK);
    let proof: Value = serde_json::from_slice(&proof).unwrap();
    assert!(proof["instances"].is_array());
}

#[tokio::test]
async fn unknown_or_escaping_artifacts_are_not_found() {
    let d = daemon(FakeToolkit::new());
    send_json(&d.app, multipart(Some("iris"), Some(b"onnx"))).await;

    for uri in [
        "/models/iris/artifacts/missing.bin",
        "/models/iris/artifacts/..%2F..%2Fvalidation.csv",
        "/models/other/artifacts/network.onnx",
    ] {
        let (status, body) = send_json(&d.app, get(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "artifact not found");
    }
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        artifacts_root: dir.path().join("artifacts"),
        ..PipelineConfig::default()
    };
    let coordinator = PipelineCoordinator::new(config, Arc::new(FakeToolkit::new()));
    let app = router(AppState::new(coordinator), 64);

    let (status, _) = send(&app, multipart(Some("iris"), Some(&[0u8; 1024]))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
