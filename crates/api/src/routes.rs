use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use pipeline::RiskPipeline;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use survey::OcrEngine;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::analyze;
use crate::metrics::{Metrics, MetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: RiskPipeline,
    pub ocr: Arc<dyn OcrEngine>,
    pub upload_dir: Arc<PathBuf>,
    pub metrics: Arc<Metrics>,
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/analyze", post(analyze::analyze).fallback(unknown_url))
        .route("/health", get(health_check).fallback(unknown_url))
        .route("/metrics", get(get_metrics).fallback(unknown_url))
        .fallback(unknown_url)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "inference_configured": state.pipeline.gateway().is_configured(),
    }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn unknown_url() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown url" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header::CONTENT_TYPE};
    use inference::InferenceGateway;
    use inference::testing::{FakeInferenceServer, FakeReply};
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Mutex;
    use survey::{OcrError, OcrOutput};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "survey-test-boundary";

    /// Records each image it is handed and whether the file existed then.
    struct FakeOcr {
        output: Option<OcrOutput>,
        seen: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl FakeOcr {
        fn reading(text: &str) -> Self {
            Self {
                output: Some(OcrOutput {
                    text: text.to_string(),
                    confidence: 90.0,
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                output: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<(PathBuf, bool)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn recognize(&self, image: &Path) -> Result<OcrOutput, OcrError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.to_path_buf(), image.exists()));
            self.output.clone().ok_or(OcrError::Failed {
                code: Some(1),
                stderr: "unreadable image".to_string(),
            })
        }
    }

    struct Harness {
        app: Router,
        server: FakeInferenceServer,
        ocr: Arc<FakeOcr>,
        uploads: TempDir,
    }

    impl Harness {
        async fn start(replies: Vec<FakeReply>, ocr: FakeOcr) -> Self {
            let server = FakeInferenceServer::start(replies).await;
            let config = server.gateway_config();
            Self::with_config(server, config, ocr, 1024 * 1024)
        }

        fn with_config(
            server: FakeInferenceServer,
            config: inference::GatewayConfig,
            ocr: FakeOcr,
            max_upload_bytes: usize,
        ) -> Self {
            let uploads = tempfile::tempdir().unwrap();
            let ocr = Arc::new(ocr);
            let state = AppState {
                pipeline: RiskPipeline::new(InferenceGateway::new(config).unwrap()),
                ocr: ocr.clone(),
                upload_dir: Arc::new(uploads.path().to_path_buf()),
                metrics: Metrics::new(),
            };

            Self {
                app: app(state, max_upload_bytes),
                server,
                ocr,
                uploads,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.uploads.path()).unwrap().count()
        }
    }

    fn stage_replies() -> Vec<FakeReply> {
        vec![
            FakeReply::json(json!({
                "risk_factors": ["Daily smoking", "Sedentary lifestyle"],
                "confidence": 0.8
            })),
            FakeReply::json(json!({
                "risk_level": "High",
                "score": 72,
                "rationale": ["Daily smoking", "Sedentary lifestyle"]
            })),
            FakeReply::json(json!({
                "recommendations": [
                    {"factor": "Daily smoking", "recommendation": "Join a cessation programme."},
                    {"factor": "Sedentary lifestyle", "recommendation": "Walk 30 minutes a day."}
                ]
            })),
        ]
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Builds a multipart body from (name, filename, data) parts.
    fn multipart_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: image/png\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                    );
                }
            }
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_json_survey_produces_report() {
        let harness = Harness::start(stage_replies(), FakeOcr::broken()).await;

        let (status, body) = harness
            .send(json_request(
                r#"{"age": 58, "smoker": "yes", "exercise": "none", "diet": "fast food"}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["riskLevel"], "high");
        assert_eq!(body["score"], 72);
        assert_eq!(body["factors"], json!(["Daily smoking", "Sedentary lifestyle"]));
        assert_eq!(
            body["recommendations"]["Daily smoking"],
            "Join a cessation programme."
        );
        assert_eq!(harness.server.call_count(), 3);
        assert!(harness.ocr.seen().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_json_survey_is_refused() {
        let harness = Harness::start(stage_replies(), FakeOcr::broken()).await;

        let (status, body) = harness.send(json_request(r#"{"age": 30}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "incomplete_profile");
        assert_eq!(body["missingFields"], json!(["smoker", "exercise", "diet"]));
        assert!(body["reason"].is_string());
        assert_eq!(harness.server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_body_is_missing_input() {
        let harness = Harness::start(vec![], FakeOcr::broken()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/analyze")
            .body(Body::empty())
            .unwrap();
        let (status, body) = harness.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("surveyImage"));
        assert_eq!(harness.server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let harness = Harness::start(vec![], FakeOcr::broken()).await;

        let (status, body) = harness.send(json_request("{\"age\": ")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(harness.server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_survey_image_is_recognised_and_removed() {
        let harness = Harness::start(
            stage_replies(),
            FakeOcr::reading("Age: 52\nSmoker: yes\nExercise - rarely\nDiet = mixed"),
        )
        .await;

        let (status, body) = harness
            .send(multipart_request(&[(
                "surveyImage",
                Some("survey.png"),
                "fake png bytes",
            )]))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["riskLevel"], "high");

        let seen = harness.ocr.seen();
        assert_eq!(seen.len(), 1);
        let (path, existed) = &seen[0];
        assert!(existed);
        assert!(path.starts_with(harness.uploads.path()));
        assert!(!path.exists());
        assert_eq!(harness.staged_files(), 0);

        let calls = harness.server.calls();
        assert!(calls[0].input.contains("age: 52"));
        assert!(calls[0].input.contains("exercise: rarely"));
    }

    #[tokio::test]
    async fn test_unreadable_image_fails_ocr() {
        let harness = Harness::start(stage_replies(), FakeOcr::reading("   \n ")).await;

        let (status, body) = harness
            .send(multipart_request(&[(
                "surveyImage",
                Some("blank.png"),
                "blank",
            )]))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "OCR failed to extract data from the image.");
        assert_eq!(harness.server.call_count(), 0);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_ocr_engine_error_fails_ocr() {
        let harness = Harness::start(stage_replies(), FakeOcr::broken()).await;

        let (status, body) = harness
            .send(multipart_request(&[(
                "surveyImage",
                Some("survey.png"),
                "data",
            )]))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "OCR failed to extract data from the image.");
        assert_eq!(harness.ocr.seen().len(), 1);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_stage_failure_removes_upload() {
        let harness = Harness::start(
            vec![FakeReply::json(json!({"risk_factors": [], "confidence": 0.3}))],
            FakeOcr::reading("age: 40\nsmoker: no\nexercise: daily\ndiet: balanced"),
        )
        .await;

        let (status, body) = harness
            .send(multipart_request(&[(
                "surveyImage",
                Some("survey.png"),
                "data",
            )]))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI analysis did not return any risk factors.");
        assert_eq!(harness.server.call_count(), 1);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_multipart_text_answers() {
        let harness = Harness::start(stage_replies(), FakeOcr::broken()).await;

        let (status, body) = harness
            .send(multipart_request(&[
                ("Age", None, "61"),
                ("smoker", None, "no"),
                ("exercise", None, "weekly"),
            ]))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(harness.ocr.seen().is_empty());

        let input = &harness.server.calls()[0].input;
        assert!(input.contains("age: 61"));
        assert!(input.contains("smoker: false"));
    }

    #[tokio::test]
    async fn test_multipart_without_fields_is_missing_input() {
        let harness = Harness::start(vec![], FakeOcr::broken()).await;

        let (status, body) = harness
            .send(multipart_request(&[("surveyImage", Some("empty.png"), "")]))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("surveyImage"));
        assert!(harness.ocr.seen().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential_is_server_error() {
        let server = FakeInferenceServer::start(stage_replies()).await;
        let mut config = server.gateway_config();
        config.api_key = None;
        let harness = Harness::with_config(server, config, FakeOcr::broken(), 1024 * 1024);

        let (status, body) = harness
            .send(json_request(
                r#"{"age": 44, "smoker": false, "exercise": "daily", "diet": "vegan"}"#,
            ))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "The analysis service is not configured.");
        assert_eq!(harness.server.call_count(), 0);

        let (_, health) = harness.send(get_request("/health")).await;
        assert_eq!(health["inference_configured"], false);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = FakeInferenceServer::start(vec![]).await;
        let config = server.gateway_config();
        let harness = Harness::with_config(server, config, FakeOcr::broken(), 16);

        let request = json_request(r#"{"age": 44, "smoker": false, "exercise": "daily"}"#);
        let response = harness.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(harness.server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let server = FakeInferenceServer::start(vec![]).await;
        let config = server.gateway_config();
        let harness = Harness::with_config(server, config, FakeOcr::reading("age: 40"), 64);

        let image = "x".repeat(4096);
        let request = multipart_request(&[("surveyImage", Some("large.png"), image.as_str())]);
        let response = harness.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(harness.ocr.seen().is_empty());
        assert_eq!(harness.staged_files(), 0);
        assert_eq!(harness.server.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_routes_and_methods() {
        let harness = Harness::start(vec![], FakeOcr::broken()).await;

        for request in [
            get_request("/nowhere"),
            get_request("/analyze"),
            Request::builder()
                .method("DELETE")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        ] {
            let (status, body) = harness.send(request).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, json!({"error": "unknown url"}));
        }
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let harness = Harness::start(stage_replies(), FakeOcr::broken()).await;

        let (status, health) = harness.send(get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health, json!({"status": "ok", "inference_configured": true}));

        harness
            .send(json_request(
                r#"{"age": 58, "smoker": true, "exercise": "none", "diet": "poor"}"#,
            ))
            .await;
        harness.send(json_request(r#"{"diet": "poor"}"#)).await;
        harness.send(json_request("[]")).await;

        let (status, metrics) = harness.send(get_request("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["total_requests"], 3);
        assert_eq!(metrics["reports_produced"], 1);
        assert_eq!(metrics["incomplete_profiles"], 1);
        assert_eq!(metrics["failed_requests"], 1);
    }
}
