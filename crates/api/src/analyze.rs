use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use pipeline::{FinalReport, PipelineError, Submission};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use survey::Answers;
use tempfile::TempPath;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics::{Outcome, TimedOperation};
use crate::routes::AppState;

/// Multipart field carrying the photographed survey form.
pub const IMAGE_FIELD: &str = "surveyImage";

/// `POST /analyze`: accepts a survey image (multipart) or direct answers
/// (JSON) and responds with the assembled risk report.
pub async fn analyze(State(state): State<AppState>, request: Request) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analyze", %request_id);

    async move {
        let timer = TimedOperation::start();
        let result = handle(&state, request).await;

        let outcome = match &result {
            Ok(_) => Outcome::Report,
            Err(ApiError::Pipeline(PipelineError::IncompleteProfile { .. })) => Outcome::Incomplete,
            Err(_) => Outcome::Failed,
        };
        state.metrics.record_request(outcome, timer.elapsed());

        match result {
            Ok(report) => {
                info!(
                    risk_level = ?report.risk_level(),
                    score = report.score(),
                    elapsed_ms = timer.elapsed().as_millis() as u64,
                    "Analysis complete"
                );
                Json(report).into_response()
            }
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn handle(state: &AppState, request: Request) -> Result<FinalReport, ApiError> {
    // The staged upload must outlive the pipeline run
    let (submission, _upload) = read_submission(state, request).await?;
    let report = state.pipeline.analyze(submission).await?;
    Ok(report)
}

async fn read_submission(
    state: &AppState,
    request: Request,
) -> Result<(Submission, Option<StagedUpload>), ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::Unreadable {
                status: rejection.status(),
                message: rejection.body_text(),
            })?;
        read_multipart(state, multipart).await
    } else {
        let body = Bytes::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::Unreadable {
                status: rejection.status(),
                message: rejection.body_text(),
            })?;
        Ok((read_json(&body)?, None))
    }
}

async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(Submission, Option<StagedUpload>), ApiError> {
    let mut answers = Answers::new();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(unreadable_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            let data = field.bytes().await.map_err(unreadable_multipart)?;
            if data.is_empty() {
                debug!("Ignoring empty image field");
                continue;
            }
            upload = Some(StagedUpload::write(&state.upload_dir, &data).await?);
        } else if field.file_name().is_none() {
            let key = survey::normalize_key(&name);
            if key.is_empty() {
                continue;
            }
            let text = field.text().await.map_err(unreadable_multipart)?;
            answers.insert(key, survey::coerce_value(&text));
        }
    }

    if let Some(upload) = upload {
        if !answers.is_empty() {
            debug!(fields = answers.len(), "Image present, ignoring text fields");
        }
        let ocr = state
            .ocr
            .recognize(upload.path())
            .await
            .map_err(|e| PipelineError::OcrFailed(e.to_string()))?;
        info!(
            chars = ocr.text.len(),
            confidence = ocr.confidence,
            "Survey image recognised"
        );
        return Ok((Submission::Scanned(ocr), Some(upload)));
    }

    if answers.is_empty() {
        return Err(PipelineError::MissingInput("multipart body had no survey fields".into()).into());
    }
    Ok((Submission::Answers(answers), None))
}

fn read_json(body: &[u8]) -> Result<Submission, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::MissingInput("empty request body".into()).into());
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| ApiError::Unreadable {
        status: StatusCode::BAD_REQUEST,
        message: format!("Request body is not valid JSON: {e}"),
    })?;

    match value {
        Value::Null => Err(PipelineError::MissingInput("null request body".into()).into()),
        Value::Object(answers) => Ok(Submission::Answers(answers)),
        _ => Err(ApiError::Unreadable {
            status: StatusCode::BAD_REQUEST,
            message: "Survey answers must be a JSON object.".to_string(),
        }),
    }
}

fn unreadable_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Unreadable {
        status: err.status(),
        message: format!("Invalid multipart body: {}", err.body_text()),
    }
}

/// An uploaded image written to a uniquely named file in the upload
/// directory. The file is removed when the guard drops.
pub struct StagedUpload {
    path: Option<TempPath>,
}

impl StagedUpload {
    pub async fn write(dir: &Path, data: &[u8]) -> Result<Self, ApiError> {
        let dir = dir.to_path_buf();
        let data = data.to_vec();
        let bytes = data.len();

        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("survey-")
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| ApiError::Internal(format!("upload task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

        debug!(path = %path.display(), bytes, "Upload staged");
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let location = path.to_path_buf();
        match path.close() {
            Ok(()) => debug!(path = %location.display(), "Upload removed"),
            Err(e) => warn!(path = %location.display(), error = %e, "Failed to remove upload"),
        }
    }
}
