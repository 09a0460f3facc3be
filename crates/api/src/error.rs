//! Maps pipeline outcomes onto HTTP responses.
//!
//! Every failure is answered with a JSON body carrying a human-readable
//! reason, and is logged here exactly once.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pipeline::PipelineError;
use serde_json::json;
use survey::REQUIRED_FIELDS;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The request body could not be read or decoded.
    #[error("unreadable request: {message}")]
    Unreadable { status: StatusCode, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(err) => match err {
                PipelineError::MissingInput(_) | PipelineError::IncompleteProfile { .. } => {
                    StatusCode::BAD_REQUEST
                }
                PipelineError::OcrFailed(_)
                | PipelineError::Configuration
                | PipelineError::FactorExtraction(_)
                | PipelineError::Classification(_)
                | PipelineError::Recommendation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unreadable { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn terminal_state(&self) -> &'static str {
        match self {
            ApiError::Pipeline(err) => err.terminal_state(),
            ApiError::Unreadable { .. } => "unreadable_request",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Pipeline(PipelineError::IncompleteProfile { missing_fields }) => json!({
                "status": "incomplete_profile",
                "reason": format!(
                    "More than half of the required fields ({}) are missing.",
                    REQUIRED_FIELDS.join(", ")
                ),
                "missingFields": missing_fields,
            }),
            ApiError::Pipeline(err) => json!({ "error": public_message(err) }),
            ApiError::Unreadable { message, .. } => json!({ "error": message }),
            ApiError::Internal(_) => json!({ "error": "An internal server error occurred." }),
        }
    }
}

fn public_message(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::MissingInput(_) => {
            "No survey provided. Upload an image in the \"surveyImage\" field or send the answers as JSON."
        }
        PipelineError::OcrFailed(_) => "OCR failed to extract data from the image.",
        PipelineError::IncompleteProfile { .. } => "Survey profile is incomplete.",
        PipelineError::Configuration => "The analysis service is not configured.",
        PipelineError::FactorExtraction(_) => "AI analysis did not return any risk factors.",
        PipelineError::Classification(_) => "AI analysis did not return any risk classification.",
        PipelineError::Recommendation(_) => "AI analysis did not return any recommendations.",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(
                state = self.terminal_state(),
                status = status.as_u16(),
                error = %self,
                "Analysis failed"
            );
        } else {
            tracing::warn!(
                state = self.terminal_state(),
                status = status.as_u16(),
                error = %self,
                "Analysis refused"
            );
        }

        (status, Json(self.body())).into_response()
    }
}
