use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::retry::RetryPolicy;
use crate::schema::ResponseSchema;

/// Why a gateway call produced no result. Every variant is terminal for the
/// calling stage.
#[derive(Debug, thiserror::Error)]
pub enum GatewayFailure {
    #[error("inference service credential is not configured")]
    MissingCredential,

    #[error("inference service rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("inference service unavailable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error("inference service returned an unusable payload: {0}")]
    MalformedPayload(String),
}

/// One structured-output call: what to do, what to do it on, and the shape
/// the answer must take.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub instruction: &'a str,
    pub input: &'a str,
    pub schema: &'a ResponseSchema,
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("server error {0}")]
    Server(StatusCode),

    #[error("client error {0}")]
    Client(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Payload(String),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Server(_) | AttemptError::Transport(_))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a ResponseSchema,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(request: &InferenceRequest<'a>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![TextPart {
                    text: request.input,
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: request.instruction,
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request.schema,
            },
        }
    }
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// The single point of contact with the inference service.
///
/// Holds no per-call state; clones share the underlying connection pool.
#[derive(Clone)]
pub struct InferenceGateway {
    config: GatewayConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl InferenceGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build inference HTTP client")?;
        let retry = RetryPolicy::from_config(&config.retry);

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_credential()
    }

    /// Ask the service for a structured answer and decode it into `T`.
    ///
    /// Server errors, timeouts and connection failures are retried with
    /// backoff; client errors and undecodable payloads are not.
    pub async fn infer<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: &InferenceRequest<'_>,
    ) -> Result<T, GatewayFailure> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::error!(operation, "Inference credential missing, call not attempted");
                return Err(GatewayFailure::MissingCredential);
            }
        };

        let url = self.config.generate_url();
        let body = GenerateContentRequest::new(request);
        let mut attempts = 0;

        let result = self
            .retry
            .retry(operation, AttemptError::is_transient, || {
                attempts += 1;
                self.attempt::<T>(&url, api_key, &body)
            })
            .await;

        result.map_err(|e| match e {
            AttemptError::Client(status) => GatewayFailure::Rejected {
                status: status.as_u16(),
            },
            AttemptError::Payload(reason) => GatewayFailure::MalformedPayload(reason),
            transient => GatewayFailure::Exhausted {
                attempts,
                last_error: transient.to_string(),
            },
        })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        api_key: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<T, AttemptError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Server(status));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                detail = %truncate(&detail, 512),
                "Inference service rejected request"
            );
            return Err(AttemptError::Client(status));
        }

        let raw = response.text().await?;
        let envelope: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| AttemptError::Payload(format!("unreadable response envelope: {}", e)))?;
        let text = envelope
            .first_text()
            .ok_or_else(|| AttemptError::Payload("response carried no candidate text".to_string()))?;

        serde_json::from_str(text).map_err(|e| {
            AttemptError::Payload(format!("answer does not match the requested shape: {}", e))
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
