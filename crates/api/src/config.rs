use anyhow::{Context, Result};
use inference::{GatewayConfig, RetryConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub tesseract_bin: String,
    pub tesseract_lang: String,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = GatewayConfig::default();
        let retry_defaults = RetryConfig::default();

        let retry = RetryConfig {
            max_retries: parse_or(&get, "INFERENCE_MAX_RETRIES", retry_defaults.max_retries)?,
            initial_backoff_ms: parse_or(
                &get,
                "INFERENCE_INITIAL_BACKOFF_MS",
                retry_defaults.initial_backoff_ms,
            )?,
            max_backoff_ms: parse_or(&get, "INFERENCE_MAX_BACKOFF_MS", retry_defaults.max_backoff_ms)?,
        };

        let timeout_secs: u64 = parse_or(
            &get,
            "INFERENCE_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;

        let gateway = GatewayConfig {
            endpoint: get("GEMINI_ENDPOINT").unwrap_or(defaults.endpoint),
            model: get("GEMINI_MODEL").unwrap_or(defaults.model),
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            request_timeout: Duration::from_secs(timeout_secs),
            retry,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 3000)?,
            upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            tesseract_bin: get("TESSERACT_BIN").unwrap_or_else(|| "tesseract".to_string()),
            tesseract_lang: get("TESSERACT_LANG").unwrap_or_else(|| "eng".to_string()),
            gateway,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
