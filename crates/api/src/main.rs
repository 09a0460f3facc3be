use anyhow::{Context, Result};
use inference::InferenceGateway;
use pipeline::RiskPipeline;
use std::sync::Arc;
use survey::TesseractCli;
use tracing_subscriber::EnvFilter;

mod analyze;
mod config;
mod error;
mod metrics;
mod routes;

use config::AppConfig;
use metrics::Metrics;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig::from_env()?;
    if !config.gateway.has_credential() {
        tracing::error!(
            "GEMINI_API_KEY is not set; every analysis will fail until a credential is configured"
        );
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", config.upload_dir.display()))?;

    let gateway = InferenceGateway::new(config.gateway.clone())?;
    let state = AppState {
        pipeline: RiskPipeline::new(gateway),
        ocr: Arc::new(TesseractCli::new(&config.tesseract_bin, &config.tesseract_lang)),
        upload_dir: Arc::new(config.upload_dir.clone()),
        metrics: Metrics::new(),
    };
    let app = routes::app(state, config.max_upload_bytes);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        %addr,
        model = %config.gateway.model,
        upload_dir = %config.upload_dir.display(),
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
