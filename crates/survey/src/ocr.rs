use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to start OCR engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("OCR engine exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Text recognised on a scanned form.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence, 0-100.
    pub confidence: f64,
}

/// Optical text extraction over an image stored on disk.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, OcrError>;
}

/// Runs the `tesseract` command line tool in TSV mode.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, OcrError> {
        tracing::debug!(image = %image.display(), "Running tesseract");

        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(OcrError::Spawn)?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Rebuild line text and mean word confidence from tesseract TSV output.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<((&str, &str, &str, &str), String)> = Vec::new();
    let mut confidence_sum = 0.0;
    let mut scored_words = 0usize;

    // level page block par line word left top width height conf text
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        if let Ok(conf) = cols[10].trim().parse::<f64>() {
            if conf >= 0.0 {
                confidence_sum += conf;
                scored_words += 1;
            }
        }

        let key = (cols[1], cols[2], cols[3], cols[4]);
        match lines.last_mut() {
            Some((last_key, text)) if *last_key == key => {
                text.push(' ');
                text.push_str(word);
            }
            _ => lines.push((key, word.to_string())),
        }
    }

    let confidence = if scored_words > 0 {
        confidence_sum / scored_words as f64
    } else {
        0.0
    };

    OcrOutput {
        text: lines
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n"),
        confidence,
    }
}
