pub mod guardrail;
pub mod normalizer;
pub mod ocr;
pub mod record;

pub use guardrail::{MAX_MISSING_FIELDS, passes_guardrail};
pub use normalizer::{coerce_value, normalize_key, normalize_text};
pub use ocr::{OcrEngine, OcrError, OcrOutput, TesseractCli};
pub use record::{Answers, REQUIRED_FIELDS, SurveyRecord};

/// Canonicalize free text recognised from a scanned form.
///
/// `ocr_confidence` is the engine's 0-100 score; the record carries it as a
/// fraction in [0, 1].
pub fn record_from_text(text: &str, ocr_confidence: f64) -> SurveyRecord {
    let answers = normalize_text(text);
    SurveyRecord::new(answers, ocr_confidence / 100.0)
}
