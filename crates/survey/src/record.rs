use serde::Serialize;
use serde_json::Value;

/// Field name -> answer, as submitted or as recognised from a scanned form.
pub type Answers = serde_json::Map<String, Value>;

/// Fields a survey must answer, under the keys they are submitted with.
pub const REQUIRED_FIELDS: [&str; 4] = ["age", "smoker", "exercise", "diet"];

/// Canonical survey submission.
///
/// `missing_fields` is derived from `answers` on construction and cannot be
/// edited independently of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
    answers: Answers,
    missing_fields: Vec<&'static str>,
    confidence: f64,
}

impl SurveyRecord {
    /// Wrap answers, clamping `confidence` into [0, 1].
    pub fn new(answers: Answers, confidence: f64) -> Self {
        let missing_fields = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !is_answered(&answers, field))
            .collect();

        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            answers,
            missing_fields,
            confidence,
        }
    }

    /// A direct submission is taken at full confidence.
    pub fn direct(answers: Answers) -> Self {
        Self::new(answers, 1.0)
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn missing_fields(&self) -> &[&'static str] {
        &self.missing_fields
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

// An explicit `null` counts as unanswered
fn is_answered(answers: &Answers, field: &str) -> bool {
    answers.get(field).is_some_and(|value| !value.is_null())
}
