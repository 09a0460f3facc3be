use inference::GatewayFailure;

/// The three stages backed by the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Factors,
    Classification,
    Recommendations,
}

impl Stage {
    /// Operation name used in gateway logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Stage::Factors => "extract_factors",
            Stage::Classification => "classify_risk",
            Stage::Recommendations => "generate_recommendations",
        }
    }

    /// Map a gateway failure to this stage's terminal error. A missing
    /// credential is a configuration problem whichever stage hits it.
    pub fn failed(self, failure: GatewayFailure) -> PipelineError {
        match failure {
            GatewayFailure::MissingCredential => PipelineError::Configuration,
            other => self.rejected(other.to_string()),
        }
    }

    /// This stage's terminal error for an answer that can't be used.
    pub fn rejected(self, reason: impl Into<String>) -> PipelineError {
        let reason = reason.into();
        match self {
            Stage::Factors => PipelineError::FactorExtraction(reason),
            Stage::Classification => PipelineError::Classification(reason),
            Stage::Recommendations => PipelineError::Recommendation(reason),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no survey provided: {0}")]
    MissingInput(String),

    #[error("no usable survey data could be read from the image: {0}")]
    OcrFailed(String),

    #[error("survey is missing too many required fields: {missing_fields:?}")]
    IncompleteProfile { missing_fields: Vec<&'static str> },

    #[error("inference service credential is not configured")]
    Configuration,

    #[error("risk factor extraction failed: {0}")]
    FactorExtraction(String),

    #[error("risk classification failed: {0}")]
    Classification(String),

    #[error("recommendation generation failed: {0}")]
    Recommendation(String),
}

impl PipelineError {
    /// Name of the terminal state the request ended in.
    pub fn terminal_state(&self) -> &'static str {
        match self {
            PipelineError::MissingInput(_) => "missing_input",
            PipelineError::OcrFailed(_) => "ocr_failed",
            PipelineError::IncompleteProfile { .. } => "incomplete_profile",
            PipelineError::Configuration => "configuration_error",
            PipelineError::FactorExtraction(_) => "extraction_failed",
            PipelineError::Classification(_) => "classification_failed",
            PipelineError::Recommendation(_) => "recommendation_failed",
        }
    }
}
