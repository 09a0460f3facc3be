use inference::{InferenceGateway, InferenceRequest};
use survey::{Answers, OcrOutput, SurveyRecord};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Stage};
use crate::prompt;
use crate::report::{
    ClassificationAnswer, FactorAnswer, FinalReport, RecommendationAnswer, RecommendationMap,
    RiskClassification, RiskFactorSet, RiskLevel, fold_recommendations,
};

/// A survey as it arrived, before canonicalization.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Answers sent directly as structured fields.
    Answers(Answers),
    /// Text recognised on a photographed paper form.
    Scanned(OcrOutput),
}

/// Runs one survey through guardrail, factor extraction, classification and
/// recommendations. Stages run strictly in order and the first failure ends
/// the run.
#[derive(Clone)]
pub struct RiskPipeline {
    gateway: InferenceGateway,
}

impl RiskPipeline {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &InferenceGateway {
        &self.gateway
    }

    /// Turn a submission into a canonical record.
    ///
    /// Direct answers always canonicalize. A scan fails if it yielded no text
    /// or no `field: value` lines.
    pub fn canonicalize(submission: Submission) -> Result<SurveyRecord, PipelineError> {
        match submission {
            Submission::Answers(answers) => Ok(SurveyRecord::direct(answers)),
            Submission::Scanned(ocr) => {
                if ocr.text.trim().is_empty() {
                    return Err(PipelineError::OcrFailed("no text detected".to_string()));
                }
                let record = survey::record_from_text(&ocr.text, ocr.confidence);
                if record.is_empty() {
                    return Err(PipelineError::OcrFailed(
                        "no `field: value` lines recognised".to_string(),
                    ));
                }
                Ok(record)
            }
        }
    }

    pub async fn analyze(&self, submission: Submission) -> Result<FinalReport, PipelineError> {
        let record = Self::canonicalize(submission)?;
        info!(
            answers = record.answers().len(),
            missing = ?record.missing_fields(),
            confidence = record.confidence(),
            "Survey canonicalized"
        );
        self.run(&record).await
    }

    pub async fn run(&self, record: &SurveyRecord) -> Result<FinalReport, PipelineError> {
        if !survey::passes_guardrail(record) {
            warn!(missing = ?record.missing_fields(), "Survey rejected by completeness guardrail");
            return Err(PipelineError::IncompleteProfile {
                missing_fields: record.missing_fields().to_vec(),
            });
        }

        let factors = self.extract_factors(record).await?;
        let classification = self.classify(&factors).await?;
        let recommendations = self.recommend(&classification).await?;

        info!(
            level = ?classification.level,
            score = classification.score,
            factors = factors.factors.len(),
            recommendations = recommendations.len(),
            "Report assembled"
        );
        Ok(FinalReport::assemble(&classification, factors, recommendations))
    }

    async fn extract_factors(&self, record: &SurveyRecord) -> Result<RiskFactorSet, PipelineError> {
        let stage = Stage::Factors;
        let input = prompt::factor_input(record.answers());
        let schema = prompt::factor_schema();
        let request = InferenceRequest {
            instruction: prompt::FACTOR_INSTRUCTION,
            input: &input,
            schema: &schema,
        };

        let answer: FactorAnswer = self
            .gateway
            .infer(stage.operation(), &request)
            .await
            .map_err(|e| stage.failed(e))?;

        let factors = RiskFactorSet::from_answer(answer, record.confidence());
        if factors.is_empty() {
            return Err(stage.rejected("service returned no risk factors"));
        }

        debug!(factors = ?factors.factors, confidence = factors.confidence, "Risk factors extracted");
        Ok(factors)
    }

    async fn classify(&self, factors: &RiskFactorSet) -> Result<RiskClassification, PipelineError> {
        let stage = Stage::Classification;
        let input = prompt::classification_input(&factors.factors);
        let schema = prompt::classification_schema();
        let request = InferenceRequest {
            instruction: prompt::CLASSIFICATION_INSTRUCTION,
            input: &input,
            schema: &schema,
        };

        let answer: ClassificationAnswer = self
            .gateway
            .infer(stage.operation(), &request)
            .await
            .map_err(|e| stage.failed(e))?;

        let classification = RiskClassification::from_answer(answer);
        if classification.level == RiskLevel::Unknown {
            return Err(stage.rejected("service returned no recognisable risk level"));
        }
        if classification.rationale.is_empty() {
            return Err(stage.rejected("service returned an empty rationale"));
        }

        debug!(
            level = ?classification.level,
            score = classification.score,
            rationale = ?classification.rationale,
            "Risk classified"
        );
        Ok(classification)
    }

    async fn recommend(
        &self,
        classification: &RiskClassification,
    ) -> Result<RecommendationMap, PipelineError> {
        let stage = Stage::Recommendations;
        let input = prompt::recommendation_input(&classification.rationale);
        let schema = prompt::recommendation_schema();
        let request = InferenceRequest {
            instruction: prompt::RECOMMENDATION_INSTRUCTION,
            input: &input,
            schema: &schema,
        };

        let answer: RecommendationAnswer = self
            .gateway
            .infer(stage.operation(), &request)
            .await
            .map_err(|e| stage.failed(e))?;

        let recommendations =
            fold_recommendations(answer.recommendations, &classification.rationale);
        if recommendations.is_empty() {
            return Err(stage.rejected("service returned no recommendations"));
        }

        debug!(count = recommendations.len(), "Recommendations generated");
        Ok(recommendations)
    }
}
