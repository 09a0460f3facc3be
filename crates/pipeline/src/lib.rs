pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod report;

pub use error::{PipelineError, Stage};
pub use orchestrator::{RiskPipeline, Submission};
pub use report::{FinalReport, RecommendationMap, RiskClassification, RiskFactorSet, RiskLevel};
