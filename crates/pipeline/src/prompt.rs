use inference::ResponseSchema;
use serde_json::{Value, json};
use survey::Answers;

pub const FACTOR_INSTRUCTION: &str = "You are a health data summarizer. For each lifestyle habit provided, \
identify the key factor and describe it in a short, professional phrase (for example 'High sugar intake' \
or 'Lack of physical activity'). Summarize every category provided. Respond with a single JSON object \
holding a 'risk_factors' array of strings and a 'confidence' number between 0 and 1 stating how confident \
you are in those factors.";

pub const CLASSIFICATION_INSTRUCTION: &str = "You are a health risk classifier. Based on the provided risk \
factors, compute a simple NON-DIAGNOSTIC score from 0 to 100, assign a risk level, and return the rationale. \
'risk_level' must be one of \"low\", \"moderate\", \"high\"; 'score' is an integer 0-100; 'rationale' is an \
array of the main risk factor strings. Respond with a single JSON object.";

pub const RECOMMENDATION_INSTRUCTION: &str = "You are a helpful and encouraging health advisor. For each \
lifestyle factor provided, give one simple, actionable, non-diagnostic recommendation in a supportive tone. \
Respond with a single JSON object whose 'recommendations' key holds a list of objects, each with a 'factor' \
and a 'recommendation'.";

pub fn factor_schema() -> ResponseSchema {
    ResponseSchema::object([
        ("risk_factors", ResponseSchema::array(ResponseSchema::string())),
        ("confidence", ResponseSchema::number()),
    ])
}

pub fn classification_schema() -> ResponseSchema {
    ResponseSchema::object([
        ("risk_level", ResponseSchema::string()),
        ("score", ResponseSchema::number()),
        ("rationale", ResponseSchema::array(ResponseSchema::string())),
    ])
}

pub fn recommendation_schema() -> ResponseSchema {
    ResponseSchema::object([(
        "recommendations",
        ResponseSchema::array(ResponseSchema::object([
            ("factor", ResponseSchema::string()),
            ("recommendation", ResponseSchema::string()),
        ])),
    )])
}

/// One `key: value` line per answer.
pub fn factor_input(answers: &Answers) -> String {
    answers
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("{}: {}", key, text),
            other => format!("{}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn classification_input(factors: &[String]) -> String {
    json!({ "risk_factors": factors }).to_string()
}

pub fn recommendation_input(rationale: &[String]) -> String {
    format!(
        "Please provide recommendations for the following lifestyle factors: {}",
        rationale.join(", ")
    )
}
