use crate::record::SurveyRecord;

/// Most required fields a record may lack and still be analysed.
pub const MAX_MISSING_FIELDS: usize = 2;

/// Whether a record carries enough of the required fields to be worth an
/// inference call.
pub fn passes_guardrail(record: &SurveyRecord) -> bool {
    record.missing_fields().len() <= MAX_MISSING_FIELDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Answers;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> SurveyRecord {
        let mut answers = Answers::new();
        for (key, value) in pairs {
            answers.insert(key.to_string(), value.clone());
        }
        SurveyRecord::direct(answers)
    }

    #[test]
    fn test_guardrail_boundary() {
        assert!(!passes_guardrail(&record(&[])));
        assert!(!passes_guardrail(&record(&[("age", json!(40))])));
        assert!(passes_guardrail(&record(&[("age", json!(40)), ("smoker", json!(false))])));
        assert!(passes_guardrail(&record(&[
            ("age", json!(40)),
            ("smoker", json!(false)),
            ("exercise", json!("daily")),
        ])));
    }

    #[test]
    fn test_unrelated_answers_do_not_count() {
        let r = record(&[("sleep", json!(8)), ("alcohol", json!("none")), ("diet", json!("good"))]);
        assert_eq!(r.missing_fields().len(), 3);
        assert!(!passes_guardrail(&r));
    }
}
