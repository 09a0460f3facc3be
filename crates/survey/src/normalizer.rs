use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::record::Answers;

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:=\-]+)\s*[:=\-]\s*(.+)$").expect("line pattern is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("digit pattern is valid"));

/// Parse line-oriented `key: value` text into normalized answers.
///
/// Separators are `:`, `=` or `-`. Keys are lowercased with whitespace runs
/// replaced by `_`. Lines that don't match are dropped; a later duplicate key
/// overwrites an earlier one.
pub fn normalize_text(text: &str) -> Answers {
    let mut answers = Answers::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(caps) = LINE_PATTERN.captures(line) else {
            continue;
        };

        let key = normalize_key(&caps[1]);
        if key.is_empty() {
            continue;
        }
        answers.insert(key, coerce_value(&caps[2]));
    }

    answers
}

/// Coerce a raw answer into an integer, a boolean, or a trimmed string.
pub fn coerce_value(raw: &str) -> Value {
    let value = raw.trim();

    if DIGITS.is_match(value) {
        // Oversized digit runs stay strings rather than wrapping
        if let Ok(n) = value.parse::<i64>() {
            return Value::from(n);
        }
    }

    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Value::Bool(true),
        "false" | "no" => Value::Bool(false),
        _ => Value::String(value.to_string()),
    }
}

/// Lowercase a field name and join its words with `_`.
pub fn normalize_key(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    WHITESPACE.replace_all(&lowered, "_").into_owned()
}
