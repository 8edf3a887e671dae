//! Structured-output extraction from raw model text.
//!
//! Models wrap their JSON in fenced blocks, prepend reasoning, or trail a stop
//! marker. Extraction prefers a fenced `json` block and otherwise takes the
//! outermost brace span; anything that still fails to deserialize is a
//! [`MragentError::Parse`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde_json::Value;

use crate::MragentError;
use crate::config::SEARCHER_STOP;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("invalid fenced json regex")
});

/// Locate the JSON object inside `raw`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let text = raw.split(SEARCHER_STOP).next().unwrap_or(raw);
    if let Some(captures) = FENCED_JSON.captures(text) {
        if let Some(body) = captures.get(1) {
            return Some(body.as_str());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse `raw` into `T`, naming `context` (the producing agent) in errors.
pub fn parse_json<T: DeserializeOwned>(context: &str, raw: &str) -> Result<T, MragentError> {
    let body = extract_json_object(raw)
        .ok_or_else(|| MragentError::parse(context, "no JSON object found in model output"))?;
    serde_json::from_str(body).map_err(|err| MragentError::parse(context, err.to_string()))
}

/// Accept any JSON value as text: strings verbatim, everything else re-serialised.
pub fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Accept `true`/`false` as booleans or as the strings models sometimes emit.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" | "" => Ok(false),
            other => Err(de::Error::custom(format!("expected boolean, got `{other}`"))),
        },
        Value::Null => Ok(false),
        other => Err(de::Error::custom(format!("expected boolean, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Proposal {
        search_query: String,
        #[serde(default, deserialize_with = "lenient_bool")]
        end: bool,
    }

    #[test]
    fn prefers_fenced_block() {
        let raw = "thinking {not json}\n```json\n{\"search_query\": \"eiffel tower height\"}\n```";
        let parsed: Proposal = parse_json("searcher", raw).unwrap();
        assert_eq!(parsed.search_query, "eiffel tower height");
    }

    #[test]
    fn falls_back_to_brace_span_and_strips_stop_marker() {
        let raw = "Sure! {\"search_query\": \"q\", \"end\": \"True\"}<ENDJSON> trailing {";
        let parsed: Proposal = parse_json("searcher", raw).unwrap();
        assert_eq!(parsed.search_query, "q");
        assert!(parsed.end);
    }

    #[test]
    fn malformed_output_is_a_parse_error() {
        let err = parse_json::<Proposal>("coordinator", "I will pick the planner").unwrap_err();
        assert!(matches!(err, MragentError::Parse { ref context, .. } if context == "coordinator"));

        let err = parse_json::<Proposal>("coordinator", "{\"query\": 1}").unwrap_err();
        assert!(matches!(err, MragentError::Parse { .. }));
    }

    #[test]
    fn non_string_values_become_text() {
        assert_eq!(value_to_text(&serde_json::json!(["a", "b"])), "[\"a\",\"b\"]");
        assert_eq!(value_to_text(&serde_json::json!("plain")), "plain");
        assert_eq!(value_to_text(&Value::Null), "");
    }
}
