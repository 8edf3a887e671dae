//! Planner: proposes the remaining steps towards an answer.

use mragent_core::coordinator::PlannerInput;
use mragent_core::structured::value_to_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SYSTEM_PROMPT: &str = r#"You are a planning agent. Given a question and the information gathered so far, write a short step-by-step plan for what still needs to be found or done to answer the question.

# Your input:
    - "question": the question the user wants answered.
    - "information": the information gathered so far. This can be empty.

# Your output: a JSON object enclosed in ```json ``` with the field:
    - "plan": a list of short steps, each a string.
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(deserialize_with = "plan_steps")]
    pub plan: Vec<String>,
}

/// Models sometimes return the plan as one string instead of a list.
fn plan_steps<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_text(&other)],
    })
}

pub fn user_prompt(question: &str, input: &PlannerInput) -> String {
    format!("# question: {question}\n# information: {}\n", input.information)
}
