//! Validator: judges whether a draft response answers the question.

use mragent_core::coordinator::ValidatorInput;
use mragent_core::structured::{lenient_bool, lenient_text};
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = r#"You are a careful validator. Given a question, the information gathered so far and a candidate response, decide whether the response correctly and completely answers the question using only that information.

# Your input:
    - "question": the question the user wants answered.
    - "information": the information gathered so far.
    - "response": the candidate response to check.

# Your output: a JSON object enclosed in ```json ``` with the fields:
    - "reasoning": a short explanation of your judgement.
    - "is_valid": true if the response is correct, complete and supported, otherwise false.
    - "suggestion": how the response should change when it is not valid, otherwise an empty string.
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    #[serde(default, deserialize_with = "lenient_text")]
    pub reasoning: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_valid: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    pub suggestion: String,
}

pub fn user_prompt(question: &str, input: &ValidatorInput) -> String {
    format!(
        "# question: {question}\n# information: {}\n# response: {}\n",
        input.information, input.response
    )
}
