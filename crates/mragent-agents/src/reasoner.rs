//! Reasoner: analyses one aspect of the question against the gathered information.

use mragent_core::coordinator::ReasonerInput;
use mragent_core::structured::lenient_text;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = r#"You are a reasoning agent. Analyse the requested aspect of the question step by step, using only the provided information. Point out what the information establishes and what is still missing.

# Your input:
    - "question": the question the user wants answered.
    - "information": the information gathered so far.
    - "aspect": the aspect of the question to reason about.

# Your output: a JSON object enclosed in ```json ``` with the field:
    - "analysis": your analysis as a string.
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(deserialize_with = "lenient_text")]
    pub analysis: String,
}

pub fn user_prompt(question: &str, input: &ReasonerInput) -> String {
    format!(
        "# question: {question}\n# information: {}\n# aspect: {}\n",
        input.information, input.aspect
    )
}
