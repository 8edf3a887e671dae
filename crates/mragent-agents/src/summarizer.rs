//! Summarizer: condenses gathered information with respect to the question.

use mragent_core::coordinator::SummarizerInput;
use mragent_core::structured::lenient_text;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = r#"You are a summarization agent. Condense the provided information into a short summary that keeps every fact relevant to the question and drops everything else. Do not add facts that are not in the information.

# Your input:
    - "question": the question the user wants answered.
    - "information": the information to summarize.

# Your output: a JSON object enclosed in ```json ``` with the field:
    - "summary": the summary as a string.
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(deserialize_with = "lenient_text")]
    pub summary: String,
}

pub fn user_prompt(question: &str, input: &SummarizerInput) -> String {
    format!("# question: {question}\n# information: {}\n", input.information)
}
