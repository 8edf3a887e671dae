//! Answer generation and revision.
//!
//! The answerer and the reviser write into the same conversation log, so a
//! revision request always follows the draft it revises.

use std::fmt::Write as _;

use mragent_core::coordinator::{AnswererInput, ReviserInput};
use mragent_core::retrieval::Document;

pub const SYSTEM_PROMPT: &str = r#"You are a response generator. Write a response to the question that is grounded in the provided documents and follows the guidance you are given. When asked to revise, rewrite your previous response according to the suggestion.

# Your output: a JSON object enclosed in ```json ``` with the field:
    - "response": the response as a string.
"#;

const CONCISE_NOTE: &str = "Keep the response as short as possible: a few words when the question asks for a fact.";

pub fn answer_prompt(
    question: &str,
    input: &AnswererInput,
    documents: &[Document],
    concise: bool,
) -> String {
    let mut prompt = format!("# question: {question}\n# documents:\n");
    if documents.is_empty() {
        prompt.push_str("(no documents were verified)\n");
    }
    for document in documents {
        let _ = writeln!(prompt, "- [{}] {}", document.id, document.text);
    }
    let _ = write!(
        prompt,
        "# guidance: {}\n# important information: {}\n",
        input.guidance, input.important_information
    );
    if concise {
        prompt.push_str(CONCISE_NOTE);
        prompt.push('\n');
    }
    prompt
}

pub fn revise_prompt(input: &ReviserInput) -> String {
    format!(
        "Revise your previous response.\n# suggestion: {}\n",
        input.suggestion
    )
}
