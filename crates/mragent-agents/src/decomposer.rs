//! Question decomposer behind the complex searcher.

use mragent_core::coordinator::ComplexSearcherInput;

pub const SYSTEM_PROMPT: &str = r#"You are a helpful and capable agent whose task is to decompose a complex question into several simpler sub-questions that, taken together, allow answering the original question.

# Your input:
    - "question": the original question the user wants to answer.
    - "information": a summary of the information the user has gathered so far. This can be empty if the user has not gathered any information yet.

# Your output: a JSON object enclosed in ```json ``` that contains:
    - "should_split": a boolean. If false, the original question should be treated as a single question.
    - "sub_questions": a list of objects. Each object has:
        - "id": integer
        - "sub_question": string
        - "reason": string

Write nothing before or after the JSON block.
"#;

pub fn user_prompt(question: &str, input: &ComplexSearcherInput) -> String {
    format!("# question: {question}\n# information: {}\n", input.information)
}
