//! Question files for batch runs.
//!
//! Accepted layouts: a JSON array of `{id, question, answer, gold_documents}`
//! objects, or JSON lines of the same objects. `answer` may be a string or a
//! list of strings; everything except `question` is optional.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

use crate::structured::value_to_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub question: String,
    /// Reference answers.
    pub references: Vec<String>,
    /// Backend ids of the documents a faithful run should verify.
    pub gold_documents: Vec<String>,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            references: Vec::new(),
            gold_documents: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionRow {
    #[serde(default)]
    id: Value,
    question: String,
    #[serde(default, alias = "answers")]
    answer: Value,
    #[serde(default)]
    gold_documents: Vec<Value>,
}

impl QuestionRow {
    fn into_item(self, index: usize) -> BatchItem {
        let id = match value_to_text(&self.id) {
            text if text.is_empty() => index.to_string(),
            text => text,
        };
        let references = match self.answer {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().map(value_to_text).collect(),
            other => vec![value_to_text(&other)],
        };
        BatchItem {
            id,
            question: self.question,
            references,
            gold_documents: self.gold_documents.iter().map(value_to_text).collect(),
        }
    }
}

pub fn parse_questions(raw: &str) -> Result<Vec<BatchItem>> {
    let trimmed = raw.trim_start();
    let rows: Vec<QuestionRow> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("invalid question array")?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("invalid question on line {}", line_no + 1))
            })
            .collect::<Result<_>>()?
    };
    if rows.is_empty() {
        bail!("question file contains no questions");
    }
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| row.into_item(index))
        .collect())
}

pub fn load_questions(path: &Path) -> Result<Vec<BatchItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read questions from {}", path.display()))?;
    parse_questions(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_with_mixed_answers() {
        let items = parse_questions(
            r#"[
                {"id": 7, "question": "Capital of France?", "answer": "Paris", "gold_documents": ["d1", 2]},
                {"question": "Two answers?", "answer": ["a", "b"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(items[0].id, "7");
        assert_eq!(items[0].references, vec!["Paris"]);
        assert_eq!(items[0].gold_documents, vec!["d1", "2"]);
        assert_eq!(items[1].id, "1");
        assert_eq!(items[1].references, vec!["a", "b"]);
    }

    #[test]
    fn parses_json_lines() {
        let items = parse_questions("{\"id\": \"q1\", \"question\": \"a?\"}\n\n{\"id\": \"q2\", \"question\": \"b?\"}\n").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], BatchItem::new("q2", "b?"));
    }

    #[test]
    fn rejects_empty_and_malformed_files() {
        assert!(parse_questions("[]").is_err());
        assert!(parse_questions("{\"id\": 1}").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(&path, r#"[{"question": "q?"}]"#).unwrap();
        assert_eq!(load_questions(&path).unwrap().len(), 1);
    }
}
