//! Per-run memory shared by the coordinator and the agents it dispatches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::Conversation;
use crate::retrieval::Document;
use crate::searcher::SearcherState;
use crate::specialists::SubQuestion;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMemory {
    responses: Vec<String>,
    final_response: Option<String>,
    searcher: Option<SearcherState>,
    sub_questions: Vec<SubQuestion>,
    /// Private conversation logs keyed by agent.
    logs: BTreeMap<String, Conversation>,
}

impl RunMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every answerer and reviser output, oldest first.
    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// The latest answerer or reviser output.
    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub(crate) fn record_response(&mut self, response: String) {
        self.final_response = Some(response.clone());
        self.responses.push(response);
    }

    pub fn searcher(&self) -> Option<&SearcherState> {
        self.searcher.as_ref()
    }

    pub(crate) fn searcher_slot(&mut self) -> &mut Option<SearcherState> {
        &mut self.searcher
    }

    /// Documents verified by the searcher in this run.
    pub fn verified_documents(&self) -> &[Document] {
        self.searcher
            .as_ref()
            .map(SearcherState::verified_documents)
            .unwrap_or(&[])
    }

    pub fn sub_questions(&self) -> &[SubQuestion] {
        &self.sub_questions
    }

    pub(crate) fn set_sub_questions(&mut self, sub_questions: Vec<SubQuestion>) {
        self.sub_questions = sub_questions;
    }

    pub fn log(&self, key: &str) -> Option<&Conversation> {
        self.logs.get(key)
    }

    pub(crate) fn log_mut(&mut self, key: &str) -> &mut Conversation {
        self.logs.entry(key.to_string()).or_default()
    }

    pub fn logs(&self) -> &BTreeMap<String, Conversation> {
        &self.logs
    }
}
