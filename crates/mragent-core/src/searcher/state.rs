use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::prompts;
use crate::llm::{Conversation, Message};
use crate::retrieval::Document;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSlot {
    pub doc: Document,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub query: String,
    /// Session document id -> slot
    pub documents: BTreeMap<String, DocumentSlot>,
}

/// How [`SearcherState::enter`] found the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Episode {
    /// No state, or state left over from another run id: started fresh.
    New,
    /// Same run id: accumulated progress kept.
    Resumed,
}

/// Cross-call searcher memory for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearcherState {
    run_id: String,
    conversation: Conversation,
    /// Query text -> record
    queries: BTreeMap<String, QueryRecord>,
    id_to_query: BTreeMap<String, String>,
    next_query_id: usize,
    verified_documents: Vec<Document>,
    verified_ids: Vec<String>,
    total_steps: usize,
}

/// Result of a relevance judgement applied to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    NewlyVerified,
    AlreadyVerified,
    UnknownDocument,
}

impl SearcherState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            conversation: vec![Message::system(prompts::SYSTEM)],
            queries: BTreeMap::new(),
            id_to_query: BTreeMap::new(),
            next_query_id: 0,
            verified_documents: Vec::new(),
            verified_ids: Vec::new(),
            total_steps: 0,
        }
    }

    /// Resume the episode in `slot` if it belongs to `run_id`, otherwise start a new one.
    pub fn enter<'a>(slot: &'a mut Option<Self>, run_id: &str) -> (&'a mut Self, Episode) {
        let episode = match slot {
            Some(state) if state.run_id == run_id => Episode::Resumed,
            _ => Episode::New,
        };
        if episode == Episode::New {
            *slot = Some(Self::new(run_id));
        }
        let state = slot.get_or_insert_with(|| Self::new(run_id));
        (state, episode)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.conversation.push(message);
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub(crate) fn consume_step(&mut self) {
        self.total_steps += 1;
    }

    pub fn verified_documents(&self) -> &[Document] {
        &self.verified_documents
    }

    pub fn verified_ids(&self) -> &[String] {
        &self.verified_ids
    }

    pub fn queries(&self) -> &BTreeMap<String, QueryRecord> {
        &self.queries
    }

    pub fn query_for_id(&self, query_id: &str) -> Option<&str> {
        self.id_to_query.get(query_id).map(String::as_str)
    }

    /// Existing id for `query`, or the next counter value.
    pub(crate) fn query_id_for(&mut self, query: &str) -> String {
        if let Some(record) = self.queries.get(query) {
            return record.id.clone();
        }
        let id = self.next_query_id.to_string();
        self.next_query_id += 1;
        self.queries.insert(
            query.to_string(),
            QueryRecord {
                id: id.clone(),
                query: query.to_string(),
                documents: BTreeMap::new(),
            },
        );
        self.id_to_query.insert(id.clone(), query.to_string());
        id
    }

    pub(crate) fn record_document(&mut self, query: &str, doc: Document) {
        if let Some(record) = self.queries.get_mut(query) {
            record
                .documents
                .entry(doc.id.clone())
                .or_insert(DocumentSlot {
                    doc,
                    verified: false,
                });
        }
    }

    /// Mark `doc_id` under `query` relevant, appending it to the run-wide list once.
    pub(crate) fn mark_verified(&mut self, query: &str, doc_id: &str) -> Verification {
        let Some(slot) = self
            .queries
            .get_mut(query)
            .and_then(|record| record.documents.get_mut(doc_id))
        else {
            return Verification::UnknownDocument;
        };
        slot.verified = true;
        if self.verified_ids.iter().any(|id| id == doc_id) {
            return Verification::AlreadyVerified;
        }
        self.verified_ids.push(doc_id.to_string());
        self.verified_documents.push(slot.doc.clone());
        Verification::NewlyVerified
    }

    pub fn outcome(&self) -> super::SearchOutcome {
        super::SearchOutcome {
            documents: self
                .verified_documents
                .iter()
                .map(|doc| doc.text.clone())
                .collect(),
            found_information: !self.verified_documents.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            original_id: format!("orig-{id}"),
            text: format!("text {id}"),
        }
    }

    #[test]
    fn enter_resumes_same_run_and_resets_on_new_run() {
        let mut slot = None;
        {
            let (state, episode) = SearcherState::enter(&mut slot, "run-a");
            assert_eq!(episode, Episode::New);
            state.consume_step();
        }
        {
            let (state, episode) = SearcherState::enter(&mut slot, "run-a");
            assert_eq!(episode, Episode::Resumed);
            assert_eq!(state.total_steps(), 1);
        }
        let (state, episode) = SearcherState::enter(&mut slot, "run-b");
        assert_eq!(episode, Episode::New);
        assert_eq!(state.total_steps(), 0);
        assert_eq!(state.conversation().len(), 1);
    }

    #[test]
    fn query_ids_are_reused_per_query_text() {
        let mut state = SearcherState::new("r");
        assert_eq!(state.query_id_for("first"), "0");
        assert_eq!(state.query_id_for("second"), "1");
        assert_eq!(state.query_id_for("first"), "0");
        assert_eq!(state.query_for_id("1"), Some("second"));
    }

    #[test]
    fn verification_deduplicates_across_queries() {
        let mut state = SearcherState::new("r");
        state.query_id_for("a");
        state.query_id_for("b");
        state.record_document("a", doc("7"));
        state.record_document("b", doc("7"));

        assert_eq!(state.mark_verified("a", "7"), Verification::NewlyVerified);
        assert_eq!(state.mark_verified("b", "7"), Verification::AlreadyVerified);
        assert_eq!(state.mark_verified("b", "99"), Verification::UnknownDocument);
        assert_eq!(state.verified_ids(), ["7".to_string()]);
        assert!(state.queries()["b"].documents["7"].verified);
        assert!(state.outcome().found_information);
    }
}
