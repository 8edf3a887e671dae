//! The searcher sub-protocol.
//!
//! One call proposes a query, then pulls documents in batches of
//! [`BATCH_SIZE`] and asks the agent model to judge each batch, up to
//! `max_verification_same_query` batches. Progress accumulates in
//! [`SearcherState`] across calls of the same run and is bounded by a step
//! budget and an optional wall-clock deadline.

mod prompts;
mod state;

pub use state::{DocumentSlot, Episode, QueryRecord, SearcherState, Verification};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::MragentError;
use crate::config::ExecuteConfig;
use crate::llm::{LanguageModel, Message};
use crate::metrics;
use crate::retrieval::Retriever;
use crate::structured::{lenient_bool, lenient_text, parse_json};
use crate::trace::{RunTrace, preview};

/// Documents judged per verification round.
pub const BATCH_SIZE: usize = 5;

const COMPONENT: &str = "searcher";

/// What the searcher reports back: the texts of every document verified so
/// far in this run, not only those found by this call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub documents: Vec<String>,
    pub found_information: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub question: &'a str,
    pub information: &'a str,
    pub suggestions: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryProposal {
    #[serde(deserialize_with = "lenient_text")]
    search_query: String,
    #[serde(default, deserialize_with = "lenient_text")]
    search_query_explanation: String,
}

#[derive(Debug, Deserialize)]
struct Judgement {
    #[serde(deserialize_with = "lenient_text")]
    doc_id: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_relevant: bool,
}

#[derive(Debug, Deserialize)]
struct BatchVerdict {
    #[serde(default)]
    relevance: Vec<Judgement>,
    #[serde(default, deserialize_with = "lenient_bool")]
    change_search_query: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    new_search_query: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    end_search: bool,
}

/// Borrowed collaborators for one searcher call.
pub struct Searcher<'a> {
    model: &'a dyn LanguageModel,
    retriever: &'a dyn Retriever,
    config: &'a ExecuteConfig,
    trace: &'a RunTrace,
}

impl<'a> Searcher<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        retriever: &'a dyn Retriever,
        config: &'a ExecuteConfig,
        trace: &'a RunTrace,
    ) -> Self {
        Self {
            model,
            retriever,
            config,
            trace,
        }
    }

    /// Run one searcher call against the state in `slot`.
    ///
    /// The budget and deadline checks happen before any model or retriever
    /// call; a stopped call returns the accumulated outcome unchanged.
    pub async fn search(
        &self,
        slot: &mut Option<SearcherState>,
        request: SearchRequest<'_>,
    ) -> Result<SearchOutcome, MragentError> {
        let (state, episode) = SearcherState::enter(slot, self.trace.run_id());
        if episode == Episode::New {
            self.trace
                .record(COMPONENT, "new_episode", json!({ "run_id": state.run_id() }));
        }

        let cap = self.config.searcher_steps_total_cap;
        if state.total_steps() >= cap {
            debug!(total_steps = state.total_steps(), cap, "searcher budget exhausted");
            self.trace.record(
                COMPONENT,
                "budget_stop",
                json!({ "total_steps": state.total_steps(), "cap": cap }),
            );
            metrics::record_searcher_call("budget_stop");
            return Ok(state.outcome());
        }
        if self.config.deadline_passed(Utc::now()) {
            self.trace.record(
                COMPONENT,
                "deadline_stop",
                json!({ "deadline": self.config.searcher_deadline }),
            );
            metrics::record_searcher_call("deadline_stop");
            return Ok(state.outcome());
        }
        state.consume_step();
        metrics::record_searcher_call("executed");

        let sampling = self.config.searcher_sampling();
        state.push(Message::user(prompts::query_turn(
            request.question,
            request.information,
            request.suggestions,
        )));
        let raw = self.model.generate(state.conversation(), &sampling).await?;
        state.push(Message::assistant(raw.clone()));
        let proposal: QueryProposal = parse_json(COMPONENT, &raw)?;
        let mut query = proposal.search_query;
        self.trace.record(
            COMPONENT,
            "query",
            json!({
                "step": state.total_steps(),
                "query": query,
                "explanation": proposal.search_query_explanation,
            }),
        );

        for round in 1..=self.config.max_verification_same_query {
            let query_id = state.query_id_for(&query);
            let mut batch = Vec::with_capacity(BATCH_SIZE);
            while batch.len() < BATCH_SIZE {
                match self.retriever.search_next(&query).await {
                    Some(document) => batch.push(document),
                    None => break,
                }
            }
            if batch.len() < BATCH_SIZE {
                self.trace.record(
                    COMPONENT,
                    "insufficient_documents",
                    json!({ "query_id": query_id, "retrieved": batch.len() }),
                );
                break;
            }
            for document in &batch {
                state.record_document(&query, document.clone());
            }

            state.push(Message::user(prompts::judgement_turn(&query_id, &query, &batch)));
            let raw = self.model.generate(state.conversation(), &sampling).await?;
            state.push(Message::assistant(raw.clone()));
            let verdict: BatchVerdict = parse_json(COMPONENT, &raw)?;

            let mut newly_verified = 0;
            for judgement in verdict.relevance.iter().filter(|j| j.is_relevant) {
                match state.mark_verified(&query, &judgement.doc_id) {
                    Verification::NewlyVerified => newly_verified += 1,
                    Verification::AlreadyVerified => {}
                    Verification::UnknownDocument => {
                        warn!(doc_id = %judgement.doc_id, %query_id, "judgement names an unknown document");
                        self.trace.record(
                            COMPONENT,
                            "unknown_document",
                            json!({ "query_id": query_id, "doc_id": judgement.doc_id }),
                        );
                    }
                }
            }
            self.trace.record(
                COMPONENT,
                "judgement",
                json!({
                    "round": round,
                    "query_id": query_id,
                    "newly_verified": newly_verified,
                    "total_verified": state.verified_ids().len(),
                    "raw": preview(&raw),
                }),
            );

            if verdict.change_search_query {
                let next = verdict.new_search_query.trim();
                if !next.is_empty() && next != query {
                    self.trace.record(
                        COMPONENT,
                        "query_changed",
                        json!({ "from": query, "to": next }),
                    );
                    query = next.to_string();
                }
                continue;
            }
            if verdict.end_search {
                self.trace.record(COMPONENT, "end_search", json!({ "round": round }));
                break;
            }
        }

        Ok(state.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::retrieval::{CachedRetriever, InMemoryBackend, RawHit};
    use chrono::Duration;

    fn corpus(prefix: &str, count: usize) -> Vec<RawHit> {
        (0..count)
            .map(|n| RawHit::new(format!("{prefix}{n}"), format!("passage {prefix}{n}")))
            .collect()
    }

    fn retriever(count: usize) -> CachedRetriever<InMemoryBackend> {
        let backend = InMemoryBackend::new(10).with_fallback(corpus("d", count));
        CachedRetriever::new(backend, 20, 1000)
    }

    fn request() -> SearchRequest<'static> {
        SearchRequest {
            question: "Who designed the Eiffel Tower?",
            information: "",
            suggestions: "",
        }
    }

    const PROPOSAL: &str = r#"{"search_query": "eiffel tower designer", "search_query_explanation": "direct"}"#;

    #[tokio::test]
    async fn verifies_and_ends_search() {
        let llm = ScriptedLlm::new([
            PROPOSAL,
            r#"{"relevance": [{"doc_id": "0", "is_relevant": true}, {"doc_id": "3", "is_relevant": "true"}], "change_search_query": false, "new_search_query": "", "end_search": true}"#,
        ]);
        let retriever = retriever(30);
        let config = ExecuteConfig::default();
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        let outcome = Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap();

        assert!(outcome.found_information);
        assert_eq!(outcome.documents, vec!["passage d0", "passage d3"]);
        let state = slot.unwrap();
        assert_eq!(state.total_steps(), 1);
        assert_eq!(state.queries()["eiffel tower designer"].documents.len(), 5);
        assert_eq!(llm.calls(), 2);
        assert_eq!(trace.count(COMPONENT, "end_search"), 1);
    }

    #[tokio::test]
    async fn same_document_is_verified_once_across_rounds() {
        let llm = ScriptedLlm::new([
            PROPOSAL,
            r#"{"relevance": [{"doc_id": "1", "is_relevant": true}], "change_search_query": true, "new_search_query": "gustave eiffel", "end_search": false}"#,
            r#"{"relevance": [{"doc_id": "1", "is_relevant": true}, {"doc_id": "42", "is_relevant": true}], "change_search_query": false, "end_search": true}"#,
        ]);
        let retriever = retriever(30);
        let config = ExecuteConfig::default();
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        let outcome = Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap();

        // Both queries see the same fallback ranking, so "1" comes back under the new query.
        assert_eq!(outcome.documents, vec!["passage d1"]);
        let state = slot.unwrap();
        assert_eq!(state.verified_ids(), ["1".to_string()]);
        assert_eq!(state.queries().len(), 2);
        assert_eq!(state.query_for_id("1"), Some("gustave eiffel"));
        assert_eq!(trace.count(COMPONENT, "unknown_document"), 1);
        assert_eq!(trace.count(COMPONENT, "query_changed"), 1);
    }

    #[tokio::test]
    async fn insufficient_documents_stops_before_judging() {
        let llm = ScriptedLlm::new([PROPOSAL]);
        let retriever = retriever(3);
        let config = ExecuteConfig::default();
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        let outcome = Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap();

        assert!(!outcome.found_information);
        assert_eq!(llm.calls(), 1);
        assert_eq!(trace.count(COMPONENT, "insufficient_documents"), 1);
    }

    #[tokio::test]
    async fn verification_rounds_are_bounded() {
        let keep_going = r#"{"relevance": [], "change_search_query": false, "end_search": false}"#;
        let llm = ScriptedLlm::new([PROPOSAL, keep_going, keep_going, keep_going]);
        let retriever = retriever(100);
        let config = ExecuteConfig {
            max_verification_same_query: 3,
            ..ExecuteConfig::default()
        };
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 4);
        assert_eq!(llm.remaining(), 0);
        assert_eq!(trace.count(COMPONENT, "judgement"), 3);
    }

    #[tokio::test]
    async fn budget_stop_makes_no_calls_and_keeps_steps() {
        let end = r#"{"relevance": [{"doc_id": "0", "is_relevant": true}], "end_search": true}"#;
        let llm = ScriptedLlm::new([PROPOSAL, end, PROPOSAL, end]);
        let retriever = retriever(100);
        let config = ExecuteConfig {
            searcher_steps_total_cap: 2,
            ..ExecuteConfig::default()
        };
        let trace = RunTrace::new("run-1");
        let searcher = Searcher::new(&llm, &retriever, &config, &trace);
        let mut slot = None;

        let mut previous = 0;
        for _ in 0..2 {
            searcher.search(&mut slot, request()).await.unwrap();
            let steps = slot.as_ref().unwrap().total_steps();
            assert!(steps > previous);
            previous = steps;
        }
        let calls_before = llm.calls();
        let outcome = searcher.search(&mut slot, request()).await.unwrap();

        assert_eq!(llm.calls(), calls_before);
        assert_eq!(slot.as_ref().unwrap().total_steps(), 2);
        assert_eq!(outcome.documents, vec!["passage d0"]);
        assert_eq!(trace.count(COMPONENT, "budget_stop"), 1);
    }

    #[tokio::test]
    async fn past_deadline_skips_model_and_retriever() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        let backend = InMemoryBackend::new(10).with_fallback(corpus("d", 30));
        let retriever = CachedRetriever::new(backend, 20, 1000);
        let config = ExecuteConfig {
            searcher_deadline: Some(Utc::now() - Duration::seconds(1)),
            ..ExecuteConfig::default()
        };
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        let outcome = Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap();

        assert_eq!(outcome, SearchOutcome { documents: vec![], found_information: false });
        assert_eq!(llm.calls(), 0);
        assert_eq!(retriever.backend().searches(), 0);
        assert_eq!(slot.unwrap().total_steps(), 0);
        assert_eq!(trace.count(COMPONENT, "deadline_stop"), 1);
    }

    #[tokio::test]
    async fn new_run_id_starts_a_fresh_episode() {
        let end = r#"{"relevance": [{"doc_id": "0", "is_relevant": true}], "end_search": true}"#;
        let llm = ScriptedLlm::new([PROPOSAL, end]);
        let retriever = retriever(30);
        let config = ExecuteConfig::default();
        let mut slot = None;

        let first = RunTrace::new("run-a");
        Searcher::new(&llm, &retriever, &config, &first)
            .search(&mut slot, request())
            .await
            .unwrap();
        assert_eq!(slot.as_ref().unwrap().verified_ids().len(), 1);

        let second = RunTrace::new("run-b");
        let state_before = slot.clone();
        let config = ExecuteConfig {
            searcher_steps_total_cap: 0,
            ..ExecuteConfig::default()
        };
        let outcome = Searcher::new(&llm, &retriever, &config, &second)
            .search(&mut slot, request())
            .await
            .unwrap();

        assert_ne!(slot, state_before);
        assert_eq!(slot.as_ref().unwrap().run_id(), "run-b");
        assert!(!outcome.found_information);
        assert_eq!(second.count(COMPONENT, "new_episode"), 1);
    }

    #[tokio::test]
    async fn malformed_judgement_is_a_parse_error() {
        let llm = ScriptedLlm::new([PROPOSAL, "the second and fourth look useful"]);
        let retriever = retriever(30);
        let config = ExecuteConfig::default();
        let trace = RunTrace::new("run-1");
        let mut slot = None;

        let err = Searcher::new(&llm, &retriever, &config, &trace)
            .search(&mut slot, request())
            .await
            .unwrap_err();

        assert!(matches!(err, MragentError::Parse { ref context, .. } if context == "searcher"));
    }
}
