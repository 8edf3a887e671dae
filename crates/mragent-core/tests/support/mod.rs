#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mragent_core::coordinator::{
    AnswererInput, ComplexSearcherInput, PlannerInput, ReasonerInput, ReviserInput,
    SummarizerInput, ValidatorInput,
};
use mragent_core::llm::{Message, Role, ScriptedLlm};
use mragent_core::retrieval::{CachedRetriever, Document, InMemoryBackend, RawHit};
use mragent_core::{
    Coordinator, Decomposition, ExecuteConfig, GeneratedResponse, MragentError, SpecialistCall,
    Specialists,
};
use serde_json::{Value, json};

/// Specialists that answer without a model and count their calls.
pub struct CannedSpecialists {
    decomposition: Decomposition,
    pub calls: AtomicUsize,
}

impl CannedSpecialists {
    pub fn new() -> Self {
        Self::with_decomposition(Decomposition::single())
    }

    pub fn with_decomposition(decomposition: Decomposition) -> Self {
        Self {
            decomposition,
            calls: AtomicUsize::new(0),
        }
    }

    fn note(&self, mut call: SpecialistCall<'_>, output: &Value) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        call.log.push(Message::user(call.question));
        call.log.push(Message::assistant(output.to_string()));
    }
}

#[async_trait]
impl Specialists for CannedSpecialists {
    async fn validate(
        &self,
        call: SpecialistCall<'_>,
        _input: &ValidatorInput,
    ) -> Result<Value, MragentError> {
        let output = json!({ "is_correctly_answered": true });
        self.note(call, &output);
        Ok(output)
    }

    async fn summarize(
        &self,
        call: SpecialistCall<'_>,
        input: &SummarizerInput,
    ) -> Result<Value, MragentError> {
        let output = json!({ "summary": input.information });
        self.note(call, &output);
        Ok(output)
    }

    async fn plan(
        &self,
        call: SpecialistCall<'_>,
        _input: &PlannerInput,
    ) -> Result<Value, MragentError> {
        let output = json!({ "plan": "search, answer, finish" });
        self.note(call, &output);
        Ok(output)
    }

    async fn reason(
        &self,
        call: SpecialistCall<'_>,
        input: &ReasonerInput,
    ) -> Result<Value, MragentError> {
        let output = json!({ "analysis": input.aspect });
        self.note(call, &output);
        Ok(output)
    }

    async fn decompose(
        &self,
        call: SpecialistCall<'_>,
        _input: &ComplexSearcherInput,
    ) -> Result<Decomposition, MragentError> {
        let output = serde_json::to_value(&self.decomposition).unwrap();
        self.note(call, &output);
        Ok(self.decomposition.clone())
    }

    async fn answer(
        &self,
        call: SpecialistCall<'_>,
        input: &AnswererInput,
        documents: &[Document],
    ) -> Result<GeneratedResponse, MragentError> {
        let response = format!("{} ({} documents)", input.important_information, documents.len());
        self.note(call, &json!({ "response": response }));
        Ok(GeneratedResponse { response })
    }

    async fn revise(
        &self,
        call: SpecialistCall<'_>,
        input: &ReviserInput,
    ) -> Result<GeneratedResponse, MragentError> {
        let previous = call
            .log
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let response = format!("{} [revised after {} chars]", input.suggestion, previous.len());
        self.note(call, &json!({ "response": response }));
        Ok(GeneratedResponse { response })
    }
}

pub fn corpus(count: usize) -> Vec<RawHit> {
    (0..count)
        .map(|n| RawHit::new(format!("wiki-{n}"), format!("passage number {n}")))
        .collect()
}

pub fn retriever(count: usize) -> Arc<CachedRetriever<InMemoryBackend>> {
    let backend = InMemoryBackend::new(10).with_fallback(corpus(count));
    Arc::new(CachedRetriever::new(backend, 20, 1000))
}

pub fn coordinator(
    llm: Arc<ScriptedLlm>,
    specialists: Arc<CannedSpecialists>,
    config: ExecuteConfig,
) -> Coordinator {
    Coordinator::new(llm, retriever(50), specialists, config)
}

pub fn action(agent: &str, input: Value) -> String {
    format!(
        "```json\n{}\n```",
        json!({ "agent": agent, "input": input, "reason": format!("use {agent}") })
    )
}

pub fn answerer(important: &str) -> String {
    action(
        "answerer",
        json!({ "guidance": "one sentence", "important_information": important }),
    )
}

pub fn finisher() -> String {
    action("finisher", json!({ "finished": true }))
}

pub fn proposal(query: &str) -> String {
    json!({ "search_query": query, "search_query_explanation": "test" }).to_string() + "<ENDJSON>"
}

pub fn judgement(relevant: &[&str]) -> String {
    let relevance: Vec<Value> = relevant
        .iter()
        .map(|id| json!({ "doc_id": id, "is_relevant": true, "explanation": "on topic" }))
        .collect();
    json!({
        "relevance": relevance,
        "change_search_query": false,
        "new_search_query": "",
        "end_search": true,
    })
    .to_string()
}

/// Parsed result turns the coordinator fed back to the model.
pub fn results(conversation: &[Message]) -> Vec<Value> {
    conversation
        .iter()
        .filter(|message| message.role == Role::User)
        .filter_map(|message| serde_json::from_str(&message.content).ok())
        .collect()
}
