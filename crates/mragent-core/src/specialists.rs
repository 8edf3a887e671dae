//! The seam between the coordinator and the specialist agents.
//!
//! Specialists are single-turn model calls that own one private
//! conversation log each. The coordinator hands them that log, the run
//! question and the sampling configuration; implementations live in the
//! `mragent-agents` crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MragentError;
use crate::config::ExecuteConfig;
use crate::coordinator::{
    AnswererInput, ComplexSearcherInput, PlannerInput, ReasonerInput, ReviserInput,
    SummarizerInput, ValidatorInput,
};
use crate::llm::Conversation;
use crate::retrieval::Document;
use crate::structured::{lenient_bool, lenient_text};
use crate::trace::RunTrace;

/// Everything a specialist needs for one call.
pub struct SpecialistCall<'a> {
    pub question: &'a str,
    /// The agent's private log, empty on its first call in a run.
    pub log: &'a mut Conversation,
    pub config: &'a ExecuteConfig,
    pub trace: &'a RunTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestion {
    #[serde(default)]
    pub id: Value,
    #[serde(deserialize_with = "lenient_text")]
    pub sub_question: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reason: String,
}

/// Decomposer verdict for the complex searcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    #[serde(default = "split_by_default", deserialize_with = "lenient_bool")]
    pub should_split: bool,
    #[serde(default)]
    pub sub_questions: Vec<SubQuestion>,
}

const fn split_by_default() -> bool {
    true
}

impl Decomposition {
    /// No split: search the original question once.
    pub fn single() -> Self {
        Self {
            should_split: false,
            sub_questions: Vec::new(),
        }
    }

    pub fn is_multi(&self) -> bool {
        self.should_split && !self.sub_questions.is_empty()
    }
}

/// Output of the answerer and the reviser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    #[serde(deserialize_with = "lenient_text")]
    pub response: String,
}

#[async_trait]
pub trait Specialists: Send + Sync {
    async fn validate(
        &self,
        call: SpecialistCall<'_>,
        input: &ValidatorInput,
    ) -> Result<Value, MragentError>;

    async fn summarize(
        &self,
        call: SpecialistCall<'_>,
        input: &SummarizerInput,
    ) -> Result<Value, MragentError>;

    async fn plan(&self, call: SpecialistCall<'_>, input: &PlannerInput)
    -> Result<Value, MragentError>;

    async fn reason(
        &self,
        call: SpecialistCall<'_>,
        input: &ReasonerInput,
    ) -> Result<Value, MragentError>;

    /// Split the run question into independent sub-questions, or decline to.
    async fn decompose(
        &self,
        call: SpecialistCall<'_>,
        input: &ComplexSearcherInput,
    ) -> Result<Decomposition, MragentError>;

    /// Draft a response grounded in the verified documents.
    async fn answer(
        &self,
        call: SpecialistCall<'_>,
        input: &AnswererInput,
        documents: &[Document],
    ) -> Result<GeneratedResponse, MragentError>;

    async fn revise(
        &self,
        call: SpecialistCall<'_>,
        input: &ReviserInput,
    ) -> Result<GeneratedResponse, MragentError>;
}

pub type DynSpecialists = Arc<dyn Specialists>;
