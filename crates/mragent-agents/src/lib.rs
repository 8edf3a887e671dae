//! Prompt-driven specialist agents.
//!
//! [`LlmSpecialists`] implements the core [`Specialists`] contract. The
//! validator, summarizer, planner, reasoner and question decomposer run on the
//! agent model; the answerer and reviser run on the environment model.

pub mod agent_context;
pub mod decomposer;
pub mod generator;
pub mod planner;
pub mod reasoner;
pub mod summarizer;
pub mod validator;

pub use agent_context::AgentContext;
pub use planner::Plan;
pub use reasoner::Analysis;
pub use summarizer::Summary;
pub use validator::ValidationVerdict;

use async_trait::async_trait;
use mragent_core::coordinator::{
    AnswererInput, ComplexSearcherInput, PlannerInput, ReasonerInput, ReviserInput,
    SummarizerInput, ValidatorInput,
};
use mragent_core::llm::DynLanguageModel;
use mragent_core::retrieval::Document;
use mragent_core::{
    AgentKind, Decomposition, GeneratedResponse, MragentError, SpecialistCall, Specialists,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub struct LlmSpecialists {
    agent_model: DynLanguageModel,
    environment_model: DynLanguageModel,
}

impl LlmSpecialists {
    pub fn new(agent_model: DynLanguageModel, environment_model: DynLanguageModel) -> Self {
        Self {
            agent_model,
            environment_model,
        }
    }

    /// One model for every specialist.
    pub fn shared(model: DynLanguageModel) -> Self {
        Self::new(model.clone(), model)
    }

    fn agent<'a>(&'a self, kind: AgentKind, call: &SpecialistCall<'_>) -> AgentContext<'a> {
        AgentContext::new(
            kind,
            self.agent_model.as_ref(),
            call.config.specialist_sampling(),
        )
    }

    fn environment<'a>(&'a self, kind: AgentKind, call: &SpecialistCall<'_>) -> AgentContext<'a> {
        AgentContext::new(
            kind,
            self.environment_model.as_ref(),
            call.config.environment_sampling(),
        )
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, MragentError> {
    serde_json::to_value(value).map_err(|err| MragentError::Other(err.into()))
}

#[async_trait]
impl Specialists for LlmSpecialists {
    async fn validate(
        &self,
        mut call: SpecialistCall<'_>,
        input: &ValidatorInput,
    ) -> Result<Value, MragentError> {
        let context = self.agent(AgentKind::Validator, &call);
        let prompt = validator::user_prompt(call.question, input);
        let verdict: ValidationVerdict = context
            .exchange(&mut call, validator::SYSTEM_PROMPT, prompt)
            .await?;
        info!(is_valid = verdict.is_valid, "validator verdict");
        to_value(verdict)
    }

    async fn summarize(
        &self,
        mut call: SpecialistCall<'_>,
        input: &SummarizerInput,
    ) -> Result<Value, MragentError> {
        let context = self.agent(AgentKind::Summarizer, &call);
        let prompt = summarizer::user_prompt(call.question, input);
        let summary: Summary = context
            .exchange(&mut call, summarizer::SYSTEM_PROMPT, prompt)
            .await?;
        to_value(summary)
    }

    async fn plan(
        &self,
        mut call: SpecialistCall<'_>,
        input: &PlannerInput,
    ) -> Result<Value, MragentError> {
        let context = self.agent(AgentKind::Planner, &call);
        let prompt = planner::user_prompt(call.question, input);
        let plan: Plan = context
            .exchange(&mut call, planner::SYSTEM_PROMPT, prompt)
            .await?;
        to_value(plan)
    }

    async fn reason(
        &self,
        mut call: SpecialistCall<'_>,
        input: &ReasonerInput,
    ) -> Result<Value, MragentError> {
        let context = self.agent(AgentKind::Reasoner, &call);
        let prompt = reasoner::user_prompt(call.question, input);
        let analysis: Analysis = context
            .exchange(&mut call, reasoner::SYSTEM_PROMPT, prompt)
            .await?;
        to_value(analysis)
    }

    async fn decompose(
        &self,
        mut call: SpecialistCall<'_>,
        input: &ComplexSearcherInput,
    ) -> Result<Decomposition, MragentError> {
        let context = self.agent(AgentKind::ComplexSearcher, &call);
        let prompt = decomposer::user_prompt(call.question, input);
        let decomposition: Decomposition = context
            .exchange(&mut call, decomposer::SYSTEM_PROMPT, prompt)
            .await?;
        info!(
            should_split = decomposition.should_split,
            sub_questions = decomposition.sub_questions.len(),
            "question decomposed"
        );
        Ok(decomposition)
    }

    async fn answer(
        &self,
        mut call: SpecialistCall<'_>,
        input: &AnswererInput,
        documents: &[Document],
    ) -> Result<GeneratedResponse, MragentError> {
        let context = self.environment(AgentKind::Answerer, &call);
        let prompt = generator::answer_prompt(call.question, input, documents, call.config.concise);
        context
            .exchange(&mut call, generator::SYSTEM_PROMPT, prompt)
            .await
    }

    async fn revise(
        &self,
        mut call: SpecialistCall<'_>,
        input: &ReviserInput,
    ) -> Result<GeneratedResponse, MragentError> {
        let context = self.environment(AgentKind::Reviser, &call);
        context
            .exchange(&mut call, generator::SYSTEM_PROMPT, generator::revise_prompt(input))
            .await
    }
}
