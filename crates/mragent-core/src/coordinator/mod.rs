//! The coordinator control loop.
//!
//! Each turn the agent model picks one agent; the choice is parsed into an
//! [`AgentAction`], dispatched with an exhaustive match, and its result is
//! fed back as the next user turn. The loop ends when the finisher is chosen
//! or when `max_actions` turns have been dispatched.

mod action;
mod prompts;

pub use action::{
    ActionEnvelope, AgentAction, AgentKind, AnswererInput, ComplexSearcherInput, FinisherInput,
    PlannerInput, ReasonerInput, ReviserInput, SearcherInput, SummarizerInput, ValidatorInput,
};
pub use prompts::{ExperienceRoute, initial_conversation, system_prompt};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExecuteConfig;
use crate::events::EventCollector;
use crate::llm::{Conversation, DynLanguageModel, Message};
use crate::memory::RunMemory;
use crate::metrics;
use crate::retrieval::{Document, DynRetriever, Retriever};
use crate::searcher::{SearchRequest, Searcher};
use crate::specialists::{DynSpecialists, SpecialistCall};
use crate::trace::{RunTrace, TraceEvent, preview};
use crate::{MragentError, RunFailure};

const COMPONENT: &str = "coordinator";

/// Input for one coordinator run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub question: String,
    /// Fresh UUID when absent.
    pub run_id: Option<String>,
    pub experience: Option<ExperienceRoute>,
    /// Caller-held trace handle; a private one is created when absent.
    /// Its run id takes precedence over `run_id`.
    pub trace: Option<RunTrace>,
}

impl RunRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            run_id: None,
            experience: None,
            trace: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_experience(mut self, experience: ExperienceRoute) -> Self {
        self.experience = Some(experience);
        self
    }

    pub fn with_trace(mut self, trace: RunTrace) -> Self {
        self.trace = Some(trace);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Finished,
    ActionBudgetExhausted,
}

/// Snapshot handed back when a run terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: String,
    pub question: String,
    pub conversation: Conversation,
    pub verified_documents: Vec<Document>,
    pub response: Option<String>,
    pub memory: RunMemory,
    pub actions_taken: usize,
    pub termination: Termination,
    pub duration_ms: u64,
    #[serde(default)]
    pub trace: Vec<TraceEvent>,
}

/// Mutable state of one run, owned by [`Coordinator::run_with_config`].
struct RunState {
    conversation: Conversation,
    /// Cursors private to this run over the shared identity map.
    retriever: DynRetriever,
    memory: RunMemory,
    actions_taken: usize,
}

pub struct Coordinator {
    agent_model: DynLanguageModel,
    retriever: DynRetriever,
    specialists: DynSpecialists,
    config: ExecuteConfig,
    events: Option<EventCollector>,
}

impl Coordinator {
    pub fn new(
        agent_model: DynLanguageModel,
        retriever: DynRetriever,
        specialists: DynSpecialists,
        config: ExecuteConfig,
    ) -> Self {
        Self {
            agent_model,
            retriever,
            specialists,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventCollector) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ExecuteConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutput, RunFailure> {
        self.run_with_config(request, &self.config).await
    }

    /// Run once with `config` in place of the coordinator's own execution settings.
    pub async fn run_with_config(
        &self,
        request: RunRequest,
        config: &ExecuteConfig,
    ) -> Result<RunOutput, RunFailure> {
        let started = Instant::now();
        let trace = match (request.trace, request.run_id) {
            (Some(trace), _) => trace,
            (None, Some(run_id)) => RunTrace::new(run_id),
            (None, None) => RunTrace::new(Uuid::new_v4().to_string()),
        };
        let run_id = trace.run_id().to_string();
        let question = request.question;

        let mut state = RunState {
            conversation: initial_conversation(
                &question,
                config.concise,
                request.experience.as_ref(),
            ),
            retriever: self.retriever.fresh_cursors(),
            memory: RunMemory::new(),
            actions_taken: 0,
        };
        info!(%run_id, model = self.agent_model.model_name(), "coordinator run started");
        trace.record(
            COMPONENT,
            "run_started",
            json!({ "question": question, "informed": request.experience.is_some() }),
        );

        match self.drive(&question, &mut state, config, &trace).await {
            Ok(termination) => {
                let response = state.memory.final_response().map(str::to_string);
                trace.record(
                    COMPONENT,
                    "run_finished",
                    json!({
                        "termination": termination,
                        "actions_taken": state.actions_taken,
                        "has_response": response.is_some(),
                    }),
                );
                info!(
                    %run_id,
                    actions = state.actions_taken,
                    ?termination,
                    verified = state.memory.verified_documents().len(),
                    "coordinator run finished"
                );
                Ok(RunOutput {
                    run_id,
                    question,
                    conversation: state.conversation,
                    verified_documents: state.memory.verified_documents().to_vec(),
                    response,
                    memory: state.memory,
                    actions_taken: state.actions_taken,
                    termination,
                    duration_ms: started.elapsed().as_millis() as u64,
                    trace: trace.events(),
                })
            }
            Err(error) => {
                warn!(%run_id, actions = state.actions_taken, error = %error, "coordinator run failed");
                trace.record(
                    COMPONENT,
                    "run_failed",
                    json!({ "error": error.to_string(), "actions_taken": state.actions_taken }),
                );
                Err(RunFailure {
                    run_id,
                    error,
                    final_response: state.memory.final_response().map(str::to_string),
                    actions_taken: state.actions_taken,
                })
            }
        }
    }

    async fn drive(
        &self,
        question: &str,
        state: &mut RunState,
        config: &ExecuteConfig,
        trace: &RunTrace,
    ) -> Result<Termination, MragentError> {
        let sampling = config.agent_sampling();
        while state.actions_taken < config.max_actions {
            let raw = self
                .agent_model
                .generate(&state.conversation, &sampling)
                .await?;
            let envelope = ActionEnvelope::parse(&raw)?;
            state.conversation.push(Message::assistant(raw));

            let kind = envelope.action.kind();
            let turn = state.actions_taken + 1;
            debug!(turn, agent = %kind, reason = %envelope.reason, "dispatching");
            trace.record(
                COMPONENT,
                "dispatch",
                json!({ "turn": turn, "agent": kind, "reason": envelope.reason }),
            );
            metrics::record_action(kind.as_str());
            if let Some(events) = &self.events {
                events.emit_action(trace.run_id(), turn, kind);
            }

            let result = self
                .dispatch(
                    question,
                    envelope.action,
                    &mut state.memory,
                    state.retriever.as_ref(),
                    config,
                    trace,
                )
                .await?;
            state.actions_taken = turn;
            match result {
                None => return Ok(Termination::Finished),
                Some(value) => {
                    let rendered = value.to_string();
                    trace.record(
                        COMPONENT,
                        "result",
                        json!({ "turn": turn, "agent": kind, "output": preview(&rendered) }),
                    );
                    state.conversation.push(Message::user(rendered));
                }
            }
        }
        trace.record(
            COMPONENT,
            "action_budget_exhausted",
            json!({ "max_actions": config.max_actions }),
        );
        Ok(Termination::ActionBudgetExhausted)
    }

    /// Route one action to its handler. Only the finisher yields `None`.
    async fn dispatch(
        &self,
        question: &str,
        action: AgentAction,
        memory: &mut RunMemory,
        retriever: &dyn Retriever,
        config: &ExecuteConfig,
        trace: &RunTrace,
    ) -> Result<Option<Value>, MragentError> {
        let kind = action.kind();
        let output = match action {
            AgentAction::Validator(input) => {
                let call = specialist_call(question, memory, kind, config, trace);
                self.specialists.validate(call, &input).await?
            }
            AgentAction::Summarizer(input) => {
                let call = specialist_call(question, memory, kind, config, trace);
                self.specialists.summarize(call, &input).await?
            }
            AgentAction::Planner(input) => {
                let call = specialist_call(question, memory, kind, config, trace);
                self.specialists.plan(call, &input).await?
            }
            AgentAction::Reasoner(input) => {
                let call = specialist_call(question, memory, kind, config, trace);
                self.specialists.reason(call, &input).await?
            }
            AgentAction::ComplexSearcher(input) => {
                self.complex_search(question, &input, memory, retriever, config, trace)
                    .await?
            }
            AgentAction::Searcher(input) => {
                let outcome = self
                    .searcher(retriever, config, trace)
                    .search(
                        memory.searcher_slot(),
                        SearchRequest {
                            question,
                            information: &input.information,
                            suggestions: &input.suggestions,
                        },
                    )
                    .await?;
                to_value(&outcome)?
            }
            AgentAction::Answerer(input) => {
                let documents = memory.verified_documents().to_vec();
                let call = specialist_call(question, memory, kind, config, trace);
                let generated = self.specialists.answer(call, &input, &documents).await?;
                memory.record_response(generated.response.clone());
                to_value(&generated)?
            }
            AgentAction::Reviser(input) => {
                let call = specialist_call(question, memory, kind, config, trace);
                let generated = self.specialists.revise(call, &input).await?;
                memory.record_response(generated.response.clone());
                to_value(&generated)?
            }
            AgentAction::Finisher(input) => {
                if !input.finished {
                    debug!("finisher chosen with finished=false; ending the run anyway");
                }
                return Ok(None);
            }
        };
        Ok(Some(output))
    }

    /// Decompose the question, then search either the question itself or
    /// each sub-question in order. All searches share the run's searcher
    /// state, so sub-questions draw on one step budget.
    async fn complex_search(
        &self,
        question: &str,
        input: &ComplexSearcherInput,
        memory: &mut RunMemory,
        retriever: &dyn Retriever,
        config: &ExecuteConfig,
        trace: &RunTrace,
    ) -> Result<Value, MragentError> {
        let call = specialist_call(question, memory, AgentKind::ComplexSearcher, config, trace);
        let decomposition = self.specialists.decompose(call, input).await?;
        memory.set_sub_questions(decomposition.sub_questions.clone());
        let searcher = self.searcher(retriever, config, trace);

        if !decomposition.is_multi() {
            trace.record("complex_searcher", "single", json!({ "question": question }));
            let outcome = searcher
                .search(
                    memory.searcher_slot(),
                    SearchRequest {
                        question,
                        information: &input.information,
                        suggestions: "",
                    },
                )
                .await?;
            return Ok(json!({
                "mode": "single",
                "used_question": question,
                "found_information": outcome.found_information,
                "num_documents": outcome.documents.len(),
            }));
        }

        let before = memory.verified_documents().len();
        trace.record(
            "complex_searcher",
            "multi",
            json!({ "sub_questions": decomposition.sub_questions.len() }),
        );
        for sub_question in &decomposition.sub_questions {
            searcher
                .search(
                    memory.searcher_slot(),
                    SearchRequest {
                        question: &sub_question.sub_question,
                        information: "",
                        suggestions: &sub_question.reason,
                    },
                )
                .await?;
        }
        let total = memory.verified_documents().len();
        Ok(json!({
            "mode": "multi",
            "num_sub_questions": decomposition.sub_questions.len(),
            "sub_questions": decomposition.sub_questions,
            "num_new_documents": total - before,
            "total_documents": total,
        }))
    }

    fn searcher<'a>(
        &'a self,
        retriever: &'a dyn Retriever,
        config: &'a ExecuteConfig,
        trace: &'a RunTrace,
    ) -> Searcher<'a> {
        Searcher::new(self.agent_model.as_ref(), retriever, config, trace)
    }
}

fn specialist_call<'a>(
    question: &'a str,
    memory: &'a mut RunMemory,
    kind: AgentKind,
    config: &'a ExecuteConfig,
    trace: &'a RunTrace,
) -> SpecialistCall<'a> {
    SpecialistCall {
        question,
        log: memory.log_mut(kind.log_key()),
        config,
        trace,
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, MragentError> {
    serde_json::to_value(value).map_err(|err| MragentError::Other(err.into()))
}
