//! mragent core: a coordinator model drives specialist agents through a
//! retrieval-augmented question-answering loop.
//!
//! The coordinator picks one agent per turn; the searcher sub-protocol finds
//! and verifies documents; the scoring adapter grades the final answer. The
//! language model and the retrieval backend are collaborators behind the
//! [`llm::LanguageModel`] and [`retrieval::Retriever`] traits.

pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod events;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod retrieval;
pub mod runner;
pub mod scoring;
pub mod searcher;
pub mod security;
pub mod specialists;
pub mod structured;
pub mod telemetry;
pub mod trace;

pub use config::{Config, ConfigLoader, ExecuteConfig};
pub use coordinator::{
    AgentAction, AgentKind, Coordinator, ExperienceRoute, RunOutput, RunRequest, Termination,
};
pub use dataset::{BatchItem, load_questions};
pub use error::{MragentError, RunFailure};
pub use eval::{EvaluationHarness, EvaluationMetrics};
pub use events::{Event, EventCollector, RunOutcome};
pub use logging::{RunLogInput, log_run_completion};
pub use memory::RunMemory;
pub use orchestrator::{BatchConfig, BatchOrchestrator, BatchRecord, BatchReport};
pub use runner::{RunReport, run_with_retries};
pub use scoring::{ScoreCard, score};
pub use searcher::{SearchOutcome, SearcherState};
pub use security::{SecretValue, require_env};
pub use specialists::{Decomposition, GeneratedResponse, SpecialistCall, Specialists, SubQuestion};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{RunTrace, TraceEvent, TraceSummary, persist_trace};
