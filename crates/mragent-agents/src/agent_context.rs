//! Single-turn exchange shared by every specialist.
//!
//! A specialist owns one conversation log per run. Each call seeds the log
//! with the agent's system prompt on first use, appends the user turn, asks
//! the model once, appends the raw completion and parses it.

use mragent_core::llm::{LanguageModel, Message, SamplingOptions};
use mragent_core::structured::parse_json;
use mragent_core::trace::preview;
use mragent_core::{AgentKind, MragentError, SpecialistCall};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

/// Model and sampling bound to one agent for one call.
pub struct AgentContext<'a> {
    pub agent: AgentKind,
    pub model: &'a dyn LanguageModel,
    pub options: SamplingOptions,
}

impl<'a> AgentContext<'a> {
    pub fn new(agent: AgentKind, model: &'a dyn LanguageModel, options: SamplingOptions) -> Self {
        Self {
            agent,
            model,
            options,
        }
    }

    pub async fn exchange<T: DeserializeOwned>(
        &self,
        call: &mut SpecialistCall<'_>,
        system: &str,
        user: String,
    ) -> Result<T, MragentError> {
        if call.log.is_empty() {
            call.log.push(Message::system(system));
        }
        call.log.push(Message::user(user));
        debug!(
            agent = %self.agent,
            model = self.model.model_name(),
            turns = call.log.len(),
            "specialist turn"
        );

        let raw = self.model.generate(call.log.as_slice(), &self.options).await?;
        call.log.push(Message::assistant(raw.clone()));
        call.trace.record(
            self.agent.as_str(),
            "completion",
            json!({ "preview": preview(&raw) }),
        );
        parse_json(self.agent.as_str(), &raw)
    }
}
