use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MragentError;
use crate::structured::{lenient_bool, lenient_text, parse_json};

/// Every agent the coordinator can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Validator,
    Summarizer,
    Planner,
    Reasoner,
    ComplexSearcher,
    Searcher,
    Answerer,
    Reviser,
    Finisher,
}

impl AgentKind {
    pub const ALL: [AgentKind; 9] = [
        AgentKind::Validator,
        AgentKind::Summarizer,
        AgentKind::Planner,
        AgentKind::Reasoner,
        AgentKind::ComplexSearcher,
        AgentKind::Searcher,
        AgentKind::Answerer,
        AgentKind::Reviser,
        AgentKind::Finisher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Validator => "validator",
            AgentKind::Summarizer => "summarizer",
            AgentKind::Planner => "planner",
            AgentKind::Reasoner => "reasoner",
            AgentKind::ComplexSearcher => "complex_searcher",
            AgentKind::Searcher => "searcher",
            AgentKind::Answerer => "answerer",
            AgentKind::Reviser => "reviser",
            AgentKind::Finisher => "finisher",
        }
    }

    /// Key of the private conversation log this agent appends to.
    ///
    /// The answerer and the reviser share one log so revisions see the draft.
    pub fn log_key(self) -> &'static str {
        match self {
            AgentKind::Answerer | AgentKind::Reviser => "generator",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = MragentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().to_ascii_lowercase();
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| MragentError::InvalidAgent(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidatorInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
    #[serde(deserialize_with = "lenient_text")]
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummarizerInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannerInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReasonerInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
    #[serde(deserialize_with = "lenient_text")]
    pub aspect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComplexSearcherInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearcherInput {
    #[serde(deserialize_with = "lenient_text")]
    pub information: String,
    #[serde(deserialize_with = "lenient_text")]
    pub suggestions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswererInput {
    #[serde(deserialize_with = "lenient_text")]
    pub guidance: String,
    #[serde(deserialize_with = "lenient_text")]
    pub important_information: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviserInput {
    #[serde(deserialize_with = "lenient_text")]
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinisherInput {
    #[serde(default = "finished_by_default", deserialize_with = "lenient_bool")]
    pub finished: bool,
}

const fn finished_by_default() -> bool {
    true
}

/// A coordinator decision with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
    Validator(ValidatorInput),
    Summarizer(SummarizerInput),
    Planner(PlannerInput),
    Reasoner(ReasonerInput),
    ComplexSearcher(ComplexSearcherInput),
    Searcher(SearcherInput),
    Answerer(AnswererInput),
    Reviser(ReviserInput),
    Finisher(FinisherInput),
}

impl AgentAction {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentAction::Validator(_) => AgentKind::Validator,
            AgentAction::Summarizer(_) => AgentKind::Summarizer,
            AgentAction::Planner(_) => AgentKind::Planner,
            AgentAction::Reasoner(_) => AgentKind::Reasoner,
            AgentAction::ComplexSearcher(_) => AgentKind::ComplexSearcher,
            AgentAction::Searcher(_) => AgentKind::Searcher,
            AgentAction::Answerer(_) => AgentKind::Answerer,
            AgentAction::Reviser(_) => AgentKind::Reviser,
            AgentAction::Finisher(_) => AgentKind::Finisher,
        }
    }

    /// Decode `input` as the payload of `kind`.
    pub fn from_parts(kind: AgentKind, input: Value) -> Result<Self, MragentError> {
        Ok(match kind {
            AgentKind::Validator => AgentAction::Validator(payload(kind, input)?),
            AgentKind::Summarizer => AgentAction::Summarizer(payload(kind, input)?),
            AgentKind::Planner => AgentAction::Planner(payload(kind, input)?),
            AgentKind::Reasoner => AgentAction::Reasoner(payload(kind, input)?),
            AgentKind::ComplexSearcher => AgentAction::ComplexSearcher(payload(kind, input)?),
            AgentKind::Searcher => AgentAction::Searcher(payload(kind, input)?),
            AgentKind::Answerer => AgentAction::Answerer(payload(kind, input)?),
            AgentKind::Reviser => AgentAction::Reviser(payload(kind, input)?),
            AgentKind::Finisher => AgentAction::Finisher(payload(kind, input)?),
        })
    }
}

fn payload<T: DeserializeOwned>(kind: AgentKind, input: Value) -> Result<T, MragentError> {
    let input = match input {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(input).map_err(|err| MragentError::invalid_input(kind.as_str(), err.to_string()))
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(deserialize_with = "lenient_text")]
    agent: String,
    #[serde(default)]
    input: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    reason: String,
}

/// One parsed coordinator turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEnvelope {
    pub action: AgentAction,
    pub reason: String,
}

impl ActionEnvelope {
    /// Parse raw coordinator output.
    ///
    /// Malformed JSON is [`MragentError::Parse`], an unrecognised agent name is
    /// [`MragentError::InvalidAgent`] and a payload missing required fields is
    /// [`MragentError::InvalidInput`].
    pub fn parse(raw: &str) -> Result<Self, MragentError> {
        let raw_action: RawAction = parse_json("coordinator", raw)?;
        let kind: AgentKind = raw_action.agent.parse()?;
        Ok(Self {
            action: AgentAction::from_parts(kind, raw_action.input)?,
            reason: raw_action.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_agent_name() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), kind);
        }
        assert_eq!(" Complex_Searcher ".parse::<AgentKind>().unwrap(), AgentKind::ComplexSearcher);
    }

    #[test]
    fn unknown_agent_is_not_a_parse_error() {
        let err = ActionEnvelope::parse(r#"{"agent": "translator", "input": {}, "reason": "x"}"#)
            .unwrap_err();
        assert!(matches!(err, MragentError::InvalidAgent(ref name) if name == "translator"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ActionEnvelope::parse("I think the searcher should go next").unwrap_err();
        assert!(matches!(err, MragentError::Parse { .. }));
    }

    #[test]
    fn missing_required_field_is_invalid_input() {
        let err = ActionEnvelope::parse(r#"{"agent": "reasoner", "input": {"information": "x"}}"#)
            .unwrap_err();
        assert!(matches!(err, MragentError::InvalidInput { ref agent, .. } if agent == "reasoner"));
    }

    #[test]
    fn searcher_payload_accepts_lists_as_text() {
        let envelope = ActionEnvelope::parse(
            r#"```json
{"agent": "searcher", "input": {"information": "", "suggestions": ["try the architect"]}, "reason": "need documents"}
```"#,
        )
        .unwrap();
        assert_eq!(envelope.reason, "need documents");
        match envelope.action {
            AgentAction::Searcher(input) => assert_eq!(input.suggestions, "[\"try the architect\"]"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn finisher_without_input_defaults_to_finished() {
        let envelope = ActionEnvelope::parse(r#"{"agent": "finisher", "reason": "done"}"#).unwrap();
        assert_eq!(
            envelope.action,
            AgentAction::Finisher(FinisherInput { finished: true })
        );
    }

    #[test]
    fn answerer_and_reviser_share_a_log() {
        assert_eq!(AgentKind::Answerer.log_key(), AgentKind::Reviser.log_key());
        assert_eq!(AgentKind::ComplexSearcher.log_key(), "complex_searcher");
    }
}
