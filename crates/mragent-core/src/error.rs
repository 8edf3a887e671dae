use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Core error type for mragent.
#[derive(Debug, Error)]
pub enum MragentError {
    #[error("malformed structured output from {context}: {message}")]
    Parse { context: String, message: String },
    #[error("unrecognised agent kind `{0}`")]
    InvalidAgent(String),
    #[error("invalid input for {agent}: {message}")]
    InvalidInput { agent: String, message: String },
    #[error("language model call failed: {0}")]
    Llm(String),
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MragentError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Whether re-running the whole run with perturbed sampling can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Parse { .. } | Self::InvalidInput { .. } | Self::Llm(_) | Self::Other(_) => true,
            Self::InvalidAgent(_)
            | Self::InvalidConfiguration(_)
            | Self::MissingSecret(_)
            | Self::ConfigIo { .. } => false,
        }
    }
}

/// A coordinator run that unwound with an error.
///
/// Carries whatever answer the run had produced before failing; nothing is fabricated.
#[derive(Debug)]
pub struct RunFailure {
    pub run_id: String,
    pub error: MragentError,
    pub final_response: Option<String>,
    pub actions_taken: usize,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.error.is_retryable() {
            "retryable"
        } else {
            "terminal"
        };
        write!(
            f,
            "{kind} run failure after {} action(s): {}",
            self.actions_taken, self.error
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_agent_is_terminal_and_parse_is_retryable() {
        assert!(!MragentError::InvalidAgent("oracle".into()).is_retryable());
        assert!(MragentError::parse("coordinator", "expected value").is_retryable());
    }

    #[test]
    fn run_failure_display_mentions_class() {
        let failure = RunFailure {
            run_id: "r1".into(),
            error: MragentError::InvalidAgent("oracle".into()),
            final_response: None,
            actions_taken: 3,
        };
        let text = failure.to_string();
        assert!(text.starts_with("terminal"));
        assert!(text.contains("oracle"));
    }
}
