//! Run-level retry policy layered over [`Coordinator`].

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordinator::{Coordinator, RunOutput, RunRequest};
use crate::metrics;

/// Outcome of a run after retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub question: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub attempts: usize,
    pub output: Option<RunOutput>,
    /// `final_response` of the last failed attempt when no attempt succeeded.
    pub final_response: Option<String>,
}

impl RunReport {
    /// The answer to report: from the successful output, else from the last failure.
    pub fn response(&self) -> Option<&str> {
        self.output
            .as_ref()
            .and_then(|output| output.response.as_deref())
            .or(self.final_response.as_deref())
    }
}

/// Run `request` up to `max_retries` times, nudging temperatures up after
/// every failed attempt.
///
/// With `require_documents`, an attempt that finishes without verified
/// documents is recorded as an error but kept; it is reported as the result
/// when no later attempt does better. Errors that cannot improve on retry
/// stop the loop early.
pub async fn run_with_retries(coordinator: &Coordinator, request: RunRequest) -> RunReport {
    let started = Instant::now();
    let mut config = coordinator.config().clone();
    let attempts_allowed = config.max_retries.max(1);
    let mut errors = Vec::new();
    let mut fallback: Option<RunOutput> = None;
    let mut final_response = None;
    let mut attempts = 0;

    while attempts < attempts_allowed {
        attempts += 1;
        match coordinator.run_with_config(request.clone(), &config).await {
            Ok(output) if config.require_documents && output.verified_documents.is_empty() => {
                warn!(attempt = attempts, run_id = %output.run_id, "run finished without verified documents");
                errors.push(format!(
                    "attempt {attempts}: run finished without verified documents"
                ));
                fallback = Some(output);
            }
            Ok(output) => {
                info!(attempt = attempts, run_id = %output.run_id, "run succeeded");
                return finish(
                    RunReport {
                        question: request.question,
                        success: true,
                        errors,
                        attempts,
                        output: Some(output),
                        final_response: None,
                    },
                    started,
                );
            }
            Err(failure) => {
                warn!(attempt = attempts, error = %failure, "run attempt failed");
                errors.push(format!("attempt {attempts}: {}", failure.error));
                final_response = failure.final_response;
                if !failure.error.is_retryable() {
                    break;
                }
            }
        }
        config = config.perturbed();
    }

    let report = match fallback {
        Some(output) => RunReport {
            question: request.question,
            success: true,
            errors,
            attempts,
            output: Some(output),
            final_response: None,
        },
        None => RunReport {
            question: request.question,
            success: false,
            errors,
            attempts,
            output: None,
            final_response,
        },
    };
    finish(report, started)
}

fn finish(report: RunReport, started: Instant) -> RunReport {
    metrics::record_run(
        report.success,
        report.attempts,
        started.elapsed().as_millis() as u64,
    );
    report
}
