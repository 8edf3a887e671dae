//! Bounded concurrent execution of many coordinator runs.
//!
//! Every question is run `samples_per_question` times. A semaphore caps how
//! many runs are in flight; records come back in input order regardless of
//! completion order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::MragentError;
use crate::coordinator::{Coordinator, ExperienceRoute, RunRequest};
use crate::dataset::BatchItem;
use crate::events::{EventCollector, RunOutcome};
use crate::llm::Message;
use crate::runner::{RunReport, run_with_retries};
use crate::scoring::{GroundingScores, ScoreCard, grounding_prf, score};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrent_runs: usize,
    pub samples_per_question: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            samples_per_question: 1,
        }
    }
}

/// One scored run, as written to the batch output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub sample: usize,
    pub question: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    pub attempts: usize,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    /// Original ids of the verified documents, in verification order.
    #[serde(default)]
    pub verified_documents: Vec<String>,
    #[serde(default)]
    pub gold_documents: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub scores: Option<ScoreCard>,
    #[serde(default)]
    pub grounding: Option<GroundingScores>,
    #[serde(default)]
    pub actions_taken: usize,
    #[serde(default)]
    pub conversation: Vec<Message>,
}

impl BatchRecord {
    pub fn from_report(item: &BatchItem, sample: usize, report: RunReport) -> Self {
        let response = report.response().map(str::to_string);
        let output = report.output;
        let verified_docs = output
            .as_ref()
            .map(|output| output.verified_documents.clone())
            .unwrap_or_default();
        let verified_documents: Vec<String> = verified_docs
            .iter()
            .map(|doc| doc.original_id.clone())
            .collect();

        let scorable = !item.references.is_empty() || !item.gold_documents.is_empty();
        let scores = scorable.then(|| {
            score(
                &item.question,
                response.as_deref().unwrap_or_default(),
                &item.references,
                &verified_docs,
                &item.gold_documents,
            )
        });
        let grounding = (!item.gold_documents.is_empty())
            .then(|| grounding_prf(&verified_documents, &item.gold_documents));

        Self {
            id: item.id.clone(),
            sample,
            question: item.question.clone(),
            success: report.success,
            errors: report.errors,
            attempts: report.attempts,
            run_id: output.as_ref().map(|output| output.run_id.clone()),
            response,
            verified_documents,
            gold_documents: item.gold_documents.clone(),
            references: item.references.clone(),
            scores,
            grounding,
            actions_taken: output.as_ref().map_or(0, |output| output.actions_taken),
            conversation: output.map(|output| output.conversation).unwrap_or_default(),
        }
    }

    /// `<id>#<sample>`
    pub fn run_key(&self) -> String {
        run_key(&self.id, self.sample)
    }

    /// A scored run that verified no gold document.
    pub fn is_unfaithful(&self) -> bool {
        self.scores
            .as_ref()
            .is_some_and(|scores| scores.faithfulness.score_faithfulness < 1.0)
    }
}

impl From<&BatchRecord> for ExperienceRoute {
    fn from(record: &BatchRecord) -> Self {
        ExperienceRoute {
            conversation: record.conversation.clone(),
            verified_documents: record.verified_documents.clone(),
            gold_documents: record.gold_documents.clone(),
        }
    }
}

fn run_key(id: &str, sample: usize) -> String {
    format!("{id}#{sample}")
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub duration_ms: u64,
}

pub struct BatchOrchestrator {
    coordinator: Arc<Coordinator>,
    config: BatchConfig,
    events: EventCollector,
    experience: Option<ExperienceRoute>,
    semaphore: Arc<Semaphore>,
    results: Arc<RwLock<HashMap<(usize, usize), BatchRecord>>>,
}

impl BatchOrchestrator {
    pub fn new(coordinator: Arc<Coordinator>, config: BatchConfig, events: EventCollector) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            coordinator,
            config,
            events,
            experience: None,
            semaphore,
            results: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Show every run the same negative example.
    pub fn with_experience(mut self, experience: ExperienceRoute) -> Self {
        self.experience = Some(experience);
        self
    }

    /// Run every item and return the records ordered by item, then sample.
    pub async fn execute(
        &self,
        items: &[BatchItem],
    ) -> Result<(Vec<BatchRecord>, BatchReport), MragentError> {
        let started = Instant::now();
        let samples = self.config.samples_per_question.max(1);
        tracing::info!(
            questions = items.len(),
            samples,
            max_concurrent = self.config.max_concurrent_runs,
            "starting batch"
        );

        let mut tasks = JoinSet::new();
        for (index, item) in items.iter().enumerate() {
            for sample in 0..samples {
                let coordinator = Arc::clone(&self.coordinator);
                let semaphore = Arc::clone(&self.semaphore);
                let results = Arc::clone(&self.results);
                let events = self.events.clone();
                let experience = self.experience.clone();
                let item = item.clone();

                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|err| MragentError::Other(err.into()))?;
                    let key = run_key(&item.id, sample);
                    events.emit_run_started(&key, &item.question);
                    let run_started = Instant::now();

                    let mut request = RunRequest::new(item.question.clone());
                    request.experience = experience;
                    let report = run_with_retries(&coordinator, request).await;

                    let outcome = if report.success {
                        RunOutcome::Success
                    } else {
                        RunOutcome::Failure {
                            reason: report.errors.last().cloned().unwrap_or_default(),
                        }
                    };
                    events.emit_run_finished(
                        &key,
                        outcome,
                        report.attempts,
                        run_started.elapsed().as_millis() as u64,
                    );
                    let record = BatchRecord::from_report(&item, sample, report);
                    results.write().await.insert((index, sample), record);
                    Ok::<(), MragentError>(())
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|err| MragentError::Other(err.into()))??;
        }

        let mut results = self.results.write().await;
        let mut keyed: Vec<((usize, usize), BatchRecord)> = results.drain().collect();
        keyed.sort_by_key(|(key, _)| *key);
        let records: Vec<BatchRecord> = keyed.into_iter().map(|(_, record)| record).collect();

        let successful_runs = records.iter().filter(|record| record.success).count();
        let report = BatchReport {
            total_runs: records.len(),
            successful_runs,
            failed_runs: records.len() - successful_runs,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            total = report.total_runs,
            successful = report.successful_runs,
            duration_ms = report.duration_ms,
            "batch complete"
        );
        Ok((records, report))
    }
}

/// Write one JSON line per record.
pub fn write_records(path: &Path, records: &[BatchRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records written by [`write_records`]; blank lines are skipped.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<BatchRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BatchRecord = serde_json::from_str(&line).with_context(|| {
            format!("invalid batch record on line {} of {}", line_no + 1, path.display())
        })?;
        records.push(record);
    }
    Ok(records)
}

/// First unfaithful run in a previous batch output, as a negative example.
pub fn load_negative_experience(path: &Path) -> anyhow::Result<Option<ExperienceRoute>> {
    Ok(read_records(path)?
        .iter()
        .find(|record| record.is_unfaithful())
        .map(ExperienceRoute::from))
}
