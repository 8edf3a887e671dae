use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::orchestrator::BatchRecord;

/// Normalized scores of one scored record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordScores {
    pub run_key: String,
    pub relevance: f64,
    pub faithfulness: f64,
    pub coverage: f64,
    pub grounding_f1: Option<f64>,
}

#[derive(Debug, Default, Clone)]
pub struct EvaluationMetrics {
    pub total_records: usize,
    pub successful_records: usize,
    pub scored: Vec<RecordScores>,
    /// Run keys of unsuccessful records.
    pub failures: Vec<String>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

impl EvaluationMetrics {
    pub fn record(&mut self, record: &BatchRecord) {
        self.total_records += 1;
        if record.success {
            self.successful_records += 1;
        } else {
            self.failures.push(record.run_key());
        }
        if let Some(scores) = &record.scores {
            self.scored.push(RecordScores {
                run_key: record.run_key(),
                relevance: scores.relevance.score_relevance_normalized,
                faithfulness: scores.faithfulness.score_faithfulness_normalized,
                coverage: scores.coverage.score_equivalence_normalized,
                grounding_f1: record.grounding.map(|grounding| grounding.f1),
            });
        }
    }

    pub fn mean_relevance(&self) -> Option<f64> {
        mean(self.scored.iter().map(|s| s.relevance))
    }

    pub fn mean_faithfulness(&self) -> Option<f64> {
        mean(self.scored.iter().map(|s| s.faithfulness))
    }

    pub fn mean_coverage(&self) -> Option<f64> {
        mean(self.scored.iter().map(|s| s.coverage))
    }

    pub fn mean_grounding_f1(&self) -> Option<f64> {
        mean(self.scored.iter().filter_map(|s| s.grounding_f1))
    }

    pub fn summary(&self) -> String {
        let show = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"));
        format!(
            "{} record(s), {} successful, {} scored • relevance {} • faithfulness {} • coverage {} • grounding f1 {} • {} failure(s)",
            self.total_records,
            self.successful_records,
            self.scored.len(),
            show(self.mean_relevance()),
            show(self.mean_faithfulness()),
            show(self.mean_coverage()),
            show(self.mean_grounding_f1()),
            self.failures.len()
        )
    }
}

pub struct EvaluationHarness;

impl EvaluationHarness {
    /// Aggregate a batch output file; malformed lines are skipped.
    pub fn analyze_results(path: impl AsRef<Path>) -> Result<EvaluationMetrics> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open results file {}", path.display()))?;
        let mut metrics = EvaluationMetrics::default();

        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BatchRecord>(&line) {
                Ok(record) => metrics.record(&record),
                Err(err) => {
                    tracing::debug!(%err, "skipping malformed batch record");
                }
            }
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::BatchItem;
    use crate::orchestrator::write_records;
    use crate::runner::RunReport;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn failed(id: &str, references: &[&str]) -> BatchRecord {
        let mut item = BatchItem::new(id, "q?");
        item.references = references.iter().map(|r| r.to_string()).collect();
        let report = RunReport {
            question: "q?".into(),
            success: false,
            errors: vec!["attempt 1: parse".into()],
            attempts: 1,
            output: None,
            final_response: Some("Paris".into()),
        };
        BatchRecord::from_report(&item, 0, report)
    }

    #[test]
    fn aggregates_scores_and_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        write_records(&path, &[failed("a", &["Paris"]), failed("b", &["Lyon"])])?;
        writeln!(OpenOptions::new().append(true).open(&path)?, "not json")?;

        let metrics = EvaluationHarness::analyze_results(&path)?;
        assert_eq!(metrics.total_records, 2);
        assert_eq!(metrics.failures, vec!["a#0", "b#0"]);
        assert_eq!(metrics.scored.len(), 2);
        // "Paris" matches record a exactly and misses record b.
        let relevance = metrics.mean_relevance().unwrap();
        assert!((relevance - (2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!(metrics.mean_grounding_f1().is_none());
        assert!(metrics.summary().contains("2 failure(s)"));
        Ok(())
    }
}
