//! Aggregate batch output into mean scores with bootstrap confidence intervals.

use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Parser;
use mragent_core::{EvaluationHarness, EvaluationMetrics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};

#[derive(Parser, Debug)]
#[command(name = "eval-harness", version, about = "Summarise mragent batch results")]
struct Cli {
    /// Batch output (JSONL) written by `mragent batch`.
    path: PathBuf,

    /// Bootstrap resamples per metric.
    #[arg(long, default_value_t = 1000)]
    resamples: usize,

    /// Seed for the resampling generator.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Interval {
    mean: f64,
    lower: f64,
    upper: f64,
    samples: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    generated_at: String,
    source: String,
    total_records: usize,
    successful_records: usize,
    scored_records: usize,
    relevance: Option<Interval>,
    faithfulness: Option<Interval>,
    coverage: Option<Interval>,
    grounding_f1: Option<Interval>,
    failures: Vec<String>,
}

/// Percentile bootstrap 95% interval of the mean of `values`.
fn bootstrap(values: &[f64], resamples: usize, rng: &mut StdRng) -> Option<Interval> {
    if values.is_empty() {
        return None;
    }
    let resamples = resamples.max(1);
    let means: Vec<f64> = (0..resamples)
        .map(|_| {
            (0..values.len())
                .map(|_| values[rng.gen_range(0..values.len())])
                .mean()
        })
        .collect();
    let mut means = Data::new(means);
    Some(Interval {
        mean: values.iter().mean(),
        lower: means.quantile(0.025),
        upper: means.quantile(0.975),
        samples: values.len(),
    })
}

fn build_report(cli: &Cli, metrics: &EvaluationMetrics) -> Report {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let column = |pick: fn(&mragent_core::eval::RecordScores) -> Option<f64>| -> Vec<f64> {
        metrics.scored.iter().filter_map(pick).collect()
    };
    let relevance = column(|s| Some(s.relevance));
    let faithfulness = column(|s| Some(s.faithfulness));
    let coverage = column(|s| Some(s.coverage));
    let grounding = column(|s| s.grounding_f1);

    Report {
        generated_at: Utc::now().to_rfc3339(),
        source: cli.path.display().to_string(),
        total_records: metrics.total_records,
        successful_records: metrics.successful_records,
        scored_records: metrics.scored.len(),
        relevance: bootstrap(&relevance, cli.resamples, &mut rng),
        faithfulness: bootstrap(&faithfulness, cli.resamples, &mut rng),
        coverage: bootstrap(&coverage, cli.resamples, &mut rng),
        grounding_f1: bootstrap(&grounding, cli.resamples, &mut rng),
        failures: metrics.failures.clone(),
    }
}

fn render(report: &Report) -> String {
    let line = |name: &str, interval: &Option<Interval>| match interval {
        Some(i) => format!(
            "{name:<14} {:.3}  [{:.3}, {:.3}]  n={}\n",
            i.mean, i.lower, i.upper, i.samples
        ),
        None => format!("{name:<14} n/a\n"),
    };
    let mut output = format!(
        "{}: {} record(s), {} successful, {} scored\n",
        report.source, report.total_records, report.successful_records, report.scored_records
    );
    output.push_str(&line("relevance", &report.relevance));
    output.push_str(&line("faithfulness", &report.faithfulness));
    output.push_str(&line("coverage", &report.coverage));
    output.push_str(&line("grounding f1", &report.grounding_f1));
    if !report.failures.is_empty() {
        output.push_str(&format!("failed runs: {}\n", report.failures.join(", ")));
    }
    output
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !cli.path.exists() {
        bail!("{} does not exist", cli.path.display());
    }
    let metrics = EvaluationHarness::analyze_results(&cli.path)?;
    let report = build_report(&cli, &metrics);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_scores_have_a_degenerate_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let interval = bootstrap(&[0.5; 8], 200, &mut rng).unwrap();
        assert_eq!(interval.samples, 8);
        assert!((interval.mean - 0.5).abs() < 1e-12);
        assert!((interval.lower - 0.5).abs() < 1e-12);
        assert!((interval.upper - 0.5).abs() < 1e-12);
    }

    #[test]
    fn interval_brackets_the_mean_and_is_seeded() {
        let values = [0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 0.0, 0.5];
        let first = bootstrap(&values, 500, &mut StdRng::seed_from_u64(9)).unwrap();
        let second = bootstrap(&values, 500, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(first, second);
        assert!(first.lower <= first.mean && first.mean <= first.upper);
        assert!(first.lower >= 0.0 && first.upper <= 1.0);
        assert!(bootstrap(&[], 10, &mut StdRng::seed_from_u64(9)).is_none());
    }
}
