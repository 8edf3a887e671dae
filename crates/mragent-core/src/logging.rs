//! Append-only run log with secret redaction and retention pruning.
//!
//! One JSON line per finished run lands in `<dir>/<YYYY>/<MM>/runs.jsonl`.
//! Whenever a redaction fires, the field names also go to `audit.jsonl`
//! next to it.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::warn;

pub const LOG_DIR_ENV: &str = "MRAGENT_LOG_DIR";
pub const RETENTION_ENV: &str = "MRAGENT_LOG_RETENTION_DAYS";
const DEFAULT_LOG_DIR: &str = "data/logs";
const DEFAULT_RETENTION_DAYS: u64 = 90;

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

#[derive(Debug, Clone, Default)]
pub struct RunLogInput {
    pub run_id: String,
    pub question: String,
    pub response: Option<String>,
    pub success: bool,
    pub attempts: usize,
    pub errors: Vec<String>,
    /// Original ids of the verified documents.
    pub verified_documents: Vec<String>,
    pub trace_path: Option<String>,
}

#[derive(Serialize)]
struct RunLogRecord {
    timestamp: String,
    run_id: String,
    question: String,
    response: Option<String>,
    success: bool,
    attempts: usize,
    errors: Vec<String>,
    verified_documents: Vec<String>,
    trace_path: Option<String>,
    redactions: Vec<&'static str>,
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: &'a str,
    run_id: &'a str,
    redactions: &'a [&'static str],
}

/// `MRAGENT_LOG_DIR`, or `data/logs`.
pub fn log_base_dir() -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR))
}

fn retention_days() -> u64 {
    std::env::var(RETENTION_ENV)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer
        .write_all(b"\n")
        .with_context(|| format!("failed to append to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn redact(input: &str, fired: &mut BTreeSet<&'static str>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .into_owned();
        if matched {
            fired.insert(*name);
        }
    }
    output
}

/// Log a finished run under [`log_base_dir`] and prune expired files.
pub fn log_run_completion(input: RunLogInput) -> Result<PathBuf> {
    let base_dir = log_base_dir();
    let path = log_run_completion_in(&base_dir, input)?;
    enforce_retention(&base_dir, retention_days())?;
    Ok(path)
}

/// Log a finished run under `base_dir`; returns the path of the run log.
pub fn log_run_completion_in(base_dir: &Path, input: RunLogInput) -> Result<PathBuf> {
    let timestamp = Utc::now();
    let mut fired = BTreeSet::new();

    let question = redact(&input.question, &mut fired);
    let response = input
        .response
        .as_deref()
        .map(|text| redact(text, &mut fired));
    let errors = input
        .errors
        .iter()
        .map(|error| redact(error, &mut fired))
        .collect();

    let record = RunLogRecord {
        timestamp: timestamp.to_rfc3339(),
        run_id: input.run_id,
        question,
        response,
        success: input.success,
        attempts: input.attempts,
        errors,
        verified_documents: input.verified_documents,
        trace_path: input.trace_path,
        redactions: fired.into_iter().collect(),
    };

    let month_dir = base_dir
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()));
    let run_log = month_dir.join("runs.jsonl");
    append_json_line(&run_log, &record)?;

    if !record.redactions.is_empty() {
        append_json_line(
            &month_dir.join("audit.jsonl"),
            &AuditRecord {
                timestamp: &record.timestamp,
                run_id: &record.run_id,
                redactions: &record.redactions,
            },
        )?;
        warn!(
            run_id = %record.run_id,
            fields = ?record.redactions,
            "redacted potential secrets from run log"
        );
    }
    Ok(run_log)
}

/// Delete files older than `days` below `base_dir`; `0` keeps everything.
pub fn enforce_retention(base_dir: &Path, days: u64) -> Result<()> {
    if days == 0 || !base_dir.exists() {
        return Ok(());
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days.saturating_mul(86_400)))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    prune_directory(base_dir, cutoff)
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|modified| modified < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }
    Ok(())
}
