use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest raw model text copied into a trace event.
pub const PREVIEW_CHARS: usize = 1600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub run_id: String,
    pub component: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(
        run_id: impl Into<String>,
        component: impl Into<String>,
        event: impl Into<String>,
        detail: Value,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            run_id: run_id.into(),
            component: component.into(),
            event: event.into(),
            detail,
            timestamp_ms,
        }
    }
}

/// Per-run trace sink handed to the coordinator and the searcher.
///
/// Clones share the same buffer, so a caller can keep a handle and read the
/// events after the run finishes or fails.
#[derive(Debug, Clone)]
pub struct RunTrace {
    run_id: String,
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RunTrace {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, component: &str, event: &str, detail: Value) {
        tracing::debug!(run_id = %self.run_id, component, event, "trace");
        let entry = TraceEvent::new(self.run_id.clone(), component, event, detail);
        if let Ok(mut events) = self.events.lock() {
            events.push(entry);
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, component: &str, event: &str) -> usize {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.component == component && e.event == event)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events())
    }
}

/// Prefix of `text` no longer than [`PREVIEW_CHARS`] characters.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub component: String,
    pub event: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                component: event.component.clone(),
                event: event.event.clone(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. {} → {}",
                step.index, step.component, step.event
            );
        }
        output
    }
}

pub fn persist_trace<P: AsRef<Path>>(
    dir: P,
    run_id: &str,
    events: &[TraceEvent],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = dir.join(format!("{run_id}.json"));
    let payload = serde_json::to_vec_pretty(events)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}
