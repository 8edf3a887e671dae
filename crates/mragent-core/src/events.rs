//! Run lifecycle events for progress reporting.
//!
//! The batch orchestrator and the coordinator push events into an unbounded
//! channel; the CLI drains it to print progress while runs are in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::coordinator::AgentKind;

pub type EventId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        event_id: EventId,
        timestamp: u64,
        /// `<item id>#<sample>`
        run_key: String,
        question: String,
    },
    ActionDispatched {
        event_id: EventId,
        timestamp: u64,
        run_id: String,
        turn: usize,
        agent: AgentKind,
    },
    RunFinished {
        event_id: EventId,
        timestamp: u64,
        run_key: String,
        outcome: RunOutcome,
        attempts: usize,
        duration_ms: u64,
    },
}

impl Event {
    pub fn event_id(&self) -> &str {
        match self {
            Event::RunStarted { event_id, .. }
            | Event::ActionDispatched { event_id, .. }
            | Event::RunFinished { event_id, .. } => event_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Event::RunStarted { timestamp, .. }
            | Event::ActionDispatched { timestamp, .. }
            | Event::RunFinished { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure { reason: String },
}

#[derive(Debug, Clone)]
pub struct EventCollector {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit_run_started(&self, run_key: &str, question: &str) {
        self.send(Event::RunStarted {
            event_id: next_event_id(),
            timestamp: current_timestamp(),
            run_key: run_key.to_string(),
            question: question.to_string(),
        });
    }

    pub fn emit_action(&self, run_id: &str, turn: usize, agent: AgentKind) {
        self.send(Event::ActionDispatched {
            event_id: next_event_id(),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            turn,
            agent,
        });
    }

    pub fn emit_run_finished(
        &self,
        run_key: &str,
        outcome: RunOutcome,
        attempts: usize,
        duration_ms: u64,
    ) {
        self.send(Event::RunFinished {
            event_id: next_event_id(),
            timestamp: current_timestamp(),
            run_key: run_key.to_string(),
            outcome,
            attempts,
            duration_ms,
        });
    }

    fn send(&self, event: Event) {
        // A dropped receiver only means nobody is watching progress.
        if let Err(err) = self.sender.send(event) {
            tracing::debug!(error = %err, "event receiver closed");
        }
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new().0
    }
}

fn next_event_id() -> EventId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("evt_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (collector, mut receiver) = EventCollector::new();
        collector.emit_run_started("q1#0", "Who wrote Dune?");
        collector.emit_action("run-1", 1, AgentKind::Planner);
        collector.emit_run_finished("q1#0", RunOutcome::Success, 1, 12);
        drop(collector);

        let mut kinds = Vec::new();
        while let Some(event) = receiver.recv().await {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(kinds, ["run_started", "action_dispatched", "run_finished"]);
    }

    #[test]
    fn sending_without_receiver_is_harmless() {
        let (collector, receiver) = EventCollector::new();
        drop(receiver);
        collector.emit_run_started("q1#0", "q");
    }

    #[test]
    fn event_ids_are_unique() {
        let (collector, mut receiver) = EventCollector::new();
        collector.emit_run_started("a", "q");
        collector.emit_run_started("b", "q");
        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_ne!(first.event_id(), second.event_id());
        assert!(second.timestamp() >= first.timestamp());
    }
}
