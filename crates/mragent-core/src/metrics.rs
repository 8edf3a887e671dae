use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct CoordinatorMetrics {
    actions: Counter<u64>,
    searcher_calls: Counter<u64>,
    runs: Counter<u64>,
    run_duration_ms: Histogram<f64>,
}

static METRICS: OnceCell<CoordinatorMetrics> = OnceCell::new();

fn handles() -> &'static CoordinatorMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("mragent.coordinator");
        CoordinatorMetrics {
            actions: meter
                .u64_counter("coordinator_actions_total")
                .with_description("Coordinator actions dispatched by agent kind")
                .init(),
            searcher_calls: meter
                .u64_counter("searcher_calls_total")
                .with_description("Searcher invocations by outcome (executed, budget_stop, deadline_stop)")
                .init(),
            runs: meter
                .u64_counter("runs_total")
                .with_description("Completed coordinator runs by status")
                .init(),
            run_duration_ms: meter
                .f64_histogram("run_duration_ms")
                .with_description("Wall-clock duration of a run including retries")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("MRAGENT_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "MRAGENT_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export coordinator metrics."
        );
    }
    Ok(())
}

pub fn record_action(agent: &'static str) {
    handles().actions.add(1, &[KeyValue::new("agent", agent)]);
}

pub fn record_searcher_call(status: &'static str) {
    handles()
        .searcher_calls
        .add(1, &[KeyValue::new("status", status)]);
}

/// Record a finished run (no-op if no provider installed).
pub fn record_run(success: bool, attempts: usize, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("status", if success { "success" } else { "failure" }),
        KeyValue::new("attempts", attempts as i64),
    ];
    metrics.runs.add(1, &attrs);
    metrics.run_duration_ms.record(duration_ms as f64, &attrs);
}
