use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Named recorders for payment flow metrics. Without an installed recorder
/// every call is a no-op, so services record unconditionally.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn record_transaction_created(&self, kind: &str, currency: &str) {
        counter!("payments_transactions_created_total", "kind" => kind.to_string(), "currency" => currency.to_string()).increment(1);
    }

    /// `outcome` is one of created, superseded, error, timeout or mismatch.
    pub fn record_gateway_order(&self, outcome: &str) {
        counter!("payments_gateway_orders_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_gateway_latency(&self, duration_ms: f64) {
        histogram!("payments_gateway_order_duration_ms").record(duration_ms);
    }

    pub fn record_payment_verification(&self, outcome: &str) {
        counter!("payments_verifications_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_status_transition(&self, kind: &str, target: &str) {
        counter!("payments_status_transitions_total", "kind" => kind.to_string(), "target" => target.to_string()).increment(1);
    }

    pub fn record_commit_retry(&self, operation: &str) {
        counter!("payments_commit_retries_total", "operation" => operation.to_string()).increment(1);
    }

    pub fn record_notification(&self, event_type: &str, success: bool) {
        counter!("payments_notifications_total", "type" => event_type.to_string(), "success" => success.to_string()).increment(1);
    }

    pub fn set_outbox_backlog(&self, count: i64) {
        gauge!("payments_outbox_backlog").set(count as f64);
    }
}

pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    let handle = METRICS_HANDLE.get_or_init(|| handle);
    METRICS.get_or_init(Metrics::default);
    Ok(handle.clone())
}

fn describe_metrics() {
    describe_counter!("payments_transactions_created_total", Unit::Count, "Pending appointments and orders created");
    describe_counter!("payments_gateway_orders_total", Unit::Count, "Gateway order creation attempts by outcome");
    describe_histogram!("payments_gateway_order_duration_ms", Unit::Milliseconds, "Gateway order creation latency");
    describe_counter!("payments_verifications_total", Unit::Count, "Payment callback verifications by outcome");
    describe_counter!("payments_status_transitions_total", Unit::Count, "Committed status transitions");
    describe_counter!("payments_commit_retries_total", Unit::Count, "Commits retried after a concurrent modification");
    describe_counter!("payments_notifications_total", Unit::Count, "Notification delivery attempts");
    describe_gauge!("payments_outbox_backlog", Unit::Count, "Undelivered outbox events");
}

pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}
