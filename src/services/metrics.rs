use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Invocation counters for observability
pub struct Metrics {
    /// Total invocations handled
    pub invocations: AtomicU64,
    /// Invocations answered with a prediction
    pub predictions: AtomicU64,
    /// Sum of invocation latencies in microseconds
    latency_micros: AtomicU64,
    /// Failures per error kind, indexed like `ErrorKind::ALL`
    errors: [AtomicU64; ErrorKind::ALL.len()],
    started_at: DateTime<Utc>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
            errors: std::array::from_fn(|_| AtomicU64::new(0)),
            started_at: Utc::now(),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_failure(&self, kind: ErrorKind, latency: Duration) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.errors[Self::slot(kind)].fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn errors(&self, kind: ErrorKind) -> u64 {
        self.errors[Self::slot(kind)].load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    fn slot(kind: ErrorKind) -> usize {
        ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }

    fn add_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// One-line summary for logs. `model_loads` comes from the model cache,
    /// which owns that count.
    pub fn summary(&self, model_loads: u64) -> String {
        let invocations = self.invocations.load(Ordering::Relaxed);
        let avg_ms = if invocations > 0 {
            self.latency_micros.load(Ordering::Relaxed) as f64 / invocations as f64 / 1000.0
        } else {
            0.0
        };
        format!(
            "invocations={} predictions={} errors={} model_loads={} avg_latency_ms={:.2}",
            invocations,
            self.predictions.load(Ordering::Relaxed),
            self.total_errors(),
            model_loads,
            avg_ms,
        )
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, model_ready: bool, model_loads: u64) -> String {
        let uptime = (Utc::now() - self.started_at).num_seconds().max(0);
        let mut out = format!(
            r#"# HELP lambda_api_up Model ready (1) or not yet loaded (0)
# TYPE lambda_api_up gauge
lambda_api_up {}

# HELP lambda_api_uptime_seconds Uptime in seconds
# TYPE lambda_api_uptime_seconds counter
lambda_api_uptime_seconds {}

# HELP lambda_api_invocations_total Total invocations handled
# TYPE lambda_api_invocations_total counter
lambda_api_invocations_total {}

# HELP lambda_api_predictions_total Invocations answered with a prediction
# TYPE lambda_api_predictions_total counter
lambda_api_predictions_total {}

# HELP lambda_api_model_loads_total Model load attempts
# TYPE lambda_api_model_loads_total counter
lambda_api_model_loads_total {}

# HELP lambda_api_latency_seconds_sum Sum of invocation latencies
# TYPE lambda_api_latency_seconds_sum counter
lambda_api_latency_seconds_sum {}

# HELP lambda_api_errors_total Failed invocations by error kind
# TYPE lambda_api_errors_total counter
"#,
            u8::from(model_ready),
            uptime,
            self.invocations.load(Ordering::Relaxed),
            self.predictions.load(Ordering::Relaxed),
            model_loads,
            self.latency_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        );
        for kind in ErrorKind::ALL {
            let _ = writeln!(
                out,
                "lambda_api_errors_total{{kind=\"{}\"}} {}",
                kind,
                self.errors(kind)
            );
        }
        out
    }

    /// Log current status
    pub fn log_status(&self, model_loads: u64) {
        info!("{}", self.summary(model_loads));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
