//! Metrics collection and export module

use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::instructions::OperationKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Pipeline metrics, one registry per process
pub struct Metrics {
    registry: Registry,

    // Counters
    pub operations_started: IntCounterVec,
    pub operations_succeeded: IntCounterVec,
    pub operations_failed: IntCounterVec,
    pub user_rejections: IntCounter,
    pub simulation_failures: IntCounter,
    pub submission_rejections: IntCounter,
    pub transport_retries: IntCounter,
    pub rebuilds: IntCounter,

    // Histograms
    pub pipeline_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_started = IntCounterVec::new(
            Opts::new("cosigner_operations_started_total", "Operations entered"),
            &["operation"],
        )?;

        let operations_succeeded = IntCounterVec::new(
            Opts::new(
                "cosigner_operations_succeeded_total",
                "Operations accepted by the network",
            ),
            &["operation"],
        )?;

        let operations_failed = IntCounterVec::new(
            Opts::new("cosigner_operations_failed_total", "Operations that surfaced an error"),
            &["operation", "category"],
        )?;

        let user_rejections = IntCounter::with_opts(Opts::new(
            "cosigner_user_rejections_total",
            "Signing prompts declined by the user",
        ))?;

        let simulation_failures = IntCounter::with_opts(Opts::new(
            "cosigner_simulation_failures_total",
            "Transactions blocked by the simulation gate",
        ))?;

        let submission_rejections = IntCounter::with_opts(Opts::new(
            "cosigner_submission_rejections_total",
            "Transactions rejected by the network at submission",
        ))?;

        let transport_retries = IntCounter::with_opts(Opts::new(
            "cosigner_transport_retries_total",
            "Resends of the same transaction after a transport failure",
        ))?;

        let rebuilds = IntCounter::with_opts(Opts::new(
            "cosigner_rebuilds_total",
            "Rebuild-and-resign cycles after a stale anchor",
        ))?;

        let pipeline_latency = Histogram::with_opts(
            HistogramOpts::new(
                "cosigner_pipeline_latency_seconds",
                "End-to-end operation latency, including the signing prompt",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(operations_started.clone()))?;
        registry.register(Box::new(operations_succeeded.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(user_rejections.clone()))?;
        registry.register(Box::new(simulation_failures.clone()))?;
        registry.register(Box::new(submission_rejections.clone()))?;
        registry.register(Box::new(transport_retries.clone()))?;
        registry.register(Box::new(rebuilds.clone()))?;
        registry.register(Box::new(pipeline_latency.clone()))?;

        Ok(Self {
            registry,
            operations_started,
            operations_succeeded,
            operations_failed,
            user_rejections,
            simulation_failures,
            submission_rejections,
            transport_retries,
            rebuilds,
            pipeline_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_started(&self, kind: OperationKind) {
        self.operations_started.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_success(&self, kind: OperationKind) {
        self.operations_succeeded.with_label_values(&[kind.as_str()]).inc();
    }

    /// Count a surfaced error under its category plus the matching stage counter
    pub fn record_failure(&self, kind: OperationKind, err: &PipelineError) {
        self.operations_failed
            .with_label_values(&[kind.as_str(), err.category()])
            .inc();
        match err {
            PipelineError::UserRejected => self.user_rejections.inc(),
            PipelineError::SimulationFailed { .. } => self.simulation_failures.inc(),
            PipelineError::SubmissionRejected { .. } => self.submission_rejections.inc(),
            _ => {}
        }
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_updates_stage_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_started(OperationKind::Burn);
        metrics.record_failure(OperationKind::Burn, &PipelineError::UserRejected);
        metrics.record_failure(
            OperationKind::Swap,
            &PipelineError::simulation_failed("InsufficientFunds", vec![]),
        );

        assert_eq!(metrics.user_rejections.get(), 1);
        assert_eq!(metrics.simulation_failures.get(), 1);
        assert_eq!(metrics.submission_rejections.get(), 0);
        assert_eq!(
            metrics.operations_started.with_label_values(&["burn"]).get(),
            1
        );
    }

    #[test]
    fn test_encode_renders_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_success(OperationKind::Transfer);
        Timer::new().observe_duration(&metrics.pipeline_latency);

        let text = metrics.encode().unwrap();
        assert!(text.contains("cosigner_operations_succeeded_total{operation=\"transfer\"} 1"));
        assert!(text.contains("cosigner_pipeline_latency_seconds_count 1"));
    }
}
