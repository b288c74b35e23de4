use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

use crate::Result;


/// Label distinguishing the two push paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Service,
    FuzzyWatch,
}

impl PushKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushKind::Service => "service",
            PushKind::FuzzyWatch => "fuzzy_watch",
        }
    }
}

/// Push attempt counters.
///
/// Each instance owns its collectors and registers them in the registry it
/// is built with, so independent engines (and tests) never share counts.
#[derive(Debug, Clone)]
pub struct PushMetrics {
    total: IntCounterVec,
    success: IntCounterVec,
    failed: IntCounterVec,
}

impl PushMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            total: IntCounterVec::new(Opts::new("push_total", "Push attempts"), &["kind"])?,
            success: IntCounterVec::new(
                Opts::new("push_success_total", "Push attempts acknowledged by the client"),
                &["kind"],
            )?,
            failed: IntCounterVec::new(
                Opts::new("push_failed_total", "Push attempts that failed"),
                &["kind"],
            )?,
        };
        registry.register(Box::new(metrics.total.clone()))?;
        registry.register(Box::new(metrics.success.clone()))?;
        registry.register(Box::new(metrics.failed.clone()))?;
        Ok(metrics)
    }

    pub fn record_success(
        &self,
        kind: PushKind,
    ) {
        self.total.with_label_values(&[kind.as_str()]).inc();
        self.success.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_failure(
        &self,
        kind: PushKind,
    ) {
        self.total.with_label_values(&[kind.as_str()]).inc();
        self.failed.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn total_count(
        &self,
        kind: PushKind,
    ) -> u64 {
        self.total.with_label_values(&[kind.as_str()]).get()
    }

    pub fn success_count(
        &self,
        kind: PushKind,
    ) -> u64 {
        self.success.with_label_values(&[kind.as_str()]).get()
    }

    pub fn failed_count(
        &self,
        kind: PushKind,
    ) -> u64 {
        self.failed.with_label_values(&[kind.as_str()]).get()
    }
}

/// Renders every collector of `registry` in the Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
