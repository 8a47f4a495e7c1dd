//! Signal kinds and the per-iteration emission cycle.
//!
//! Each emitter loop produces one `EmissionCycle` per iteration. The cycle
//! records the signal in the OpenTelemetry API (counter increment, span, or
//! log event) and, for traces, keeps the span open until `complete` is
//! called. A cycle dropped without completing, as on cancellation, ends its
//! span without a status.

use std::fmt;

use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    metrics::Counter,
    trace::{Span, Status, Tracer},
    KeyValue,
};
use tracing::info;

/// Instrumentation scope used for the meter and the tracer.
pub const INSTRUMENTATION_SCOPE: &str = "otelgen";
pub const COUNTER_NAME: &str = "demo_operations_total";
pub const SPAN_NAME: &str = "demo_operation";
pub const LABEL_ATTRIBUTE: &str = "custom_label";

/// A category of telemetry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Logs,
    Metrics,
    Traces,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [SignalKind::Logs, SignalKind::Metrics, SignalKind::Traces];

    /// Path appended to the endpoint for this signal's probe and OTLP/HTTP export.
    pub fn path(&self) -> &'static str {
        match self {
            SignalKind::Logs => "/v1/logs",
            SignalKind::Metrics => "/v1/metrics",
            SignalKind::Traces => "/v1/traces",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Logs => "logs",
            SignalKind::Metrics => "metrics",
            SignalKind::Traces => "traces",
        }
    }

    /// Singular noun used in error messages ("log emission").
    pub fn noun(&self) -> &'static str {
        match self {
            SignalKind::Logs => "log",
            SignalKind::Metrics => "metric",
            SignalKind::Traces => "trace",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles to the OpenTelemetry instruments shared by all emitters.
///
/// Both come from the global providers, so they are no-ops until a
/// pipeline has been installed.
#[derive(Clone)]
pub struct Instruments {
    counter: Counter<u64>,
    tracer: std::sync::Arc<BoxedTracer>,
}

impl Instruments {
    pub fn from_global() -> Self {
        let meter = global::meter(INSTRUMENTATION_SCOPE);
        let counter = meter
            .u64_counter(COUNTER_NAME)
            .with_description("Total number of operations")
            .build();
        let tracer = std::sync::Arc::new(global::tracer(INSTRUMENTATION_SCOPE));
        Self { counter, tracer }
    }

    /// Records the signal and returns the cycle that owns any open span.
    pub fn begin(&self, kind: SignalKind, label: &str) -> EmissionCycle {
        let span = match kind {
            SignalKind::Logs => {
                info!(label, "[LOG SIGNAL] Emitting log with label: {}", label);
                None
            }
            SignalKind::Metrics => {
                self.counter
                    .add(1, &[KeyValue::new(LABEL_ATTRIBUTE, label.to_string())]);
                info!(
                    label,
                    "[METRIC SIGNAL] Emitting metric {} with label: {}", COUNTER_NAME, label
                );
                None
            }
            SignalKind::Traces => {
                let mut span = self.tracer.start(SPAN_NAME);
                span.set_attribute(KeyValue::new(LABEL_ATTRIBUTE, label.to_string()));
                info!(
                    label,
                    "[TRACE SIGNAL] Emitting trace {} with label: {}", SPAN_NAME, label
                );
                Some(span)
            }
        };

        EmissionCycle { kind, span }
    }
}

impl fmt::Debug for Instruments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruments")
            .field("counter", &COUNTER_NAME)
            .field("span", &SPAN_NAME)
            .finish()
    }
}

/// One iteration's worth of emitted signal. Dropping it ends any open span
/// without a status.
pub struct EmissionCycle {
    kind: SignalKind,
    span: Option<BoxedSpan>,
}

impl EmissionCycle {
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn has_open_span(&self) -> bool {
        self.span.is_some()
    }

    /// Marks the cycle successful and closes its span, if any.
    pub fn complete(mut self) {
        if let Some(mut span) = self.span.take() {
            span.set_status(Status::Ok);
            span.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn paths_match_otlp_http_routes() {
        assert_eq!(SignalKind::Logs.path(), "/v1/logs");
        assert_eq!(SignalKind::Metrics.path(), "/v1/metrics");
        assert_eq!(SignalKind::Traces.path(), "/v1/traces");
    }

    #[test]
    fn display_uses_plural_name() {
        assert_eq!(SignalKind::Metrics.to_string(), "metrics");
        assert_eq!(SignalKind::Traces.noun(), "trace");
    }

    #[test]
    #[traced_test]
    fn only_traces_keep_a_span_open() {
        let instruments = Instruments::from_global();

        let cycle = instruments.begin(SignalKind::Logs, "demo-app");
        assert!(!cycle.has_open_span());
        cycle.complete();

        let cycle = instruments.begin(SignalKind::Traces, "demo-app");
        assert_eq!(cycle.kind(), SignalKind::Traces);
        assert!(cycle.has_open_span());
        cycle.complete();

        assert!(logs_contain("[LOG SIGNAL] Emitting log with label: demo-app"));
        assert!(logs_contain("[TRACE SIGNAL] Emitting trace demo_operation"));
    }

    #[test]
    #[traced_test]
    fn metric_cycle_logs_counter_name() {
        let instruments = Instruments::from_global();
        instruments.begin(SignalKind::Metrics, "checkout").complete();
        assert!(logs_contain(
            "[METRIC SIGNAL] Emitting metric demo_operations_total with label: checkout"
        ));
    }
}
