//! OpenTelemetry export pipeline.
//!
//! Builds one OTLP exporter per signal and the matching SDK provider, then
//! registers the tracer and meter providers globally so that
//! `core::signal::Instruments` picks them up. Logs reach the collector
//! through a `tracing` bridge layer handed to the `LoggerManager`.

use std::collections::HashMap;

use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{
    logs::LoggerProvider,
    metrics::{PeriodicReader, SdkMeterProvider},
    runtime,
    trace::{self as sdktrace, TracerProvider},
    Resource,
};
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::{
    config::settings::Settings,
    core::signal::{SignalKind, INSTRUMENTATION_SCOPE},
};

/// Targets whose events must not be fed back into the OTLP log exporter.
const SUPPRESSED_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "tonic",
    "h2",
    "hyper",
    "hyper_util",
    "tower",
    "reqwest",
];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP {signal} exporter: {reason}")]
    Exporter { signal: SignalKind, reason: String },
}

/// Installed OTLP providers. Dropping this does not flush; call `shutdown`.
pub struct TelemetryPipeline {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
}

impl TelemetryPipeline {
    /// Builds the exporters for `settings` and registers the tracer and
    /// meter providers globally. Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Exporter` when an exporter cannot be built,
    /// typically because the endpoint is not a valid URI.
    pub fn install(settings: &Settings) -> Result<Self, TelemetryError> {
        let transport = Transport::from_settings(settings);
        info!(
            "Exporting telemetry over {} to {}",
            transport.name(),
            settings.endpoint
        );

        let resource = Resource::new([KeyValue::new("service.name", INSTRUMENTATION_SCOPE)]);

        let span_exporter = transport.span_exporter(settings)?;
        #[allow(deprecated)]
        let tracer_provider = TracerProvider::builder()
            .with_batch_exporter(span_exporter, runtime::Tokio)
            .with_config(sdktrace::Config::default().with_resource(resource.clone()))
            .build();

        let metric_exporter = transport.metric_exporter(settings)?;
        let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio).build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource.clone())
            .build();

        let log_exporter = transport.log_exporter(settings)?;
        let logger_provider = LoggerProvider::builder()
            .with_batch_exporter(log_exporter, runtime::Tokio)
            .with_resource(resource)
            .build();

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
        debug!("Tracer and meter providers registered globally");

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
        })
    }

    /// Layer bridging `tracing` events into OTLP log records at `level`.
    pub fn log_layer(&self, level: &str) -> Box<dyn Layer<Registry> + Send + Sync> {
        OpenTelemetryTracingBridge::new(&self.logger_provider)
            .with_filter(EnvFilter::new(bridge_directives(level)))
            .boxed()
    }

    /// Flushes and shuts down every provider. Failures are logged only.
    pub fn shutdown(&self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            error!("Failed to shut down tracer provider: {}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            error!("Failed to shut down meter provider: {}", e);
        }
        if let Err(e) = self.logger_provider.shutdown() {
            error!("Failed to shut down logger provider: {}", e);
        }
        info!("Telemetry pipeline shut down");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Grpc,
    HttpProtobuf,
}

impl Transport {
    fn from_settings(settings: &Settings) -> Self {
        if settings.uses_http_probe() {
            Transport::HttpProtobuf
        } else {
            Transport::Grpc
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Transport::Grpc => "OTLP/gRPC",
            Transport::HttpProtobuf => "OTLP/HTTP",
        }
    }

    fn span_exporter(&self, settings: &Settings) -> Result<SpanExporter, TelemetryError> {
        let kind = SignalKind::Traces;
        let built = match self {
            Transport::Grpc => SpanExporter::builder()
                .with_tonic()
                .with_endpoint(settings.endpoint.clone())
                .build(),
            Transport::HttpProtobuf => SpanExporter::builder()
                .with_http()
                .with_endpoint(signal_endpoint(&settings.endpoint, kind))
                .with_headers(header_map(settings))
                .build(),
        };
        built.map_err(|e| exporter_error(kind, e))
    }

    fn metric_exporter(&self, settings: &Settings) -> Result<MetricExporter, TelemetryError> {
        let kind = SignalKind::Metrics;
        let built = match self {
            Transport::Grpc => MetricExporter::builder()
                .with_tonic()
                .with_endpoint(settings.endpoint.clone())
                .build(),
            Transport::HttpProtobuf => MetricExporter::builder()
                .with_http()
                .with_endpoint(signal_endpoint(&settings.endpoint, kind))
                .with_headers(header_map(settings))
                .build(),
        };
        built.map_err(|e| exporter_error(kind, e))
    }

    fn log_exporter(&self, settings: &Settings) -> Result<LogExporter, TelemetryError> {
        let kind = SignalKind::Logs;
        let built = match self {
            Transport::Grpc => LogExporter::builder()
                .with_tonic()
                .with_endpoint(settings.endpoint.clone())
                .build(),
            Transport::HttpProtobuf => LogExporter::builder()
                .with_http()
                .with_endpoint(signal_endpoint(&settings.endpoint, kind))
                .with_headers(header_map(settings))
                .build(),
        };
        built.map_err(|e| exporter_error(kind, e))
    }
}

fn exporter_error(signal: SignalKind, err: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Exporter {
        signal,
        reason: err.to_string(),
    }
}

/// OTLP/HTTP endpoint for one signal, e.g. `http://c:4318/v1/traces`.
fn signal_endpoint(endpoint: &str, kind: SignalKind) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), kind.path())
}

fn header_map(settings: &Settings) -> HashMap<String, String> {
    settings
        .http_headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn bridge_directives(level: &str) -> String {
    SUPPRESSED_TARGETS
        .iter()
        .fold(level.to_string(), |acc, target| format!("{acc},{target}=off"))
}
