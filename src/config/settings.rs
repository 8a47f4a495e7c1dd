//! Emission settings read from the process environment.
//!
//! `Settings` is built once at startup and never mutated afterwards. Parsing
//! is deliberately lenient everywhere except for the global interval: enable
//! flags treat anything but `false` as enabled, and per-signal intervals fall
//! back to the global one when they cannot be used.

use std::{fmt, time::Duration};

use validator::Validate;

use super::ConfigError;
use crate::core::signal::SignalKind;

pub const ENV_ENDPOINT: &str = "OTEL_ENDPOINT";
pub const ENV_INTERVAL: &str = "OTEL_INTERVAL_SECONDS";
pub const ENV_INTERVAL_LOGS: &str = "OTEL_INTERVAL_SECONDS_LOGS";
pub const ENV_INTERVAL_METRICS: &str = "OTEL_INTERVAL_SECONDS_METRICS";
pub const ENV_INTERVAL_TRACES: &str = "OTEL_INTERVAL_SECONDS_TRACES";
pub const ENV_ENABLE_LOGS: &str = "OTEL_ENABLE_LOGS";
pub const ENV_ENABLE_METRICS: &str = "OTEL_ENABLE_METRICS";
pub const ENV_ENABLE_TRACES: &str = "OTEL_ENABLE_TRACES";
pub const ENV_CUSTOM_LABEL: &str = "OTEL_CUSTOM_LABEL";
pub const ENV_HTTP_HEADERS: &str = "OTEL_HTTP_HEADERS";
pub const ENV_EXPORT_PROTOCOL: &str = "OTEL_EXPORT_PROTOCOL";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CUSTOM_LABEL: &str = "demo-app";
pub const DEFAULT_EXPORT_PROTOCOL: &str = "protobuf";

/// Protocol tag that turns on the raw HTTP probe and the OTLP/HTTP exporters.
pub const HTTP_PROTOCOL: &str = "http";

/// Extra HTTP headers attached to probe requests and OTLP/HTTP exports.
///
/// Names compare case-insensitively. Inserting a name that already exists
/// replaces its value but keeps the spelling it was first seen with.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders(Vec<(String, String)>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `key=value,key2=value2` list.
    ///
    /// Entries without `=` or with an empty key are dropped, keys and values
    /// are trimmed, and a later duplicate key overwrites an earlier one.
    pub fn parse(raw: &str) -> Self {
        let mut headers = Self::new();
        if raw.trim().is_empty() {
            return headers;
        }

        for pair in raw.split(',').filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            headers.insert(key, value.trim());
        }
        headers
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        match self
            .0
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing_value)) => *existing_value = value.to_string(),
            None => self.0.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Header values frequently carry API keys, so only names are printed.
impl fmt::Debug for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|(name, _)| format!("{name}=<redacted>")))
            .finish()
    }
}

/// Immutable emission settings.
#[derive(Debug, Clone, Validate)]
pub struct Settings {
    /// Collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: String,

    /// Global emission interval in seconds.
    #[validate(range(min = 1, message = "Interval must be at least 1 second"))]
    pub interval_secs: u64,

    #[validate(range(min = 1, message = "Logs interval must be at least 1 second"))]
    pub logs_interval_secs: u64,

    #[validate(range(min = 1, message = "Metrics interval must be at least 1 second"))]
    pub metrics_interval_secs: u64,

    #[validate(range(min = 1, message = "Traces interval must be at least 1 second"))]
    pub traces_interval_secs: u64,

    pub enable_logs: bool,
    pub enable_metrics: bool,
    pub enable_traces: bool,

    /// Value of the `custom_label` attribute attached to every signal.
    pub custom_label: String,

    pub http_headers: HttpHeaders,

    /// Lower-cased export protocol tag.
    pub export_protocol: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            logs_interval_secs: DEFAULT_INTERVAL_SECS,
            metrics_interval_secs: DEFAULT_INTERVAL_SECS,
            traces_interval_secs: DEFAULT_INTERVAL_SECS,
            enable_logs: true,
            enable_metrics: true,
            enable_traces: true,
            custom_label: DEFAULT_CUSTOM_LABEL.to_string(),
            http_headers: HttpHeaders::new(),
            export_protocol: DEFAULT_EXPORT_PROTOCOL.to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidInterval` when `OTEL_INTERVAL_SECONDS` is
    /// set but is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval_secs = match lookup(ENV_INTERVAL) {
            Some(raw) => parse_interval(&raw).ok_or_else(|| ConfigError::InvalidInterval {
                variable: ENV_INTERVAL.to_string(),
                value: raw.clone(),
            })?,
            None => DEFAULT_INTERVAL_SECS,
        };
        let override_or_global = |key: &str| {
            lookup(key)
                .as_deref()
                .and_then(parse_interval)
                .unwrap_or(interval_secs)
        };

        let export_protocol = match lookup(ENV_EXPORT_PROTOCOL) {
            Some(raw) if !raw.trim().is_empty() => raw.to_lowercase(),
            _ => DEFAULT_EXPORT_PROTOCOL.to_string(),
        };

        let settings = Self {
            endpoint: lookup(ENV_ENDPOINT).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            interval_secs,
            logs_interval_secs: override_or_global(ENV_INTERVAL_LOGS),
            metrics_interval_secs: override_or_global(ENV_INTERVAL_METRICS),
            traces_interval_secs: override_or_global(ENV_INTERVAL_TRACES),
            enable_logs: parse_enabled(lookup(ENV_ENABLE_LOGS).as_deref()),
            enable_metrics: parse_enabled(lookup(ENV_ENABLE_METRICS).as_deref()),
            enable_traces: parse_enabled(lookup(ENV_ENABLE_TRACES).as_deref()),
            custom_label: lookup(ENV_CUSTOM_LABEL)
                .unwrap_or_else(|| DEFAULT_CUSTOM_LABEL.to_string()),
            http_headers: lookup(ENV_HTTP_HEADERS)
                .map(|raw| HttpHeaders::parse(&raw))
                .unwrap_or_default(),
            export_protocol,
        };

        settings
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(settings)
    }

    /// Emission interval for the given signal.
    pub fn interval_for(&self, kind: SignalKind) -> Duration {
        let secs = match kind {
            SignalKind::Logs => self.logs_interval_secs,
            SignalKind::Metrics => self.metrics_interval_secs,
            SignalKind::Traces => self.traces_interval_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn is_enabled(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::Logs => self.enable_logs,
            SignalKind::Metrics => self.enable_metrics,
            SignalKind::Traces => self.enable_traces,
        }
    }

    /// Signals whose emitter loops should run, in a stable order.
    pub fn enabled_signals(&self) -> Vec<SignalKind> {
        SignalKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// True when the raw HTTP probe is active.
    pub fn uses_http_probe(&self) -> bool {
        self.export_protocol.eq_ignore_ascii_case(HTTP_PROTOCOL)
    }
}

fn parse_interval(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

fn parse_enabled(raw: Option<&str>) -> bool {
    !raw.is_some_and(|v| v.eq_ignore_ascii_case("false"))
}
