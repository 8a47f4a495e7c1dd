//! otelgen - synthetic telemetry generator for OpenTelemetry collectors
//!
//! This crate periodically emits logs, metrics and trace spans toward an
//! OTLP collector so that telemetry pipelines can be exercised end to end.
//! Each signal runs in its own loop with its own interval, and a shared
//! connection-status tracker reports collector reachability without
//! flooding the log.
//!
//! ## Modules
//!
//! * `config` - Environment settings, logger configuration (optional TOML
//!   file plus environment overrides) and validation via `validator`.
//!
//! * `core` - Emission runtime:
//!   - Signal kinds and the OpenTelemetry instruments
//!   - Per-signal emitter loops
//!   - Connection status tracking with hysteresis
//!   - Optional raw HTTP probe per emission
//!   - Service supervising the emitters
//!
//! * `logger` - Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and an optional OTLP log bridge layer.
//!
//! * `telemetry` - OTLP exporters and SDK providers (gRPC or HTTP/protobuf).

pub mod config;
pub mod core;
pub mod logger;
pub mod telemetry;
