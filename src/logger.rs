//! Centralized logging configuration and initialization manager.
//!
//! The `LoggerManager` validates logging configuration and initializes
//! the global `tracing` subscriber with a console layer and, when provided,
//! an extra layer such as the OTLP log bridge from `telemetry`.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer, Registry};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// General initialization failure with a descriptive message.
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    /// Validation errors from the logger configuration struct.
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// No output layers were configured.
    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,
}

/// Manages logging configuration and global subscriber initialization.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Creates a new `LoggerManager` and validates the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    /// Initializes the global `tracing` subscriber.
    ///
    /// The console layer is filtered by `RUST_LOG` when set, else by the
    /// configured level. `extra` is added as-is and keeps its own filter.
    /// Must be called once, before emitters start.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::NoLayersConfigured` if the console is disabled
    /// and no extra layer is given, or `InitializationError` if a global
    /// subscriber is already installed.
    pub fn init(&mut self, extra: Option<BoxedLayer>) -> Result<(), LoggerError> {
        let layers = self.build_layers(extra)?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    fn build_layers(&self, extra: Option<BoxedLayer>) -> Result<Vec<BoxedLayer>, LoggerError> {
        let mut layers = Vec::new();
        match &self.config.console {
            Some(console_config) if console_config.enabled => {
                let console_filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(&self.config.level));
                layers.push(self.init_console_logger(console_config, console_filter));
            }
            _ => {}
        }
        if let Some(layer) = extra {
            layers.push(layer);
        }
        // Ensure at least one layer is available
        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }
        Ok(layers)
    }

    /// Constructs a console output layer according to the provided configuration.
    fn init_console_logger(&self, config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
        let writer = io::stdout;
        let span_events = if config.show_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_span_events(span_events)
            .with_ansi(config.ansi_colors)
            .with_writer(writer);

        match config.format {
            LogFormat::Json => base.json().with_filter(filter).boxed(),
            LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => base.compact().with_filter(filter).boxed(),
        }
    }
}
