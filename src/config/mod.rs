//! Application configuration loading, validation, and management.
//!
//! This module provides the top-level `Config` structure that aggregates the
//! logging configuration and the emission settings. Logging may come from an
//! optional TOML file and environment overrides; emission settings come from
//! the environment only.
//!
//! The configuration is loaded early in the application lifecycle and is
//! intended to remain immutable thereafter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use validator::Validate;

use self::{
    logger::{LogFormat, LoggerConfig},
    settings::Settings,
};

pub mod logger;
pub mod settings;

pub const ENV_CONFIG_PATH: &str = "OTELGEN_CONFIG";
pub const ENV_LOG_LEVEL: &str = "OTELGEN_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "OTELGEN_LOG_FORMAT";
pub const ENV_LOG_ANSI: &str = "OTELGEN_LOG_ANSI";

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// UTC timestamp used by the `print_*` macros.
#[doc(hidden)]
pub fn early_timestamp() -> String {
    let format = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    );
    time::OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

/// Errors that can occur during configuration loading, parsing or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global interval was set to something other than a positive integer.
    #[error("Invalid value for {variable}: {value:?} (expected a positive number of seconds)")]
    InvalidInterval { variable: String, value: String },

    /// IO error while accessing the configuration file.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Shape of the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    logger: LoggerConfig,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Logging subsystem configuration.
    pub logger: LoggerConfig,

    /// Emission settings.
    pub settings: Settings,
}

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the config file named by `OTELGEN_CONFIG`
    /// cannot be read or parsed, if any value fails validation, or if the
    /// global emission interval is malformed.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut logger = match lookup(ENV_CONFIG_PATH) {
            Some(path) => {
                let path = PathBuf::from(path);
                print_info!("Using config from {}: {}", ENV_CONFIG_PATH, path.display());
                Self::load_logger(&path)?
            }
            None => LoggerConfig::default(),
        };
        Self::apply_logger_overrides(&mut logger, &lookup)?;

        logger
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let settings = Settings::from_lookup(&lookup)?;

        Ok(Config { logger, settings })
    }

    /// Loads the `[logger]` table from a TOML file.
    ///
    /// # Errors
    ///
    /// Propagates IO and parsing errors as `ConfigError`.
    pub fn load_logger(path: &Path) -> Result<LoggerConfig, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let file: FileConfig =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(file.logger)
    }

    fn apply_logger_overrides<F>(logger: &mut LoggerConfig, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            logger.level = level;
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            let format = raw.parse::<LogFormat>().map_err(ConfigError::Config)?;
            logger.console.get_or_insert_with(Default::default).format = format;
        }

        if let Some(raw) = lookup(ENV_LOG_ANSI) {
            let ansi = match raw.trim().to_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            };
            match ansi {
                Some(ansi) => logger.console.get_or_insert_with(Default::default).ansi_colors = ansi,
                None => {
                    print_warn!("Ignoring {}={:?}, expected true or false", ENV_LOG_ANSI, raw);
                }
            }
        }

        Ok(())
    }
}
