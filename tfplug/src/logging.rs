//! Provider logging
//!
//! Terraform captures a plugin's stderr and shows it when `TF_LOG` (or the
//! provider-only `TF_LOG_PROVIDER`) is set, so logs go to stderr without
//! ANSI colouring.

use crate::error::{Result, TfplugError};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `TF_LOG_PROVIDER` wins over `TF_LOG`. Unset or unrecognised means
    /// the provider stays quiet below warnings.
    pub fn from_env() -> Self {
        ["TF_LOG_PROVIDER", "TF_LOG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| value.parse().ok())
            .unwrap_or(LogLevel::Warn)
    }

    fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = TfplugError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "JSON" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(TfplugError::LoggingError(format!(
                "unrecognised log level: {}",
                other
            ))),
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: LogLevel) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level.as_tracing())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| TfplugError::LoggingError(e.to_string()))
}

/// [`init`] with the level taken from the environment
pub fn init_from_env() -> Result<()> {
    init(LogLevel::from_env())
}
