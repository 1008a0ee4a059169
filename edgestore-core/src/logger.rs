//! Level-gated logging.
//!
//! The handler owns a [`Logger`] built from its config; there is no process
//! global. Events go through `tracing` under the `edgestore` target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    None,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::None => "none",
        }
    }

    fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::None => "off",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown log level `{0}` (expected debug, info, warn, error or none)")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "none" | "off" => Ok(LogLevel::None),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    level: LogLevel,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// `LogLevel::None` is never enabled.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && self.level != LogLevel::None && level >= self.level
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(target: "edgestore", "{msg}");
        }
    }

    pub fn info(&self, msg: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "edgestore", "{msg}");
        }
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(target: "edgestore", "{msg}");
        }
    }

    pub fn error(&self, msg: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(target: "edgestore", "{msg}");
        }
    }
}

/// Install a `fmt` subscriber honouring `RUST_LOG`, falling back to `level`.
///
/// Returns `false` when a global subscriber was already set.
pub fn init_subscriber(level: LogLevel) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_follows_level_order() {
        let logger = Logger::new(LogLevel::Warn);
        assert!(!logger.enabled(LogLevel::Info));
        assert!(logger.enabled(LogLevel::Warn));
        assert!(logger.enabled(LogLevel::Error));

        let silent = Logger::new(LogLevel::None);
        assert!(!silent.enabled(LogLevel::Error));
    }

    #[test]
    fn parses_names() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::None);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
