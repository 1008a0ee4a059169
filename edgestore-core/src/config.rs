//! # Handler configuration
//!
//! Plain builder-style settings with an environment loader. Environment
//! variables follow the `PREFIX__KEY` convention:
//!
//! ```bash
//! export EDGE_STORE__LOG_LEVEL=info
//! export EDGE_STORE__BASE_PATH=/api/edgestore
//! export EDGE_STORE__DEVELOPMENT=true
//! export EDGE_STORE__CTX_MAX_AGE_SECS=86400
//! ```

use std::time::Duration;

use anyhow::{Context, Result};

use crate::logger::{LogLevel, Logger};

pub const DEFAULT_BASE_PATH: &str = "/api/edgestore";
pub const DEFAULT_CTX_COOKIE: &str = "edgestore-ctx";
pub const DEFAULT_TOKEN_COOKIE: &str = "edgestore-token";
pub const DEFAULT_ENV_PREFIX: &str = "EDGE_STORE";

#[derive(Debug, Clone)]
pub struct EdgeStoreConfig {
    /// Mount point of the HTTP routes; endpoints are matched by suffix.
    pub base_path: String,

    pub ctx_cookie: String,

    pub token_cookie: String,

    /// Lifetime of the context cookie and of the sealed token inside it
    pub ctx_max_age: Duration,

    pub log_level: LogLevel,

    /// Enables `/proxy-file`
    pub development: bool,

    pub secure_cookies: bool,
}

impl Default for EdgeStoreConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            ctx_cookie: DEFAULT_CTX_COOKIE.to_string(),
            token_cookie: DEFAULT_TOKEN_COOKIE.to_string(),
            ctx_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            log_level: LogLevel::default(),
            development: false,
            secure_cookies: true,
        }
    }
}

impl EdgeStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    pub fn with_ctx_max_age(mut self, max_age: Duration) -> Self {
        self.ctx_max_age = max_age;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn development(mut self) -> Self {
        self.development = true;
        self
    }

    pub fn insecure_cookies(mut self) -> Self {
        self.secure_cookies = false;
        self
    }

    pub fn logger(&self) -> Logger {
        Logger::new(self.log_level)
    }

    /// Load from the process environment using `PREFIX__KEY` variables.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        let head = format!("{prefix}__");

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(&head) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "LOG_LEVEL" => {
                    cfg.log_level = value
                        .parse()
                        .with_context(|| format!("{prefix}__LOG_LEVEL"))?;
                }
                "BASE_PATH" => cfg.base_path = value.to_string(),
                "DEVELOPMENT" => cfg.development = parse_bool(value),
                "SECURE_COOKIES" => cfg.secure_cookies = parse_bool(value),
                "CTX_MAX_AGE_SECS" => {
                    let secs: u64 = value
                        .parse()
                        .with_context(|| format!("{prefix}__CTX_MAX_AGE_SECS must be an integer"))?;
                    cfg.ctx_max_age = Duration::from_secs(secs);
                }
                _ => {}
            }
        }
        Ok(cfg)
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EdgeStoreConfig::default();
        assert_eq!(cfg.base_path, "/api/edgestore");
        assert_eq!(cfg.ctx_cookie, "edgestore-ctx");
        assert_eq!(cfg.ctx_max_age, Duration::from_secs(2_592_000));
        assert_eq!(cfg.log_level, LogLevel::Warn);
        assert!(!cfg.development);
    }

    #[test]
    fn reads_prefixed_vars_only() {
        let cfg = EdgeStoreConfig::from_vars(
            "EDGE_STORE",
            [
                ("EDGE_STORE__LOG_LEVEL", "info"),
                ("EDGE_STORE__DEVELOPMENT", "true"),
                ("EDGE_STORE__CTX_MAX_AGE_SECS", "60"),
                ("OTHER__BASE_PATH", "/nope"),
            ],
        )
        .unwrap();
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(cfg.development);
        assert_eq!(cfg.ctx_max_age, Duration::from_secs(60));
        assert_eq!(cfg.base_path, DEFAULT_BASE_PATH);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = EdgeStoreConfig::from_vars("EDGE_STORE", [("EDGE_STORE__CTX_MAX_AGE_SECS", "soon")]);
        assert!(err.is_err());
    }
}
