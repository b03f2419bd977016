//! Runtime settings, read from the environment (and `.env`, loaded by `main`).

use crate::error::ConfigError;
use claude_gateway_core::codec::DEFAULT_MAX_LINE_BYTES;
use std::{fmt, path::PathBuf};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9876;
pub const DEFAULT_LOG_LEVEL: &str = "debug";

#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub auth_user: String,
    pub auth_password: String,
    /// Explicit agent binary; `None` means look `claude` up on PATH.
    pub claude_path: Option<PathBuf>,
    pub log_level: String,
    /// Directory for daily rolling log files; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
    /// Longest accepted agent output line, in bytes.
    pub buffer_limit: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port = match get("PORT") {
            Some(raw) => parse_number("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let buffer_limit = match get("BUFFER_LIMIT") {
            Some(raw) => parse_number("BUFFER_LIMIT", &raw)?,
            None => DEFAULT_MAX_LINE_BYTES,
        };
        if buffer_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "BUFFER_LIMIT",
                value: "0".into(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            auth_user: required("AUTH_USER")?,
            auth_password: required("AUTH_PASSWORD")?,
            claude_path: get("CLAUDE_PATH").map(PathBuf::from),
            log_level: get("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_dir: get("LOG_DIR").map(PathBuf::from),
            buffer_limit,
        })
    }

    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

// Keeps the password out of logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_user", &self.auth_user)
            .field("auth_password", &"<redacted>")
            .field("claude_path", &self.claude_path)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .field("buffer_limit", &self.buffer_limit)
            .finish()
    }
}
