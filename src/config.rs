// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `refresh_tokens.redb` | `./data` |
//! | `JWT_SECRET` | HMAC secret for access tokens | Required for issuance |
//! | `APP_ENV` | Environment label shown by `/health` | `dev` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `TOKEN_SWEEP_INTERVAL_SECS` | Seconds between expired-token sweeps | `86400` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::sweeper::DEFAULT_SWEEP_INTERVAL;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the token database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the access-token signing secret.
///
/// Empty counts as unset. The server still starts without it; every
/// issuance and verification then fails with a configuration error.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

pub const APP_ENV_ENV: &str = "APP_ENV";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const SWEEP_INTERVAL_ENV: &str = "TOKEN_SWEEP_INTERVAL_SECS";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_APP_ENV: &str = "dev";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// File name of the token database inside `DATA_DIR`.
pub const TOKEN_DB_FILE: &str = "refresh_tokens.redb";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: Option<String>,
    pub environment: String,
    pub log_format: LogFormat,
    pub sweep_interval: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("environment", &self.environment)
            .field("log_format", &self.log_format)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unparsable numbers
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = lookup(PORT_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let data_dir = PathBuf::from(
            lookup(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );
        let jwt_secret = lookup(JWT_SECRET_ENV).filter(|s| !s.is_empty());
        let environment = lookup(APP_ENV_ENV)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ENV.to_string());
        let log_format = lookup(LOG_FORMAT_ENV)
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let sweep_interval = lookup(SWEEP_INTERVAL_ENV)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        Self {
            host,
            port,
            data_dir,
            jwt_secret,
            environment,
            log_format,
            sweep_interval,
        }
    }

    /// Path of the redb token database file.
    pub fn token_db_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_DB_FILE)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_db_path(), PathBuf::from("./data/refresh_tokens.redb"));
        assert_eq!(config.jwt_secret, None);
        assert_eq!(config.environment, "dev");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.sweep_interval, Duration::from_secs(86_400));
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("DATA_DIR", "/var/lib/auth"),
            ("JWT_SECRET", "s3cret"),
            ("APP_ENV", "production"),
            ("LOG_FORMAT", "JSON"),
            ("TOKEN_SWEEP_INTERVAL_SECS", "60"),
        ]);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.token_db_path(), PathBuf::from("/var/lib/auth/refresh_tokens.redb"));
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.environment, "production");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn empty_secret_is_unset_and_bad_numbers_fall_back() {
        let config = config_from(&[
            ("JWT_SECRET", ""),
            ("PORT", "not-a-port"),
            ("TOKEN_SWEEP_INTERVAL_SECS", "0"),
        ]);
        assert_eq!(config.jwt_secret, None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn debug_redacts_secret() {
        let config = config_from(&[("JWT_SECRET", "hunter2")]);
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
