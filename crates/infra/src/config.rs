//! Configuration loading and representation.

use std::net::SocketAddr;

use thiserror::Error;

use crate::engine::DEFAULT_MAX_COMMIT_ATTEMPTS;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `STOCKROOM_BIND_ADDR`
    pub bind_addr: SocketAddr,
    /// `DATABASE_URL`; absent selects the in-memory store.
    pub database_url: Option<String>,
    /// `STOCKROOM_MAX_COMMIT_ATTEMPTS`
    pub max_commit_attempts: u32,
    /// `STOCKROOM_DB_MAX_CONNECTIONS`
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_var(
            "STOCKROOM_BIND_ADDR",
            get("STOCKROOM_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let max_commit_attempts: u32 = match get("STOCKROOM_MAX_COMMIT_ATTEMPTS") {
            Some(raw) => parse_var("STOCKROOM_MAX_COMMIT_ATTEMPTS", raw)?,
            None => DEFAULT_MAX_COMMIT_ATTEMPTS,
        };
        if max_commit_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "STOCKROOM_MAX_COMMIT_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let db_max_connections = match get("STOCKROOM_DB_MAX_CONNECTIONS") {
            Some(raw) => parse_var("STOCKROOM_DB_MAX_CONNECTIONS", raw)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            max_commit_attempts,
            db_max_connections,
        })
    }
}

fn parse_var<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_select_in_memory_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.max_commit_attempts, 8);
        assert_eq!(cfg.db_max_connections, 5);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("STOCKROOM_BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/stockroom"),
            ("STOCKROOM_MAX_COMMIT_ATTEMPTS", "3"),
            ("STOCKROOM_DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/stockroom"));
        assert_eq!(cfg.max_commit_attempts, 3);
        assert_eq!(cfg.db_max_connections, 12);
    }

    #[test]
    fn blank_database_url_is_unset() {
        let cfg = config(&[("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn rejects_zero_attempts_and_garbage() {
        let err = config(&[("STOCKROOM_MAX_COMMIT_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "STOCKROOM_MAX_COMMIT_ATTEMPTS",
                ..
            }
        ));

        let err = config(&[("STOCKROOM_BIND_ADDR", "not-an-addr")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "STOCKROOM_BIND_ADDR", .. }));
    }
}
