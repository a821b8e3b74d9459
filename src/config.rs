//! Runtime configuration from the environment.
//!
//! `.env` is loaded first when present; real environment variables win.
//! Parsing goes through a lookup function so tests never touch the process
//! environment.

use crate::alert::transition::ColdStart;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OWNER_ID: &str = "me";
pub const DEFAULT_CALIBRATION_FILE: &str = "calibration.toml";
pub const DEFAULT_NOTIFY_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_FRAME_MAX_AGE_SECONDS: u64 = 30 * 60;
pub const DEFAULT_AGGREGATE_FRAME_COUNT: usize = 3;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value '{value}': expected {expected}")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    database_url: Option<String>,
    pub owner_id: String,
    pub calibration_file: PathBuf,
    pub notify_api_base: String,
    notify_bot_token: Option<String>,
    pub notify_target_override: Option<String>,
    pub frame_max_age: Duration,
    pub aggregate_frame_count: usize,
    pub http_timeout: Duration,
    pub cold_start: ColdStart,
    pub log_file: Option<String>,
}

impl Config {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let frame_max_age_secs = parse_u64(&get, "FRAME_MAX_AGE_SECONDS", DEFAULT_FRAME_MAX_AGE_SECONDS)?;
        let http_timeout_secs = parse_u64(&get, "HTTP_TIMEOUT_SECONDS", DEFAULT_HTTP_TIMEOUT_SECONDS)?;
        if http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "HTTP_TIMEOUT_SECONDS",
                value: "0".to_string(),
                expected: "a positive number of seconds",
            });
        }
        let frame_count = parse_u64(
            &get,
            "AGGREGATE_FRAME_COUNT",
            DEFAULT_AGGREGATE_FRAME_COUNT as u64,
        )?;
        if frame_count == 0 {
            return Err(ConfigError::InvalidValue {
                var: "AGGREGATE_FRAME_COUNT",
                value: "0".to_string(),
                expected: "at least 1",
            });
        }
        let alert_on_first = match get("ALERT_ON_FIRST_OBSERVATION") {
            None => true,
            Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue {
                var: "ALERT_ON_FIRST_OBSERVATION",
                value: v.clone(),
                expected: "true or false",
            })?,
        };

        Ok(Config {
            database_url: get("DATABASE_URL"),
            owner_id: get("OWNER_ID").unwrap_or_else(|| DEFAULT_OWNER_ID.to_string()),
            calibration_file: PathBuf::from(
                get("CALIBRATION_FILE").unwrap_or_else(|| DEFAULT_CALIBRATION_FILE.to_string()),
            ),
            notify_api_base: get("NOTIFY_API_BASE")
                .unwrap_or_else(|| DEFAULT_NOTIFY_API_BASE.to_string()),
            notify_bot_token: get("NOTIFY_BOT_TOKEN"),
            notify_target_override: get("NOTIFY_TARGET_OVERRIDE"),
            frame_max_age: Duration::from_secs(frame_max_age_secs),
            aggregate_frame_count: frame_count as usize,
            http_timeout: Duration::from_secs(http_timeout_secs),
            cold_start: if alert_on_first {
                ColdStart::AlertImmediately
            } else {
                ColdStart::EstablishBaseline
            },
            log_file: get("RAINWATCH_LOG_FILE"),
        })
    }

    /// Required for `run` and `init-db`; `probe` never touches the store.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn notify_bot_token(&self) -> Result<&str, ConfigError> {
        self.notify_bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("NOTIFY_BOT_TOKEN"))
    }
}

fn parse_u64<G>(get: &G, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: v,
            expected: "a non-negative integer",
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.owner_id, "me");
        assert_eq!(config.calibration_file, PathBuf::from("calibration.toml"));
        assert_eq!(config.notify_api_base, "https://api.telegram.org");
        assert_eq!(config.frame_max_age, Duration::from_secs(1800));
        assert_eq!(config.aggregate_frame_count, 3);
        assert_eq!(config.http_timeout, Duration::from_secs(8));
        assert_eq!(config.cold_start, ColdStart::AlertImmediately);
        assert!(config.notify_target_override.is_none());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_required_values_are_reported_when_used() {
        let config = config_from(&[("NOTIFY_BOT_TOKEN", "  ")]).unwrap();
        assert_eq!(config.database_url(), Err(ConfigError::Missing("DATABASE_URL")));
        assert_eq!(
            config.notify_bot_token(),
            Err(ConfigError::Missing("NOTIFY_BOT_TOKEN")),
            "a blank token must count as missing"
        );
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/rainwatch"),
            ("OWNER_ID", "alice"),
            ("FRAME_MAX_AGE_SECONDS", "900"),
            ("AGGREGATE_FRAME_COUNT", "5"),
            ("ALERT_ON_FIRST_OBSERVATION", "false"),
            ("NOTIFY_TARGET_OVERRIDE", "-100123"),
        ])
        .unwrap();
        assert_eq!(config.database_url(), Ok("postgres://localhost/rainwatch"));
        assert_eq!(config.owner_id, "alice");
        assert_eq!(config.frame_max_age, Duration::from_secs(900));
        assert_eq!(config.aggregate_frame_count, 5);
        assert_eq!(config.cold_start, ColdStart::EstablishBaseline);
        assert_eq!(config.notify_target_override.as_deref(), Some("-100123"));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config_from(&[("FRAME_MAX_AGE_SECONDS", "half an hour")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "FRAME_MAX_AGE_SECONDS", .. }));

        let err = config_from(&[("AGGREGATE_FRAME_COUNT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "AGGREGATE_FRAME_COUNT", .. }));

        let err = config_from(&[("ALERT_ON_FIRST_OBSERVATION", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("ALERT_ON_FIRST_OBSERVATION"), "got {}", err);
    }
}
