// src/config.rs
//! Environment-sourced ingestion settings. Construction never fails:
//! malformed values fall back to defaults with a warning.

use std::time::Duration;
use tracing::warn;

pub const ENV_ENABLED: &str = "FEED_API_ENABLED";
pub const ENV_CREDENTIAL: &str = "FEED_API_CREDENTIAL";
pub const ENV_FETCH_INTERVAL: &str = "FEED_FETCH_INTERVAL_SECONDS";
pub const ENV_FETCH_LIMIT: &str = "FEED_FETCH_LIMIT";
pub const ENV_ERROR_BACKOFF: &str = "FEED_ERROR_BACKOFF_SECONDS";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_FETCH_LIMIT: u32 = 20;
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/news.db";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Master gate. When false the scheduler never starts and manual
    /// fetches return zero.
    pub enabled: bool,
    /// Cookie credential for the JSON feed provider. Missing means that
    /// provider short-circuits to an empty batch instead of failing.
    pub credential: Option<String>,
    pub fetch_interval: Duration,
    pub fetch_limit: u32,
    /// Retry delay after a failed cycle; deliberately shorter than
    /// `fetch_interval`.
    pub error_backoff: Duration,
    pub database_url: String,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            credential: None,
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: parse_bool(std::env::var(ENV_ENABLED).ok()),
            credential: std::env::var(ENV_CREDENTIAL)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            fetch_interval: Duration::from_secs(parse_u64(
                ENV_FETCH_INTERVAL,
                std::env::var(ENV_FETCH_INTERVAL).ok(),
                DEFAULT_FETCH_INTERVAL_SECS,
            )),
            fetch_limit: parse_u64(
                ENV_FETCH_LIMIT,
                std::env::var(ENV_FETCH_LIMIT).ok(),
                u64::from(DEFAULT_FETCH_LIMIT),
            ) as u32,
            error_backoff: Duration::from_secs(parse_u64(
                ENV_ERROR_BACKOFF,
                std::env::var(ENV_ERROR_BACKOFF).ok(),
                DEFAULT_ERROR_BACKOFF_SECS,
            )),
            database_url: std::env::var(ENV_DATABASE_URL)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.database_url),
            user_agent: defaults.user_agent,
        }
    }
}

fn parse_bool(raw: Option<String>) -> bool {
    raw.map(|v| matches!(v.trim(), "1" | "true" | "True" | "TRUE"))
        .unwrap_or(false)
}

fn parse_u64(name: &str, raw: Option<String>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(s) => match s.trim().parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!(option = name, value = %s, "unparseable value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_truthy_spellings() {
        assert!(parse_bool(Some("true".into())));
        assert!(parse_bool(Some("True".into())));
        assert!(parse_bool(Some("1".into())));
        assert!(!parse_bool(Some("yes".into())));
        assert!(!parse_bool(Some("0".into())));
        assert!(!parse_bool(None));
    }

    #[test]
    fn malformed_numbers_fall_back_to_default() {
        assert_eq!(parse_u64("X", Some("banana".into()), 7), 7);
        assert_eq!(parse_u64("X", Some("0".into()), 7), 7);
        assert_eq!(parse_u64("X", Some("42".into()), 7), 42);
        assert_eq!(parse_u64("X", None, 7), 7);
    }
}
