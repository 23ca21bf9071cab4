//! Collector configuration.
//!
//! Every knob the collector uses arrives through [`CollectorConfig`], passed
//! by reference into each component. Nothing in this crate reads the process
//! environment; the CLI layers `.env`, TOML files and flags into one of these.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest look-ahead horizon the collector accepts, in days.
pub const MAX_DAYS_AHEAD: u32 = 3650;

/// Latest-prices endpoint of the upstream fare API.
pub const DEFAULT_API_URL: &str = "https://api.travelpayouts.com/aviasales/v3/get_latest_prices";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Origin location codes (IATA).
    pub origins: Vec<String>,
    /// Destination location codes (IATA).
    pub dests: Vec<String>,
    pub currency: String,
    pub market: String,
    /// Look-ahead horizon: quotes departing later than snapshot day + this are dropped.
    pub days_ahead: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Total attempts per pair, including the first one.
    pub max_attempts: u32,
    /// Fixed delay after every attempt.
    pub pacing_ms: u64,
    /// Backoff unit after HTTP 429, multiplied by the attempt number.
    pub rate_limit_backoff_ms: u64,
    /// Backoff unit after any other failure, multiplied by the attempt number.
    pub failure_backoff_ms: u64,
    pub api_url: String,
    pub api_key: Option<String>,
    /// Root of the raw partitions: `{bronze_root}/dt={YYYY-MM-DD}/fares.csv`.
    pub bronze_root: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            origins: ["JFK", "LAX", "SFO", "ATL", "ORD"]
                .into_iter()
                .map(String::from)
                .collect(),
            dests: ["LHR", "CDG", "DXB", "HND", "SIN"]
                .into_iter()
                .map(String::from)
                .collect(),
            currency: "usd".into(),
            market: "us".into(),
            days_ahead: 150,
            timeout_secs: 15,
            max_attempts: 3,
            pacing_ms: 200,
            rate_limit_backoff_ms: 1500,
            failure_backoff_ms: 800,
            api_url: DEFAULT_API_URL.into(),
            api_key: None,
            bronze_root: PathBuf::from("data/bronze"),
        }
    }
}

impl CollectorConfig {
    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string. Location codes are trimmed and
    /// upper-cased the same way [`split_codes`] treats flag values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        for code in config.origins.iter_mut().chain(config.dests.iter_mut()) {
            *code = normalize_code(code);
        }
        Ok(config)
    }

    /// Check the invariants the collector relies on.
    ///
    /// `require_api_key` is false when quotes come from a source that does not
    /// talk to the upstream API (synthetic mode).
    pub fn validate(&self, require_api_key: bool) -> Result<(), ConfigError> {
        if self.origins.is_empty() {
            return Err(ConfigError::Invalid("origins list is empty".into()));
        }
        if self.dests.is_empty() {
            return Err(ConfigError::Invalid("destinations list is empty".into()));
        }
        if let Some(code) = self
            .origins
            .iter()
            .chain(&self.dests)
            .find(|c| c.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "blank location code {code:?}"
            )));
        }
        if self.days_ahead > MAX_DAYS_AHEAD {
            return Err(ConfigError::Invalid(format!(
                "days_ahead {} exceeds {MAX_DAYS_AHEAD}",
                self.days_ahead
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if require_api_key && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "missing API key (set TRAVELPAYOUTS_API_KEY or api_key)".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

/// Canonical location code: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Split a comma-separated code list: entries are normalized and blanks
/// dropped.
pub fn split_codes(list: &str) -> Vec<String> {
    list.split(',')
        .map(normalize_code)
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_collector_baseline() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.origins.len(), 5);
        assert_eq!(cfg.dests.len(), 5);
        assert_eq!(cfg.days_ahead, 150);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.pacing(), Duration::from_millis(200));
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let cfg = CollectorConfig::from_toml(
            r#"
origins = ["BOS"]
days_ahead = 30
api_key = "secret"
"#,
        )
        .unwrap();
        assert_eq!(cfg.origins, vec!["BOS"]);
        assert_eq!(cfg.days_ahead, 30);
        assert_eq!(cfg.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.currency, "usd");
        assert_eq!(cfg.dests.len(), 5);
    }

    #[test]
    fn toml_codes_are_upper_cased() {
        let cfg = CollectorConfig::from_toml(
            r#"
origins = [" jfk", "Lax"]
dests = ["lhr "]
"#,
        )
        .unwrap();
        assert_eq!(cfg.origins, vec!["JFK", "LAX"]);
        assert_eq!(cfg.dests, vec!["LHR"]);
    }

    #[test]
    fn validate_bounds_the_horizon() {
        let cfg = CollectorConfig {
            days_ahead: MAX_DAYS_AHEAD,
            ..Default::default()
        };
        assert!(cfg.validate(false).is_ok());

        let cfg = CollectorConfig {
            days_ahead: 200_000_000,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(false), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = CollectorConfig::from_toml("origins = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_empty_lists_and_zero_attempts() {
        let cfg = CollectorConfig {
            origins: vec![],
            ..Default::default()
        };
        assert!(cfg.validate(false).is_err());

        let cfg = CollectorConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(cfg.validate(false).is_err());
    }

    #[test]
    fn validate_requires_key_only_for_live_source() {
        let cfg = CollectorConfig::default();
        assert!(cfg.validate(false).is_ok());
        assert!(cfg.validate(true).is_err());

        let cfg = CollectorConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(cfg.validate(true).is_ok());
    }

    #[test]
    fn split_codes_trims_and_uppercases() {
        assert_eq!(split_codes(" jfk, lax ,,sfo "), vec!["JFK", "LAX", "SFO"]);
        assert!(split_codes(" , ").is_empty());
    }
}
