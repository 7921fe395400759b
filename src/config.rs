//! Store call configuration: timeouts, retry budget, feed buffering

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Lift8Error, Result};

/// Prefix for environment overrides, e.g. `LIFT8_REQUEST_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "LIFT8_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on a single store request
    pub request_timeout_ms: u64,
    /// Extra attempts after a transient store failure
    pub max_store_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Change events buffered per subscriber before it starts lagging
    pub subscription_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_store_retries: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            subscription_buffer: 256,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Lift8Error::Configuration(format!("invalid sync config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `LIFT8_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = read_var(&lookup, "REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = v;
        }
        if let Some(v) = read_var(&lookup, "MAX_STORE_RETRIES")? {
            self.max_store_retries = v;
        }
        if let Some(v) = read_var(&lookup, "RETRY_BASE_DELAY_MS")? {
            self.retry_base_delay_ms = v;
        }
        if let Some(v) = read_var(&lookup, "RETRY_MAX_DELAY_MS")? {
            self.retry_max_delay_ms = v;
        }
        if let Some(v) = read_var(&lookup, "SUBSCRIPTION_BUFFER")? {
            self.subscription_buffer = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Lift8Error::Configuration(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(Lift8Error::Configuration(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        if self.subscription_buffer == 0 {
            return Err(Lift8Error::Configuration(
                "subscription_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

fn read_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match lookup(&key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Lift8Error::Configuration(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(400));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(1600));
        assert_eq!(config.backoff_delay(10), Duration::from_millis(5000));
        assert_eq!(config.backoff_delay(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SyncConfig::from_json_str(r#"{ "max_store_retries": 5 }"#).unwrap();
        assert_eq!(config.max_store_retries, 5);
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn test_bad_json_is_configuration_error() {
        let err = SyncConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, Lift8Error::Configuration(_)));

        let err = SyncConfig::from_json_str(r#"{ "request_timeout_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, Lift8Error::Configuration(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LIFT8_REQUEST_TIMEOUT_MS", "1500"),
            ("LIFT8_MAX_STORE_RETRIES", " 1 "),
        ]
        .into_iter()
        .collect();

        let config = SyncConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.max_store_retries, 1);
        assert_eq!(config.subscription_buffer, 256);
    }

    #[test]
    fn test_unparseable_override() {
        let err = SyncConfig::default()
            .with_overrides(|k| (k == "LIFT8_SUBSCRIPTION_BUFFER").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("LIFT8_SUBSCRIPTION_BUFFER"));
    }

    #[test]
    fn test_base_delay_above_cap_rejected() {
        let config = SyncConfig {
            retry_base_delay_ms: 10_000,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
