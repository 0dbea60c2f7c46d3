//! Configuration for a relay
//!
//! This module provides the configuration structure for a relay and the
//! lookups that read the host's execution budget from the environment.

use serde::{Deserialize, Serialize};

use crate::{BatonError, Result};

/// Storage key used when the caller does not pick one
pub const DEFAULT_STORAGE_KEY: &str = "baton_storage";

/// Seconds of remaining budget below which a hand-off is forced
pub const DEFAULT_THRESHOLD_SECS: u64 = 5;

/// Argument that turns an invocation into a capability probe
pub const DEFAULT_PROBE_KEY: &str = "baton_check_exec";

/// What a probed invocation prints back
pub const DEFAULT_PROBE_ANSWER: &str = "baton_check_exec_ok";

/// Host execution ceiling in seconds; absent or 0 means unlimited
pub const MAX_EXECUTION_TIME_ENV: &str = "BATON_MAX_EXECUTION_TIME";

/// Overrides [`RelayConfig::storage_key`]
pub const STORAGE_KEY_ENV: &str = "BATON_STORAGE_KEY";

/// Overrides [`RelayConfig::threshold_secs`]
pub const THRESHOLD_ENV: &str = "BATON_THRESHOLD";

/// Sentinel argument and answer for the capability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub key: String,
    pub answer: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_PROBE_KEY.to_string(),
            answer: DEFAULT_PROBE_ANSWER.to_string(),
        }
    }
}

/// Configuration structure for a relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Checkpoint file path in process mode, session slot in request mode
    pub storage_key: String,
    /// Minimum remaining seconds before a hand-off is forced
    pub threshold_secs: u64,
    /// Execution ceiling in seconds; `None` reads it from the host
    pub ceiling_secs: Option<u64>,
    /// Capability probe sentinel
    pub probe: ProbeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            threshold_secs: DEFAULT_THRESHOLD_SECS,
            ceiling_secs: None,
            probe: ProbeConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Use `key` as the checkpoint file path or session slot
    pub fn with_storage_key<S: Into<String>>(mut self, key: S) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_threshold(mut self, threshold_secs: u64) -> Self {
        self.threshold_secs = threshold_secs;
        self
    }

    /// Pin the ceiling instead of reading it from the host
    pub fn with_ceiling(mut self, ceiling_secs: u64) -> Self {
        self.ceiling_secs = Some(ceiling_secs);
        self
    }

    /// Default configuration overlaid with `BATON_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Default configuration overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup(STORAGE_KEY_ENV) {
            config.storage_key = key;
        }

        if let Some(raw) = lookup(THRESHOLD_ENV) {
            config.threshold_secs = raw.trim().parse().map_err(|_| {
                BatonError::validation(format!("{THRESHOLD_ENV} must be a whole number of seconds, got {raw:?}"))
            })?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage_key.is_empty() {
            return Err(BatonError::validation("storage key cannot be empty"));
        }
        if self.probe.key.is_empty() || self.probe.answer.is_empty() {
            return Err(BatonError::validation(
                "probe key and probe answer cannot be empty",
            ));
        }
        if self.probe.key == self.probe.answer {
            return Err(BatonError::validation(
                "probe answer must differ from the probe key",
            ));
        }
        Ok(())
    }

    /// The execution ceiling in seconds, reading the host setting if not pinned
    ///
    /// # Errors
    /// [`BatonError::BudgetConfigUnavailable`] if the host setting is present
    /// but unreadable
    pub fn resolve_ceiling(&self) -> Result<u64> {
        if let Some(ceiling) = self.ceiling_secs {
            return Ok(ceiling);
        }

        match std::env::var(MAX_EXECUTION_TIME_ENV) {
            Ok(raw) => parse_ceiling(Some(&raw)),
            Err(std::env::VarError::NotPresent) => parse_ceiling(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(BatonError::BudgetConfigUnavailable(
                format!("can't retrieve {MAX_EXECUTION_TIME_ENV}: not valid unicode"),
            )),
        }
    }
}

/// Interpret the host's ceiling setting
///
/// An absent setting means no ceiling (0). A present setting must be a whole
/// number of seconds.
pub fn parse_ceiling(raw: Option<&str>) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(0);
    };

    raw.trim().parse().map_err(|_| {
        BatonError::BudgetConfigUnavailable(format!(
            "can't retrieve {MAX_EXECUTION_TIME_ENV}: {raw:?} is not a whole number of seconds"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.threshold_secs, 5);
        assert_eq!(config.ceiling_secs, None);
        assert_eq!(config.probe.key, DEFAULT_PROBE_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            (STORAGE_KEY_ENV, "/tmp/job.state"),
            (THRESHOLD_ENV, " 12 "),
        ]))
        .unwrap();

        assert_eq!(config.storage_key, "/tmp/job.state");
        assert_eq!(config.threshold_secs, 12);
    }

    #[test]
    fn test_bad_threshold_is_rejected() {
        let result = RelayConfig::from_lookup(lookup_from(&[(THRESHOLD_ENV, "soon")]));

        assert!(matches!(result, Err(BatonError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RelayConfig::default().with_storage_key("");
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.probe.answer = config.probe.key.clone();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.probe.key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_ceiling() {
        assert_eq!(parse_ceiling(None).unwrap(), 0);
        assert_eq!(parse_ceiling(Some("0")).unwrap(), 0);
        assert_eq!(parse_ceiling(Some("30")).unwrap(), 30);

        assert!(matches!(
            parse_ceiling(Some("")),
            Err(BatonError::BudgetConfigUnavailable(_))
        ));
        assert!(matches!(
            parse_ceiling(Some("thirty")),
            Err(BatonError::BudgetConfigUnavailable(_))
        ));
    }

    #[test]
    fn test_pinned_ceiling_wins() {
        let config = RelayConfig::default().with_ceiling(45);

        assert_eq!(config.resolve_ceiling().unwrap(), 45);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"storage_key": "job.state", "ceiling_secs": 60}"#).unwrap();

        assert_eq!(config.storage_key, "job.state");
        assert_eq!(config.ceiling_secs, Some(60));
        assert_eq!(config.threshold_secs, DEFAULT_THRESHOLD_SECS);
        assert_eq!(config.probe, ProbeConfig::default());
    }
}
