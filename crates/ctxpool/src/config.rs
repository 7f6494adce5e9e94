//! Pool configuration.

use serde::Deserialize;

pub const ENV_PREALLOCATE: &str = "CTXPOOL_PREALLOCATE";
pub const ENV_MAX_IDLE: &str = "CTXPOOL_MAX_IDLE";
pub const ENV_REPLENISH: &str = "CTXPOOL_REPLENISH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Contexts created up front, all available.
    pub preallocate: usize,
    /// Upper bound on the free-list. Released contexts beyond it are destroyed.
    pub max_idle: Option<usize>,
    /// Allocate a fresh available context for every terminated one.
    pub replenish_on_terminate: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            preallocate: 0,
            max_idle: None,
            replenish_on_terminate: false,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preallocate(mut self, count: usize) -> Self {
        self.preallocate = count;
        self
    }

    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = Some(max);
        self
    }

    pub fn with_replenish(mut self, replenish: bool) -> Self {
        self.replenish_on_terminate = replenish;
        self
    }

    /// Defaults overridden by `CTXPOOL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `CTXPOOL_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PREALLOCATE) {
            config.preallocate = parse_count(ENV_PREALLOCATE, &value)?;
        }

        if let Some(value) = lookup(ENV_MAX_IDLE) {
            config.max_idle = match value.trim() {
                "" | "none" | "unbounded" => None,
                _ => Some(parse_count(ENV_MAX_IDLE, &value)?),
            };
        }

        if let Some(value) = lookup(ENV_REPLENISH) {
            config.replenish_on_terminate = parse_flag(ENV_REPLENISH, &value)?;
        }

        if let Some(max) = config.max_idle
            && config.preallocate > max
        {
            tracing::warn!(
                preallocate = config.preallocate,
                max_idle = max,
                "Preallocation exceeds max_idle - surplus contexts will be trimmed on release"
            );
        }

        Ok(config)
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, value, e))
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.preallocate, 0);
        assert_eq!(config.max_idle, None);
        assert!(!config.replenish_on_terminate);
    }

    #[test]
    fn builder_pattern() {
        let config = PoolConfig::new()
            .with_preallocate(8)
            .with_max_idle(16)
            .with_replenish(true);

        assert_eq!(config.preallocate, 8);
        assert_eq!(config.max_idle, Some(16));
        assert!(config.replenish_on_terminate);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = PoolConfig::from_lookup(lookup(&[
            (ENV_PREALLOCATE, "100"),
            (ENV_MAX_IDLE, " 100 "),
            (ENV_REPLENISH, "yes"),
        ]))
        .unwrap();

        assert_eq!(
            config,
            PoolConfig {
                preallocate: 100,
                max_idle: Some(100),
                replenish_on_terminate: true,
            }
        );
    }

    #[test]
    fn empty_lookup_is_default() {
        let config = PoolConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn max_idle_accepts_unbounded() {
        let config = PoolConfig::from_lookup(lookup(&[(ENV_MAX_IDLE, "unbounded")])).unwrap();
        assert_eq!(config.max_idle, None);
    }

    #[test]
    fn invalid_count_is_rejected() {
        let err = PoolConfig::from_lookup(lookup(&[(ENV_PREALLOCATE, "lots")])).unwrap_err();
        let ConfigError::Invalid { key, value, .. } = &err;
        assert_eq!(*key, ENV_PREALLOCATE);
        assert_eq!(value, "lots");
        assert!(err.to_string().starts_with("invalid value for CTXPOOL_PREALLOCATE: \"lots\""));
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let err = PoolConfig::from_lookup(lookup(&[(ENV_REPLENISH, "maybe")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for CTXPOOL_REPLENISH: \"maybe\" (expected a boolean)"
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"preallocate": 4}"#).unwrap();
        assert_eq!(config.preallocate, 4);
        assert_eq!(config.max_idle, None);
        assert!(!config.replenish_on_terminate);
    }
}
