//! Process configuration, read from `MODULERP_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use modulerp_audit::AuditFailurePolicy;
use modulerp_events::{BusConfig, DispatchMode};

pub const HANDLER_TIMEOUT_MS: &str = "MODULERP_HANDLER_TIMEOUT_MS";
pub const DISPATCH_MODE: &str = "MODULERP_DISPATCH_MODE";
pub const AUDIT_FAILURE_POLICY: &str = "MODULERP_AUDIT_FAILURE_POLICY";
pub const LOG_FILTER: &str = "MODULERP_LOG_FILTER";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub handler_timeout: Duration,
    pub dispatch_mode: DispatchMode,
    pub audit_failure_policy: AuditFailurePolicy,
    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_millis(5_000),
            dispatch_mode: DispatchMode::Sequential,
            audit_failure_policy: AuditFailurePolicy::Log,
            log_filter: "info".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(HANDLER_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: HANDLER_TIMEOUT_MS,
                reason: format!("'{raw}' is not a whole number of milliseconds"),
            })?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: HANDLER_TIMEOUT_MS,
                    reason: "timeout must be positive".to_string(),
                });
            }
            config.handler_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(DISPATCH_MODE) {
            config.dispatch_mode = raw.parse().map_err(|e: modulerp_core::DomainError| {
                ConfigError::Invalid {
                    key: DISPATCH_MODE,
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(raw) = lookup(AUDIT_FAILURE_POLICY) {
            config.audit_failure_policy =
                raw.parse().map_err(|e: modulerp_core::DomainError| ConfigError::Invalid {
                    key: AUDIT_FAILURE_POLICY,
                    reason: e.to_string(),
                })?;
        }

        if let Some(raw) = lookup(LOG_FILTER) {
            let raw = raw.trim();
            if !raw.is_empty() {
                config.log_filter = raw.to_string();
            }
        }

        Ok(config)
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            handler_timeout: self.handler_timeout,
            mode: self.dispatch_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = CoreConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.bus_config(), BusConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let config = CoreConfig::from_lookup(lookup(&[
            (HANDLER_TIMEOUT_MS, "250"),
            (DISPATCH_MODE, "concurrent"),
            (AUDIT_FAILURE_POLICY, "surface"),
            (LOG_FILTER, "modulerp_events=debug"),
        ]))
        .unwrap();

        assert_eq!(config.handler_timeout, Duration::from_millis(250));
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);
        assert_eq!(config.audit_failure_policy, AuditFailurePolicy::Surface);
        assert_eq!(config.log_filter, "modulerp_events=debug");
    }

    #[test]
    fn rejects_bad_values() {
        for (key, value) in [
            (HANDLER_TIMEOUT_MS, "soon"),
            (HANDLER_TIMEOUT_MS, "0"),
            (DISPATCH_MODE, "parallel"),
            (AUDIT_FAILURE_POLICY, "ignore"),
        ] {
            let err = CoreConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key));
        }
    }
}
