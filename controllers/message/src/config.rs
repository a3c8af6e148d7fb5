//! Controller configuration.
//!
//! Loaded once from environment variables by the binary. Parsing goes through
//! a lookup function so tests don't have to touch the process environment.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use message_client::client::{DEFAULT_WATCH_TIMEOUT_SECS, MAX_WATCH_TIMEOUT_SECS};
use std::time::Duration;

/// Runtime configuration for the Message Controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Relist interval; zero disables periodic resync
    pub resync_period: Duration,
    /// First reconnect delay
    pub backoff_min: Duration,
    /// Reconnect delay cap
    pub backoff_max: Duration,
    /// Server-side watch timeout in seconds
    pub watch_timeout_secs: u32,
    /// Condition status writes on the observed resourceVersion
    pub conditional_writes: bool,
    /// Create the Message CRD at startup if missing
    pub install_crd: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_period: Duration::ZERO,
            backoff_min: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(30_000),
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            conditional_writes: false,
            install_crd: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidConfig`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidConfig`] when a value is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let resync_period = parse_u64(&lookup, "RESYNC_PERIOD_SECS")?
            .map_or(defaults.resync_period, Duration::from_secs);
        let backoff_min = parse_u64(&lookup, "WATCH_BACKOFF_MIN_MS")?
            .map_or(defaults.backoff_min, Duration::from_millis);
        let backoff_max = parse_u64(&lookup, "WATCH_BACKOFF_MAX_MS")?
            .map_or(defaults.backoff_max, Duration::from_millis);
        if backoff_min.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "WATCH_BACKOFF_MIN_MS must be greater than zero".to_string(),
            ));
        }
        if backoff_max < backoff_min {
            return Err(ControllerError::InvalidConfig(format!(
                "WATCH_BACKOFF_MAX_MS ({}ms) must not be below WATCH_BACKOFF_MIN_MS ({}ms)",
                backoff_max.as_millis(),
                backoff_min.as_millis()
            )));
        }

        let watch_timeout_secs = match parse_u64(&lookup, "WATCH_TIMEOUT_SECS")? {
            None => defaults.watch_timeout_secs,
            Some(secs) => match u32::try_from(secs) {
                Ok(secs) if (1..=MAX_WATCH_TIMEOUT_SECS).contains(&secs) => secs,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "WATCH_TIMEOUT_SECS must be between 1 and {MAX_WATCH_TIMEOUT_SECS}, got {secs}"
                    )));
                }
            },
        };

        Ok(Self {
            namespace,
            resync_period,
            backoff_min,
            backoff_max,
            watch_timeout_secs,
            conditional_writes: parse_bool(&lookup, "CONDITIONAL_STATUS_WRITES")?
                .unwrap_or(defaults.conditional_writes),
            install_crd: parse_bool(&lookup, "INSTALL_CRD")?.unwrap_or(defaults.install_crd),
        })
    }

    /// Reconnect backoff built from this configuration.
    #[must_use]
    pub fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.backoff_min, self.backoff_max)
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("{key}={raw:?} is not a non-negative integer: {e}"))
            })
        })
        .transpose()
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ControllerError::InvalidConfig(format!("{key}={raw:?} is not a boolean"))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        assert_eq!(config(&[]).unwrap(), ControllerConfig::default());
        assert!(ControllerConfig::default().resync_period.is_zero());
    }

    #[test]
    fn test_all_values_parsed() {
        let cfg = config(&[
            ("WATCH_NAMESPACE", "messages"),
            ("RESYNC_PERIOD_SECS", "300"),
            ("WATCH_BACKOFF_MIN_MS", "250"),
            ("WATCH_BACKOFF_MAX_MS", "5000"),
            ("WATCH_TIMEOUT_SECS", "60"),
            ("CONDITIONAL_STATUS_WRITES", "true"),
            ("INSTALL_CRD", "no"),
        ])
        .unwrap();
        assert_eq!(cfg.namespace.as_deref(), Some("messages"));
        assert_eq!(cfg.resync_period, Duration::from_secs(300));
        assert_eq!(cfg.backoff_min, Duration::from_millis(250));
        assert_eq!(cfg.backoff_max, Duration::from_secs(5));
        assert_eq!(cfg.watch_timeout_secs, 60);
        assert!(cfg.conditional_writes);
        assert!(!cfg.install_crd);
    }

    #[test]
    fn test_watch_timeout_stays_below_kube_limit() {
        assert_eq!(config(&[("WATCH_TIMEOUT_SECS", "294")]).unwrap().watch_timeout_secs, 294);
        assert!(matches!(config(&[("WATCH_TIMEOUT_SECS", "295")]), Err(ControllerError::InvalidConfig(_))));
        assert!(matches!(config(&[("WATCH_TIMEOUT_SECS", "0")]), Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn test_blank_namespace_means_all_namespaces() {
        assert_eq!(config(&[("WATCH_NAMESPACE", "  ")]).unwrap().namespace, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(config(&[("RESYNC_PERIOD_SECS", "-1")]), Err(ControllerError::InvalidConfig(_))));
        assert!(matches!(config(&[("INSTALL_CRD", "maybe")]), Err(ControllerError::InvalidConfig(_))));
        assert!(matches!(config(&[("WATCH_TIMEOUT_SECS", "600")]), Err(ControllerError::InvalidConfig(_))));
        assert!(matches!(config(&[("WATCH_BACKOFF_MIN_MS", "0")]), Err(ControllerError::InvalidConfig(_))));
        assert!(matches!(
            config(&[("WATCH_BACKOFF_MIN_MS", "2000"), ("WATCH_BACKOFF_MAX_MS", "1000")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
