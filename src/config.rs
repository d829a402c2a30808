//! Dispatcher configuration.
//!
//! Settings can be built in code or read from the environment:
//!
//! | Variable                 | Values                  | Default   |
//! |--------------------------|-------------------------|-----------|
//! | `CALLTAP_HANDLER_ERRORS` | `isolate`, `propagate`  | `isolate` |

use crate::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable selecting the [`HandlerErrorPolicy`]
pub const HANDLER_ERRORS_ENV: &str = "CALLTAP_HANDLER_ERRORS";

/// What a failing tap handler does to the traced call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerErrorPolicy {
    /// Log the failure and carry on; the traced call is unaffected
    #[default]
    Isolate,
    /// Run every matching tap, then fail the traced call with the first failure
    Propagate,
}

impl FromStr for HandlerErrorPolicy {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(HandlerErrorPolicy::Isolate),
            "propagate" => Ok(HandlerErrorPolicy::Propagate),
            other => Err(TapError::Config(format!(
                "unknown handler error policy '{}' (expected isolate or propagate)",
                other
            ))),
        }
    }
}

impl fmt::Display for HandlerErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerErrorPolicy::Isolate => write!(f, "isolate"),
            HandlerErrorPolicy::Propagate => write!(f, "propagate"),
        }
    }
}

/// Configuration for an `EventDispatcher`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub handler_errors: HandlerErrorPolicy,
}

impl DispatcherConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(HANDLER_ERRORS_ENV) {
            config.handler_errors = value.parse()?;
        }
        Ok(config)
    }

    pub fn with_handler_errors(mut self, policy: HandlerErrorPolicy) -> Self {
        self.handler_errors = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_isolate() {
        let config = DispatcherConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.handler_errors, HandlerErrorPolicy::Isolate);
    }

    #[test]
    fn test_reads_policy() {
        let config =
            DispatcherConfig::from_lookup(lookup_from(&[(HANDLER_ERRORS_ENV, " Propagate ")]))
                .unwrap();
        assert_eq!(config.handler_errors, HandlerErrorPolicy::Propagate);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[(HANDLER_ERRORS_ENV, "ignore")]))
            .unwrap_err();
        assert!(matches!(err, TapError::Config(_)));
        assert!(err.to_string().contains("ignore"));
    }

    #[test]
    fn test_builder_and_serde() {
        let config = DispatcherConfig::default().with_handler_errors(HandlerErrorPolicy::Propagate);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"handler_errors":"propagate"}"#);

        let parsed: DispatcherConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, DispatcherConfig::default());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [HandlerErrorPolicy::Isolate, HandlerErrorPolicy::Propagate] {
            assert_eq!(policy.to_string().parse::<HandlerErrorPolicy>().unwrap(), policy);
        }
    }
}
