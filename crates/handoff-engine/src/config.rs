//! Engine Configuration

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use handoff_location::TrackerConfig;
use handoff_net::{ClientConfig, Url};
use handoff_verify::VerificationConfig;

/// Engine configuration options
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Backend client
    pub api: ClientConfig,

    /// GPS acquisition and watching
    pub tracker: TrackerConfig,

    /// Backend re-check and gating radius
    pub verification: VerificationConfig,
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: &'static str },
}

impl Config {
    /// Defaults overlaid with `HANDOFF_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`Config::from_env`], reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("HANDOFF_API_BASE_URL") {
            Url::parse(&url).map_err(|e| ConfigError::Parse {
                var: "HANDOFF_API_BASE_URL",
                value: url.clone(),
                reason: e.to_string(),
            })?;
            config.api.base_url = url;
        }
        if let Some(ms) = parse::<u64>(get("HANDOFF_REQUEST_TIMEOUT_MS"), "HANDOFF_REQUEST_TIMEOUT_MS")? {
            config.api.request_timeout = Duration::from_millis(ms);
        }

        let acquisition = &mut config.tracker.acquisition;
        if let Some(meters) = parse::<f64>(get("HANDOFF_TARGET_ACCURACY_M"), "HANDOFF_TARGET_ACCURACY_M")? {
            acquisition.target_accuracy_meters = positive(meters, "HANDOFF_TARGET_ACCURACY_M")?;
        }
        if let Some(retries) = parse::<u32>(get("HANDOFF_MAX_RETRIES"), "HANDOFF_MAX_RETRIES")? {
            if retries == 0 {
                return Err(ConfigError::Invalid {
                    var: "HANDOFF_MAX_RETRIES",
                    reason: "at least one attempt is required",
                });
            }
            acquisition.max_retries = retries;
        }
        if let Some(ms) = parse::<u64>(get("HANDOFF_ATTEMPT_TIMEOUT_MS"), "HANDOFF_ATTEMPT_TIMEOUT_MS")? {
            acquisition.attempt_timeout = Duration::from_millis(ms);
        }

        let verification = &mut config.verification;
        if let Some(meters) = parse::<f64>(get("HANDOFF_DELIVERY_RADIUS_M"), "HANDOFF_DELIVERY_RADIUS_M")? {
            verification.radius_meters = positive(meters, "HANDOFF_DELIVERY_RADIUS_M")?;
        }
        if let Some(ms) = parse::<u64>(get("HANDOFF_POLL_INTERVAL_MS"), "HANDOFF_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "HANDOFF_POLL_INTERVAL_MS",
                    reason: "must be greater than zero",
                });
            }
            verification.poll_interval = Duration::from_millis(ms);
        }
        if let Some(meters) = parse::<f64>(get("HANDOFF_POLL_ACCURACY_M"), "HANDOFF_POLL_ACCURACY_M")? {
            verification.max_poll_accuracy_meters = positive(meters, "HANDOFF_POLL_ACCURACY_M")?;
        }

        Ok(config)
    }
}

fn parse<T>(value: Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn positive(meters: f64, var: &'static str) -> Result<f64, ConfigError> {
    if meters.is_finite() && meters > 0.0 {
        Ok(meters)
    } else {
        Err(ConfigError::Invalid {
            var,
            reason: "must be a positive number of meters",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.tracker.acquisition.target_accuracy_meters, 50.0);
        assert_eq!(config.tracker.acquisition.max_retries, 3);
        assert_eq!(config.verification.radius_meters, 50.0);
        assert_eq!(config.verification.poll_interval, Duration::from_secs(5));
        assert_eq!(config.verification.max_poll_accuracy_meters, 100.0);
        assert_eq!(config.api.base_url, "http://10.0.2.2:4000/api/v1");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HANDOFF_API_BASE_URL", "https://api.example.com/api/v1"),
            ("HANDOFF_TARGET_ACCURACY_M", "30"),
            ("HANDOFF_MAX_RETRIES", "5"),
            ("HANDOFF_DELIVERY_RADIUS_M", " 25.5 "),
            ("HANDOFF_POLL_INTERVAL_MS", "2000"),
            ("HANDOFF_ATTEMPT_TIMEOUT_MS", ""),
        ]))
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com/api/v1");
        assert_eq!(config.tracker.acquisition.target_accuracy_meters, 30.0);
        assert_eq!(config.tracker.acquisition.max_retries, 5);
        assert_eq!(config.tracker.acquisition.attempt_timeout, Duration::from_secs(15));
        assert_eq!(config.verification.radius_meters, 25.5);
        assert_eq!(config.verification.poll_interval, Duration::from_millis(2000));
    }

    #[test]
    fn test_bad_values_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("HANDOFF_MAX_RETRIES", "lots")])).unwrap_err();
        assert!(err.to_string().starts_with("HANDOFF_MAX_RETRIES"));

        let err = Config::from_lookup(lookup(&[("HANDOFF_DELIVERY_RADIUS_M", "-3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HANDOFF_DELIVERY_RADIUS_M", .. }));

        let err = Config::from_lookup(lookup(&[("HANDOFF_API_BASE_URL", "nope")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { var: "HANDOFF_API_BASE_URL", .. }));
    }
}
