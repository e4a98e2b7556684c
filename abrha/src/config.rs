//! Provider configuration
//!
//! Every provider argument may instead come from the environment. Explicit
//! configuration wins over the environment.

use tfplug::{AttributePath, Dynamic, DynamicValue};
use thiserror::Error;

use crate::api::{RetryConfig, DEFAULT_ENDPOINT};
use crate::storage::s3::DEFAULT_ENDPOINT_TEMPLATE;

pub const ENV_TOKEN: &str = "ABRHA_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "ABRHA_ACCESS_TOKEN";
pub const ENV_API_URL: &str = "ABRHA_API_URL";
pub const ENV_SPACES_ACCESS_KEY_ID: &str = "SPACES_ACCESS_KEY_ID";
pub const ENV_SPACES_SECRET_ACCESS_KEY: &str = "SPACES_SECRET_ACCESS_KEY";
pub const ENV_SPACES_ENDPOINT_URL: &str = "SPACES_ENDPOINT_URL";

pub const DEFAULT_STORAGE_REGIONS: [&str; 5] = ["nyc3", "ams3", "sfo3", "sgp1", "fra1"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("token is required (set it in the provider block or ABRHA_TOKEN / ABRHA_ACCESS_TOKEN)")]
    MissingToken,

    #[error("{attribute} must be {expected}, got {value}")]
    InvalidValue {
        attribute: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl ConfigError {
    pub fn attribute(&self) -> AttributePath {
        match self {
            ConfigError::MissingToken => AttributePath::new("token"),
            ConfigError::InvalidValue { attribute, .. } => AttributePath::new(attribute),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub token: String,
    pub api_endpoint: String,
    pub spaces_endpoint: String,
    pub spaces_access_id: Option<String>,
    pub spaces_secret_key: Option<String>,
    pub storage_regions: Vec<String>,
    pub retry: RetryConfig,
}

impl ProviderConfig {
    pub fn from_config(config: &DynamicValue) -> Result<Self, ConfigError> {
        Self::from_config_with_env(config, |name| std::env::var(name).ok())
    }

    /// `env` looks up an environment variable; empty values count as unset
    pub fn from_config_with_env(
        config: &DynamicValue,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |name: &str| env(name).filter(|v| !v.is_empty());
        let string = |attr: &str| {
            config
                .opt_string(&AttributePath::new(attr))
                .filter(|v| !v.is_empty())
        };

        let token = string("token")
            .or_else(|| env(ENV_TOKEN))
            .or_else(|| env(ENV_ACCESS_TOKEN))
            .ok_or(ConfigError::MissingToken)?;

        let api_endpoint = string("api_endpoint")
            .or_else(|| env(ENV_API_URL))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        url::Url::parse(&api_endpoint).map_err(|_| ConfigError::InvalidValue {
            attribute: "api_endpoint",
            expected: "an absolute URL",
            value: api_endpoint.clone(),
        })?;

        let spaces_endpoint = string("spaces_endpoint")
            .or_else(|| env(ENV_SPACES_ENDPOINT_URL))
            .unwrap_or_else(|| DEFAULT_ENDPOINT_TEMPLATE.to_string());

        let storage_regions = config
            .opt_string_list(&AttributePath::new("storage_regions"))
            .filter(|regions| !regions.is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_REGIONS.iter().map(|r| r.to_string()).collect());

        let defaults = RetryConfig::default();
        let whole = |attr: &'static str, min: u64, expected: &'static str| {
            match config.get(&AttributePath::new(attr)).and_then(Dynamic::as_f64) {
                None => Ok(None),
                Some(n) if n.fract() == 0.0 && n >= min as f64 => Ok(Some(n as u64)),
                Some(n) => Err(ConfigError::InvalidValue {
                    attribute: attr,
                    expected,
                    value: n.to_string(),
                }),
            }
        };
        let non_negative = |attr| whole(attr, 0, "a whole number, zero or greater");
        // waits are configured in seconds
        let retry = RetryConfig {
            max_retries: non_negative("http_retry_max")?
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.max_retries),
            initial_backoff_ms: non_negative("http_retry_wait_min")?
                .map(|s| s.saturating_mul(1000))
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: non_negative("http_retry_wait_max")?
                .map(|s| s.saturating_mul(1000))
                .unwrap_or(defaults.max_backoff_ms),
            timeout_seconds: whole("request_timeout", 1, "a whole number of seconds, 1 or greater")?
                .unwrap_or(defaults.timeout_seconds),
        };
        if retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err(ConfigError::InvalidValue {
                attribute: "http_retry_wait_max",
                expected: "at least http_retry_wait_min",
                value: (retry.max_backoff_ms / 1000).to_string(),
            });
        }

        Ok(Self {
            token,
            api_endpoint,
            spaces_endpoint,
            spaces_access_id: string("spaces_access_id").or_else(|| env(ENV_SPACES_ACCESS_KEY_ID)),
            spaces_secret_key: string("spaces_secret_key")
                .or_else(|| env(ENV_SPACES_SECRET_ACCESS_KEY)),
            storage_regions,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tfplug::Dynamic;

    fn config(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn token_falls_back_to_environment() {
        let parsed = ProviderConfig::from_config_with_env(
            &config(&[]),
            env_of(&[(ENV_ACCESS_TOKEN, "from-env")]),
        )
        .unwrap();
        assert_eq!(parsed.token, "from-env");
        assert_eq!(parsed.api_endpoint, DEFAULT_ENDPOINT);
        assert_eq!(parsed.retry, RetryConfig::default());
        assert_eq!(parsed.storage_regions.len(), DEFAULT_STORAGE_REGIONS.len());
    }

    #[test]
    fn explicit_configuration_wins() {
        let parsed = ProviderConfig::from_config_with_env(
            &config(&[
                ("token", Dynamic::from("from-config")),
                ("api_endpoint", Dynamic::from("http://localhost:8080")),
                ("spaces_access_id", Dynamic::from("AKID")),
                ("storage_regions", Dynamic::string_list(["fra1"])),
                ("http_retry_max", Dynamic::from(5i64)),
                ("http_retry_wait_min", Dynamic::from(1i64)),
                ("http_retry_wait_max", Dynamic::from(30i64)),
            ]),
            env_of(&[
                (ENV_TOKEN, "from-env"),
                (ENV_API_URL, "http://ignored"),
                (ENV_SPACES_SECRET_ACCESS_KEY, "secret"),
            ]),
        )
        .unwrap();

        assert_eq!(parsed.token, "from-config");
        assert_eq!(parsed.api_endpoint, "http://localhost:8080");
        assert_eq!(parsed.spaces_access_id.as_deref(), Some("AKID"));
        assert_eq!(parsed.spaces_secret_key.as_deref(), Some("secret"));
        assert_eq!(parsed.storage_regions, vec!["fra1".to_string()]);
        assert_eq!(parsed.retry.max_retries, 5);
        assert_eq!(parsed.retry.initial_backoff_ms, 1000);
        assert_eq!(parsed.retry.max_backoff_ms, 30_000);
    }

    #[test]
    fn missing_token_is_reported_on_token() {
        let err = ProviderConfig::from_config_with_env(&config(&[]), env_of(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingToken);
        assert_eq!(err.attribute().to_string(), "token");
    }

    #[test]
    fn rejects_bad_values() {
        let err = ProviderConfig::from_config_with_env(
            &config(&[
                ("token", Dynamic::from("t")),
                ("api_endpoint", Dynamic::from("not a url")),
            ]),
            env_of(&[]),
        )
        .unwrap_err();
        assert_eq!(err.attribute().to_string(), "api_endpoint");

        let err = ProviderConfig::from_config_with_env(
            &config(&[
                ("token", Dynamic::from("t")),
                ("http_retry_wait_min", Dynamic::from(10i64)),
                ("http_retry_wait_max", Dynamic::from(2i64)),
            ]),
            env_of(&[]),
        )
        .unwrap_err();
        assert_eq!(err.attribute().to_string(), "http_retry_wait_max");
    }

    #[test]
    fn request_timeout_must_be_at_least_one_second() {
        let with_timeout = |timeout: Dynamic| {
            ProviderConfig::from_config_with_env(
                &config(&[("token", Dynamic::from("t")), ("request_timeout", timeout)]),
                env_of(&[]),
            )
        };

        let err = with_timeout(Dynamic::from(0i64)).unwrap_err();
        assert_eq!(err.attribute().to_string(), "request_timeout");
        assert!(with_timeout(Dynamic::from(2.5)).is_err());
        assert_eq!(
            with_timeout(Dynamic::from(1i64)).unwrap().retry.timeout_seconds,
            1
        );
    }

    #[test]
    fn fractional_retry_counts_are_rejected() {
        let err = ProviderConfig::from_config_with_env(
            &config(&[("token", Dynamic::from("t")), ("http_retry_max", Dynamic::from(1.5))]),
            env_of(&[]),
        )
        .unwrap_err();
        assert_eq!(err.attribute().to_string(), "http_retry_max");
    }
}
