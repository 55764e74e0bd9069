//! Configuration structures for Wallarm API clients.
//!
//! [`ApiClientConfig`] is the plain, serializable form loaded from files or the
//! environment. It converts into the runtime [`ClientOptions`] value consumed by
//! [`ApiClient`](crate::client::ApiClient).

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::client::{ClientOptions, RetryPolicy};
use crate::types::{DEFAULT_BASE_URL, TOKEN_HEADER};
use crate::Error;

/// Configuration for a Wallarm API client instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiClientConfig {
    /// API base URL
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token sent in the `X-WallarmAPI-Token` header
    #[serde(default, skip_serializing)]
    pub api_token: Option<SecretString>,

    /// Optional User-Agent override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Extra headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of retries after the first attempt
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, in milliseconds
    #[serde(default = "default_min_retry_delay_ms")]
    pub min_retry_delay_ms: u64,

    /// Upper bound for any backoff, in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Emit per-request debug logs
    #[serde(default)]
    pub logging: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_min_retry_delay_ms() -> u64 {
    1_000
}

const fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl ApiClientConfig {
    /// Create a new client configuration for the given API endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            ..Self::default()
        };

        config.check()?;
        Ok(config)
    }

    /// Set the API token.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the User-Agent header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff bounds in milliseconds.
    #[must_use]
    pub const fn with_retry_delays(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_retry_delay_ms = min_ms;
        self.max_retry_delay_ms = max_ms;
        self
    }

    /// Enable or disable per-request logging.
    #[must_use]
    pub const fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the retry policy described by this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_min_delay(Duration::from_millis(self.min_retry_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_retry_delay_ms))
    }

    /// Parse and validate the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.base_url).map_err(|e| Error::Config(format!("Invalid base URL: {e}")))
    }

    /// Validate field ranges and the relation between the backoff bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violation.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

        if self.min_retry_delay_ms > self.max_retry_delay_ms {
            return Err(Error::Config(format!(
                "min_retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                self.min_retry_delay_ms, self.max_retry_delay_ms
            )));
        }

        Ok(())
    }

    /// Convert into runtime client options.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a header is malformed.
    pub fn into_options(self) -> Result<ClientOptions, Error> {
        self.check()?;

        let mut options = ClientOptions::new()
            .with_base_url(self.parse_base_url()?)
            .with_timeout(self.timeout())
            .with_retry_policy(self.retry_policy())
            .with_logging(self.logging);

        if let Some(user_agent) = self.user_agent {
            options = options.with_user_agent(user_agent);
        }

        for (name, value) in &self.headers {
            options = options.with_header(name, value)?;
        }

        if let Some(token) = &self.api_token {
            options = options.with_header(TOKEN_HEADER, token.expose_secret())?;
        }

        Ok(options)
    }
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            user_agent: None,
            headers: BTreeMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            min_retry_delay_ms: default_min_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_client_config_new() {
        let config = ApiClientConfig::new("https://api.wallarm.com").unwrap();
        assert_eq!(config.base_url, "https://api.wallarm.com");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.api_token.is_none());
        assert!(!config.logging);
    }

    #[test]
    fn test_api_client_config_invalid_url() {
        assert!(ApiClientConfig::new("not-a-url").is_err());
    }

    #[test]
    fn test_api_client_config_default_points_at_cloud() {
        let config = ApiClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_api_client_config_builder() {
        let config = ApiClientConfig::new("https://us1.api.wallarm.com")
            .unwrap()
            .with_api_token("secret")
            .with_user_agent("ci/1.0")
            .with_header("X-Trace", "on")
            .with_timeout(60)
            .with_max_retries(5)
            .with_retry_delays(10, 100)
            .with_logging(true);

        assert_eq!(
            config.api_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("secret".to_string())
        );
        assert_eq!(config.user_agent.as_deref(), Some("ci/1.0"));
        assert_eq!(config.headers.get("X-Trace").map(String::as_str), Some("on"));
        assert_eq!(config.timeout(), Duration::from_secs(60));

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.min_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = ApiClientConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.check().is_err());

        config.request_timeout_secs = 30;
        config.max_retries = 11;
        assert!(config.check().is_err());

        config.max_retries = 3;
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_config_rejects_inverted_delays() {
        let config = ApiClientConfig::default().with_retry_delays(5_000, 100);
        let err = config.check().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_token_is_never_serialized() {
        let config = ApiClientConfig::default().with_api_token("top-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("top-secret"));
        assert!(!json.contains("api_token"));
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: ApiClientConfig = serde_json::from_str(
            r#"{"base_url": "https://audit.api.wallarm.com", "api_token": "abc"}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://audit.api.wallarm.com");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.min_retry_delay_ms, 1_000);
        assert_eq!(
            config.api_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_into_options_carries_token_header() {
        let options = ApiClientConfig::new("https://api.wallarm.com")
            .unwrap()
            .with_api_token("abc")
            .with_header("X-Extra", "1")
            .into_options()
            .unwrap();

        assert_eq!(
            options.headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()),
            Some("abc")
        );
        assert_eq!(
            options.headers.get("X-Extra").and_then(|v| v.to_str().ok()),
            Some("1")
        );
        assert_eq!(options.base_url.as_str(), "https://api.wallarm.com/");
    }
}
