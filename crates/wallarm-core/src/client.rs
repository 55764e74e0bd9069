//! HTTP transport with retry logic.
//!
//! [`ApiClient`] sends one logical request to the Wallarm API, retrying
//! transport failures, rate limiting and server errors with exponential
//! backoff, and classifies the final response into an [`Error`] variant.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::types::{
    DuplicateSignal, Payload, ResourceKind, DEFAULT_BASE_URL, DUPLICATE_SENTINEL, TOKEN_HEADER,
};

/// Default maximum number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry in milliseconds
pub const DEFAULT_MIN_RETRY_DELAY_MS: u64 = 1_000;

/// Default cap for any single backoff in milliseconds
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Default per-attempt request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// Default `User-Agent` value.
pub const DEFAULT_USER_AGENT: &str = concat!("wallarm-rs/", env!("CARGO_PKG_VERSION"));

const JSON_CONTENT_TYPE: &str = "application/json";

/// Retry policy with exponential backoff.
///
/// The delay before retry `n` is `min_delay * 2^(n-1)`, capped at `max_delay`.
/// There is no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub min_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: Duration::from_millis(DEFAULT_MIN_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MS),
        }
    }

    /// Create a retry policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay to wait before retry number `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.min_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Check if retries are enabled.
    #[must_use]
    pub const fn has_retries(&self) -> bool {
        self.max_retries > 0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API base URL
    pub base_url: Url,

    /// Headers sent with every request
    pub headers: HeaderMap,

    /// `User-Agent` sent with every request, overriding any in `headers`
    pub user_agent: String,

    /// Per-attempt request timeout
    pub timeout: Duration,

    /// Retry policy
    pub retry_policy: RetryPolicy,

    /// Emit per-request debug logs
    pub logging: bool,

    /// Preconfigured HTTP client used instead of building one
    pub http: Option<Client>,
}

impl ClientOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: default_base_url(),
            headers: HeaderMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            retry_policy: RetryPolicy::new(),
            logging: false,
            http: None,
        }
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Add a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the name or value is not a valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid header name `{name}`: {e}")))?;
        let mut header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("Invalid value for header `{name}`: {e}")))?;
        if header_name.as_str().eq_ignore_ascii_case(TOKEN_HEADER) {
            header_value.set_sensitive(true);
        }
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Set the `User-Agent`.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-attempt request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disable retries.
    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.retry_policy = RetryPolicy::no_retry();
        self
    }

    /// Enable or disable per-request logging.
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("default base URL is valid"))
}

/// Asynchronous transport for the Wallarm Cloud API.
///
/// One instance may serve concurrent calls. The shared header map is only
/// locked while a request is being assembled.
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    headers: Mutex<HeaderMap>,
    user_agent: HeaderValue,
    retry_policy: RetryPolicy,
    logging: bool,
}

impl ApiClient {
    /// Create a new transport from options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built or the
    /// user agent is not a valid header value.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let user_agent = HeaderValue::from_str(&options.user_agent)
            .map_err(|e| Error::Config(format!("Invalid user agent: {e}")))?;

        let http = match options.http {
            Some(http) => http,
            None => ClientBuilder::new()
                .timeout(options.timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?,
        };

        Ok(Self {
            http,
            base_url: options.base_url,
            headers: Mutex::new(options.headers),
            user_agent,
            retry_policy: options.retry_policy,
            logging: options.logging,
        })
    }

    /// The configured base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The configured retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Set or replace a header sent with every subsequent request.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    /// Stop sending a header.
    pub fn remove_header(&self, name: &HeaderName) {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Build an absolute URL for `path`, appending the query of a query payload.
    fn build_url(&self, path: &str, payload: &Payload) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{path}"))?;
        if let Some(query) = payload.query_string() {
            url.set_query(Some(query));
        }
        Ok(url)
    }

    /// Snapshot the shared headers and apply per-request content-type rules.
    fn request_headers(&self, method: &Method, kind: &ResourceKind) -> HeaderMap {
        let mut headers = self
            .headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        headers.insert(USER_AGENT, self.user_agent.clone());

        let json_body = if *method == Method::POST || *method == Method::PUT {
            *kind != ResourceKind::UserDetails
        } else {
            *method == Method::DELETE && *kind == ResourceKind::IpRules
        };

        if *method == Method::GET {
            headers.remove(CONTENT_TYPE);
        } else if json_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        headers
    }

    /// Send one logical request and return the raw body of a 2xx response.
    ///
    /// Transport failures, HTTP 429 and HTTP 5xx are retried up to
    /// `max_retries` times. When retries run out the last error is returned.
    ///
    /// # Errors
    ///
    /// Returns the classified [`Error`] for the final response, or
    /// [`Error::Cancelled`]/[`Error::Timeout`] if `cancel` fires first.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        kind: &ResourceKind,
        payload: &Payload,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let url = self.build_url(path, payload)?;
        let mut attempt = 0;

        loop {
            let error = match self.attempt(&method, &url, kind, payload, cancel, attempt).await {
                Ok(body) => return Ok(body),
                Err(error) if error.is_retryable() => error,
                Err(error) => return Err(error),
            };

            attempt += 1;
            if attempt > self.retry_policy.max_retries {
                return Err(error);
            }

            let delay = self.retry_policy.delay_for_attempt(attempt);
            warn!(
                method = %method,
                path = %path,
                attempt,
                error = %error,
                "Retrying Wallarm API request after {:?}",
                delay
            );
            cancel.sleep(delay).await?;
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        kind: &ResourceKind,
        payload: &Payload,
        cancel: &CancelToken,
        attempt: u32,
    ) -> Result<Vec<u8>> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(self.request_headers(method, kind));

        if let Some(body) = payload.body() {
            request = request.body(body.to_vec());
        }

        if self.logging {
            debug!(
                method = %method,
                url = %url,
                kind = %kind,
                attempt,
                body = %String::from_utf8_lossy(payload.body().unwrap_or_default()),
                "Sending Wallarm API request"
            );
        }

        let response = cancel
            .run(request.send())
            .await?
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        let body = cancel
            .run(response.bytes())
            .await?
            .map_err(|err| Error::Transport(format!("Failed to read response body: {err}")))?;

        if self.logging {
            debug!(
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&body),
                "Received Wallarm API response"
            );
        }

        if status.is_success() {
            return Ok(body.to_vec());
        }

        Err(map_status_to_error(
            status,
            kind,
            String::from_utf8_lossy(&body).into_owned(),
        ))
    }
}

/// Classify a non-2xx response.
fn map_status_to_error(status: StatusCode, kind: &ResourceKind, body: String) -> Error {
    let code = status.as_u16();
    match (status, kind.duplicate_signal()) {
        (StatusCode::BAD_REQUEST, Some(DuplicateSignal::SentinelBody))
            if body == DUPLICATE_SENTINEL =>
        {
            Error::AlreadyExists { status: code, body }
        }
        (StatusCode::CONFLICT, Some(DuplicateSignal::Conflict)) => {
            Error::AlreadyExists { status: code, body }
        }
        (StatusCode::TOO_MANY_REQUESTS, _) => Error::RateLimited { status: code, body },
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => Error::Auth { status: code, body },
        (StatusCode::NOT_FOUND, _) => Error::NotFound { status: code, body },
        (status, _) if status.is_server_error() => Error::ServerError { status: code, body },
        _ => Error::Http { status: code, body },
    }
}
