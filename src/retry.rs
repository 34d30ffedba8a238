use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;
use http::{HeaderMap, Method, StatusCode};
use rand::Rng;

use crate::error::{Error, TransportErrorKind};
use crate::Result;

/// Pluggable backoff capability.
///
/// Receives the number of retries performed so far, the retry
/// configuration, the base duration resolved from `retry-after` (or the
/// request timeout), and the transport error that triggered the retry,
/// if any. Returns the duration to sleep before the next attempt.
pub type BackoffFn =
    Arc<dyn Fn(usize, &RetryOptions, Duration, Option<&Error>) -> Duration + Send + Sync>;

/// Configures when a failed or bad-status exchange is retried and how
/// long to wait between attempts.
#[derive(Clone)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt.
    pub limit: usize,
    /// Methods eligible for status-based retries.
    pub methods: Vec<Method>,
    /// Response status codes that trigger a retry.
    pub status_codes: Vec<u16>,
    /// Transport error kinds that trigger a retry.
    pub error_kinds: Vec<TransportErrorKind>,
    /// Whether a response `retry-after` header overrides the base wait.
    pub retry_after: bool,
    /// Backoff function producing the final sleep duration.
    pub calculate_timeout: BackoffFn,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            limit: 2,
            methods: vec![
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
                Method::TRACE,
            ],
            status_codes: vec![408, 413, 429, 500, 502, 503, 504, 521, 522, 524],
            error_kinds: vec![
                TransportErrorKind::Timeout,
                TransportErrorKind::Connect,
                TransportErrorKind::Request,
                TransportErrorKind::Body,
            ],
            retry_after: true,
            calculate_timeout: Arc::new(
                |_retries: usize, _options: &RetryOptions, base: Duration, _error: Option<&Error>| {
                    base
                },
            ),
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("limit", &self.limit)
            .field("methods", &self.methods)
            .field("status_codes", &self.status_codes)
            .field("error_kinds", &self.error_kinds)
            .field("retry_after", &self.retry_after)
            .finish()
    }
}

impl RetryOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = codes.into_iter().collect();
        self
    }

    pub fn error_kinds(mut self, kinds: impl IntoIterator<Item = TransportErrorKind>) -> Self {
        self.error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn retry_after(mut self, retry_after: bool) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn calculate_timeout(mut self, calculate_timeout: BackoffFn) -> Self {
        self.calculate_timeout = calculate_timeout;
        self
    }

    pub(crate) fn retries_status(&self, status: StatusCode) -> bool {
        self.status_codes.contains(&status.as_u16())
    }

    pub(crate) fn retries_method(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub(crate) fn retries_error(&self, kind: TransportErrorKind) -> bool {
        self.error_kinds.contains(&kind)
    }
}

/// Resolves the base wait duration for a status-based retry.
///
/// Resolution order: an honored `retry-after` header parsed as integer
/// seconds, then as an HTTP date relative to now (a past date clamps to
/// zero), then the configured request timeout when the header is absent
/// or not honored. A present-but-unparseable header is a fatal error.
pub(crate) fn retry_after_timeout(
    headers: &HeaderMap,
    options: &RetryOptions,
    fallback: Duration,
) -> Result<Duration> {
    retry_after_timeout_at(headers, options, fallback, SystemTime::now())
}

fn retry_after_timeout_at(
    headers: &HeaderMap,
    options: &RetryOptions,
    fallback: Duration,
    now: SystemTime,
) -> Result<Duration> {
    let raw = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if raw.is_empty() || !options.retry_after {
        return Ok(fallback);
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    match httpdate::parse_http_date(raw) {
        Ok(date) => Ok(date.duration_since(now).unwrap_or(Duration::ZERO)),
        Err(_) => Err(Error::RetryAfter(raw.to_owned())),
    }
}

/// Exponential backoff with jitter, usable as a [`BackoffFn`].
///
/// Doubles a 100ms base per retry performed, capped at the resolved base
/// duration, with up to 100ms of random jitter added.
pub fn exponential_backoff(
    retries: usize,
    _options: &RetryOptions,
    base: Duration,
    _last_error: Option<&Error>,
) -> Duration {
    let exp = retries.min(16) as u32;
    let delay = Duration::from_millis(100u64 << exp).min(base.max(Duration::from_millis(100)));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
    delay + jitter
}
