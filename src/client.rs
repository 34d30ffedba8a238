use std::fmt;
use std::sync::Arc;

use http::Method;
use tokio::time::sleep;
use url::Url;

use crate::body;
use crate::cookies;
use crate::error::Error;
use crate::options::{resolve_target, Options, DEFAULT_TIMEOUT};
use crate::redirect;
use crate::response::Response;
use crate::retry;
use crate::transport::ReqwestTransport;
use crate::Result;

/// Per-request bookkeeping threaded through the pipeline loop.
///
/// Lives for exactly one logical request; retries and redirects share no
/// counter but both count toward their own limits across the whole
/// request.
#[derive(Debug, Default)]
struct RequestState {
    /// Retries performed so far; monotonically non-decreasing.
    retries: usize,
    /// URLs visited due to redirects, in hop order.
    redirect_urls: Vec<Url>,
}

/// HTTP client executing requests through the option pipeline.
///
/// A client owns one merged [`Options`] set. Each call works on its own
/// copy, so a client is cheap to share and never leaks per-request state
/// across calls.
#[derive(Clone)]
pub struct Client {
    options: Options,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a client by layering `options` over [`Options::defaults`].
    ///
    /// A [`ReqwestTransport`] is installed when no transport capability
    /// is configured.
    pub fn new(options: Options) -> Result<Self> {
        let mut merged = Options::defaults().extend(&options)?;
        if merged.transport.is_none() {
            merged.transport = Some(Arc::new(ReqwestTransport::new()?));
        }
        Ok(Self { options: merged })
    }

    /// Creates a client from defaults alone.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Options::new())
    }

    /// Returns a new client with `options` layered on top of this one's.
    pub fn extend(&self, options: &Options) -> Result<Self> {
        Ok(Self {
            options: self.options.extend(options)?,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn get(&self, uri: &str) -> Result<Response> {
        self.request(Method::GET, uri).await
    }

    pub async fn head(&self, uri: &str) -> Result<Response> {
        self.request(Method::HEAD, uri).await
    }

    pub async fn post(&self, uri: &str) -> Result<Response> {
        self.request(Method::POST, uri).await
    }

    pub async fn put(&self, uri: &str) -> Result<Response> {
        self.request(Method::PUT, uri).await
    }

    pub async fn patch(&self, uri: &str) -> Result<Response> {
        self.request(Method::PATCH, uri).await
    }

    pub async fn delete(&self, uri: &str) -> Result<Response> {
        self.request(Method::DELETE, uri).await
    }

    /// Executes one logical request with the client's options.
    pub async fn request(&self, method: Method, uri: &str) -> Result<Response> {
        self.dispatch(method, uri, None).await
    }

    /// Executes one logical request with per-call option overrides
    /// layered on top of the client's options.
    pub async fn request_with(
        &self,
        method: Method,
        uri: &str,
        overrides: &Options,
    ) -> Result<Response> {
        self.dispatch(method, uri, Some(overrides)).await
    }

    /// The request pipeline: an explicit loop over attempts so retry and
    /// redirect limits bound the iteration count instead of call-stack
    /// depth.
    async fn dispatch(
        &self,
        method: Method,
        uri: &str,
        overrides: Option<&Options>,
    ) -> Result<Response> {
        let mut options = match overrides {
            Some(overrides) => self.options.extend(overrides)?,
            None => self.options.clone(),
        };
        let transport = options
            .transport
            .clone()
            .ok_or_else(|| Error::Config("no transport configured".to_owned()))?;

        // The prefix is a one-shot convenience: it resolves the original
        // target here and never applies to later hops. Retries re-use
        // this resolved URL, not the prefix.
        let origin_url = resolve_target(options.prefix_url.as_ref(), uri)?;
        let original_method = method.clone();

        let mut state = RequestState::default();
        let mut current_method = method;
        let mut current_url = origin_url.clone();

        loop {
            let mut attempt_url = current_url.clone();
            if !options.search_params.is_empty() {
                attempt_url.set_query(Some(&options.search_params.encode()));
            }
            options.method = Some(current_method.clone());
            options.full_url = Some(attempt_url.clone());

            body::encode_body(&mut options)?;

            for hook in options.hooks.before_request.clone() {
                hook(&mut options);
            }

            let result = transport.do_request(&options).await;
            body::teardown_encoded_body(&mut options);

            let retry_enabled = options.retry.unwrap_or(false);
            let retry_options = options.retry_options.clone().unwrap_or_default();
            let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);

            let response = match result {
                Err(error) => {
                    let retryable = error
                        .transport_kind()
                        .is_some_and(|kind| retry_options.retries_error(kind));
                    if retry_enabled && retryable && state.retries < retry_options.limit {
                        let wait = (retry_options.calculate_timeout)(
                            state.retries,
                            &retry_options,
                            timeout,
                            Some(&error),
                        );
                        for hook in &options.hooks.before_retry {
                            hook(&options, Some(&error), state.retries);
                        }
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            "retrying {} {} after {:?} (transport failure, retry {}/{})",
                            original_method,
                            origin_url,
                            wait,
                            state.retries + 1,
                            retry_options.limit,
                        );
                        sleep(wait).await;
                        state.retries += 1;
                        current_method = original_method.clone();
                        current_url = origin_url.clone();
                        continue;
                    }
                    body::close_body(&mut options);
                    return Err(error);
                }
                Ok(response) => response,
            };

            if retry_enabled
                && retry_options.retries_status(response.status())
                && retry_options.retries_method(&current_method)
            {
                if state.retries >= retry_options.limit {
                    body::close_body(&mut options);
                    return Err(Error::MaxRetriesExceeded {
                        retries: state.retries,
                        response: Box::new(response),
                    });
                }
                let base =
                    match retry::retry_after_timeout(response.headers(), &retry_options, timeout) {
                        Ok(base) => base,
                        Err(err) => {
                            body::close_body(&mut options);
                            return Err(err);
                        }
                    };
                let wait =
                    (retry_options.calculate_timeout)(state.retries, &retry_options, base, None);
                for hook in &options.hooks.before_retry {
                    hook(&options, None, state.retries);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "retrying {} {} after {:?} (status {}, retry {}/{})",
                    original_method,
                    origin_url,
                    wait,
                    response.status(),
                    state.retries + 1,
                    retry_options.limit,
                );
                // Release the connection before sleeping.
                drop(response);
                sleep(wait).await;
                state.retries += 1;
                current_method = original_method.clone();
                current_url = origin_url.clone();
                continue;
            }

            let follow_redirect = options.follow_redirect.unwrap_or(false);
            if follow_redirect && redirect::is_redirect_status(response.status()) {
                if let Some(location) = redirect::location_header(response.headers()) {
                    let location = location.to_owned();
                    let redirect_options = options.redirect_options.clone().unwrap_or_default();
                    let hop = redirect::next_hop(
                        &redirect_options,
                        &current_method,
                        &attempt_url,
                        response.status(),
                        &location,
                        &mut options.headers,
                        &state.redirect_urls,
                    )?;
                    if hop.body_dropped {
                        body::close_body(&mut options);
                    }
                    if options.cookie_store.is_some() {
                        cookies::sync_request_cookies(&mut options.headers, &response.cookies());
                    }
                    for hook in &options.hooks.before_redirect {
                        hook(&options, &response);
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "following redirect {} -> {} (hop {})",
                        attempt_url,
                        hop.url,
                        state.redirect_urls.len() + 1,
                    );
                    drop(response);
                    options.prefix_url = None;
                    state.redirect_urls.push(hop.url.clone());
                    current_method = hop.method;
                    current_url = hop.url;
                    continue;
                }
            }

            body::close_body(&mut options);
            return Ok(response.with_unmarshal_json(options.unmarshal_json.clone()));
        }
    }
}
