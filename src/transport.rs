use async_trait::async_trait;
use futures_util::TryStreamExt;
use http::header::COOKIE;
use http::{HeaderValue, Method};

use crate::cookies::Cookie;
use crate::error::{Error, TransportError, TransportErrorKind};
use crate::options::Options;
use crate::response::{Body, Response};
use crate::Result;

/// Pluggable network transport performing one HTTP exchange.
///
/// Receives a fully resolved option set (target URL, method, headers,
/// encoded body, timeout) and must not itself retry or follow redirects;
/// both policies belong to the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn do_request(&self, options: &Options) -> Result<Response>;
}

/// Default [`Transport`] backed by `reqwest`.
///
/// Redirect-following is disabled on the inner client so the pipeline
/// keeps full control over redirect policy. When a cookie store is
/// configured, its cookies for the target URL are joined onto the
/// request's single `cookie` header line and `set-cookie` response
/// headers are written back to it.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| Error::Config(format!("failed to build reqwest client: {err}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client. The client must have
    /// redirect-following disabled.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn do_request(&self, options: &Options) -> Result<Response> {
        let url = options
            .full_url
            .clone()
            .ok_or_else(|| Error::Config("transport dispatched without a resolved url".to_owned()))?;
        let method = options.method.clone().unwrap_or(Method::GET);

        let mut headers = options.headers.clone();
        if let Some(store) = &options.cookie_store {
            let cookies = store.cookies_for(&url);
            if !cookies.is_empty() {
                // A request carries at most one cookie header line; stored
                // cookies join the caller's manual ones on it.
                let mut joined = headers
                    .get(COOKIE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
                    .unwrap_or_default();
                for cookie in &cookies {
                    if !joined.is_empty() {
                        joined.push_str("; ");
                    }
                    joined.push_str(&cookie.name);
                    joined.push('=');
                    joined.push_str(&cookie.value);
                }
                if let Ok(value) = HeaderValue::from_str(&joined) {
                    headers.insert(COOKIE, value);
                }
            }
        }

        let mut request = self.client.request(method, url.clone()).headers(headers);

        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        if let Some(store) = &options.cookie_store {
            let cookies: Vec<Cookie> = headers
                .get_all(http::header::SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .filter_map(Cookie::parse_set_cookie)
                .collect();
            if !cookies.is_empty() {
                store.set_cookies(&final_url, cookies);
            }
        }

        let stream = response
            .bytes_stream()
            .map_err(|err| Box::new(err) as Box<dyn std::error::Error + Send + Sync>);
        Ok(Response::new(
            status,
            headers,
            final_url,
            Body::from_stream(stream),
        ))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() {
        TransportErrorKind::Body
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };
    Error::Transport(TransportError::new(kind, err))
}
