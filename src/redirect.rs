use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::Error;
use crate::Result;

/// Configures redirect-following behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirectOptions {
    /// Maximum number of redirects to follow; zero means unlimited.
    pub limit: usize,
    /// Rewrite every redirected request to GET, not just 303 responses.
    pub rewrite_methods: bool,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            rewrite_methods: false,
        }
    }
}

impl RedirectOptions {
    pub const fn limited(limit: usize) -> Self {
        Self {
            limit,
            rewrite_methods: false,
        }
    }

    pub const fn rewrite_methods(mut self, rewrite_methods: bool) -> Self {
        self.rewrite_methods = rewrite_methods;
        self
    }
}

/// The canonical redirect status codes.
pub(crate) fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Rewritten target for the next hop of a redirected request.
#[derive(Clone, Debug)]
pub(crate) struct NextHop {
    pub method: Method,
    pub url: Url,
    /// Whether the method rewrite dropped the request body.
    pub body_dropped: bool,
}

/// Decides the next hop for a redirect response.
///
/// Checks the redirect limit against the visited list, applies the
/// 303/forced method rewrite, resolves the `location` header against the
/// current URL, and strips `host`/`cookie`/`authorization` when the hop
/// crosses to a different host or port.
pub(crate) fn next_hop(
    options: &RedirectOptions,
    method: &Method,
    current_url: &Url,
    status: StatusCode,
    location: &str,
    headers: &mut HeaderMap,
    visited: &[Url],
) -> Result<NextHop> {
    if options.limit != 0 && visited.len() >= options.limit {
        return Err(Error::MaxRedirectsExceeded {
            hops: visited.len(),
        });
    }

    let mut next_method = method.clone();
    let mut body_dropped = false;
    if options.rewrite_methods
        || (status == StatusCode::SEE_OTHER
            && next_method != Method::GET
            && next_method != Method::HEAD)
    {
        next_method = Method::GET;
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
        body_dropped = true;
    }

    let next_url = current_url.join(location)?;

    // Sensitive headers must never leak to a different origin.
    if next_url.host_str() != current_url.host_str() || next_url.port() != current_url.port() {
        headers.remove(HOST);
        headers.remove(COOKIE);
        headers.remove(AUTHORIZATION);
    }

    Ok(NextHop {
        method: next_method,
        url: next_url,
        body_dropped,
    })
}

/// Extracts a non-empty `location` header value, if present.
pub(crate) fn location_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}
