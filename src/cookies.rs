use std::collections::HashMap;
use std::sync::Mutex;

use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use url::Url;

/// A name/value cookie pair.
///
/// Manually-set request cookies carry no domain or path metadata, so the
/// pipeline only ever deals in name/value pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parses a `set-cookie` header value, ignoring attributes after the
    /// first `;`.
    pub(crate) fn parse_set_cookie(raw: &str) -> Option<Self> {
        let pair = raw.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim()))
    }
}

/// Cookie store capability consulted by the transport boundary.
///
/// The default transport reads `cookies_for` before each exchange and
/// writes `set_cookies` after it; the pipeline itself only uses the store
/// as a gate for request-cookie synchronization.
pub trait CookieStore: Send + Sync {
    /// Cookies applicable to `url`, in insertion order.
    fn cookies_for(&self, url: &Url) -> Vec<Cookie>;
    /// Records cookies set by a response from `url`.
    fn set_cookies(&self, url: &Url, cookies: Vec<Cookie>);
}

/// In-memory [`CookieStore`] keyed by host.
///
/// Matching is host-only; a same-name cookie replaces the previous value.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    entries: Mutex<HashMap<String, Vec<Cookie>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieJar {
    fn cookies_for(&self, url: &Url) -> Vec<Cookie> {
        let host = match url.host_str() {
            Some(host) => host,
            None => return Vec::new(),
        };
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(host).cloned().unwrap_or_default()
    }

    fn set_cookies(&self, url: &Url, cookies: Vec<Cookie>) {
        let host = match url.host_str() {
            Some(host) => host.to_owned(),
            None => return,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stored = entries.entry(host).or_default();
        for cookie in cookies {
            match stored.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => existing.value = cookie.value,
                None => stored.push(cookie),
            }
        }
    }
}

/// Parses a `cookie` request header (`a=1; b=2`) into ordered pairs.
pub(crate) fn parse_cookie_header(raw: &str) -> Vec<Cookie> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie::new(name, value.trim()))
        })
        .collect()
}

/// Reconciles manually-set request cookies against cookies set by the
/// latest response.
///
/// A `set-cookie` from the server always wins over a caller-supplied
/// cookie of the same name. When any manual cookie is superseded the
/// `cookie` header is rebuilt from the survivors only, in their original
/// order; an empty remainder clears the header.
pub(crate) fn sync_request_cookies(headers: &mut HeaderMap, response_cookies: &[Cookie]) {
    let manual = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        Some(raw) => parse_cookie_header(raw),
        None => return,
    };
    if manual.is_empty() {
        return;
    }

    let mut changed = false;
    let remaining: Vec<&Cookie> = manual
        .iter()
        .filter(|cookie| {
            let superseded = response_cookies.iter().any(|rc| rc.name == cookie.name);
            changed |= superseded;
            !superseded
        })
        .collect();

    if !changed {
        return;
    }

    headers.remove(COOKIE);
    if remaining.is_empty() {
        return;
    }
    let rebuilt = remaining
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    if let Ok(value) = HeaderValue::from_str(&rebuilt) {
        headers.insert(COOKIE, value);
    }
}
