use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

use crate::body::{MarshalFn, UnmarshalFn};
use crate::cookies::CookieStore;
use crate::error::Error;
use crate::hooks::Hooks;
use crate::redirect::RedirectOptions;
use crate::retry::RetryOptions;
use crate::transport::Transport;
use crate::Result;

/// Timeout applied when neither the caller nor the defaults set one.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered key/value pairs for query strings and form bodies.
///
/// Insertion order is preserved on encode so serialization stays
/// deterministic. Setting an existing key replaces its values in place;
/// new keys append.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every value of `key` with a single value, keeping the
    /// key's original position; appends when the key is new.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.replace_all(&key.into(), vec![value.into()]);
    }

    /// Appends a pair without touching existing values of the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value of `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Percent-encodes the pairs in insertion order.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }

    fn replace_all(&mut self, key: &str, values: Vec<String>) {
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(position) => {
                // Later duplicates of the key sit past `position`, so the
                // insert index stays valid after the retain.
                self.pairs.retain(|(k, _)| k != key);
                for (offset, value) in values.into_iter().enumerate() {
                    self.pairs.insert(position + offset, (key.to_owned(), value));
                }
            }
            None => {
                for value in values {
                    self.pairs.push((key.to_owned(), value));
                }
            }
        }
    }

    /// Layers `other` on top: same key replaces all values at the key's
    /// first-seen position, new keys append in `other`'s order.
    pub(crate) fn merge_from(&mut self, other: &SearchParams) {
        let mut seen: Vec<&str> = Vec::new();
        for (key, _) in &other.pairs {
            if !seen.iter().any(|s| s == key) {
                seen.push(key);
            }
        }
        for key in seen {
            let values: Vec<String> = other
                .pairs
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect();
            self.replace_all(key, values);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One logical request's layered configuration.
///
/// Scalar fields use `Option` so a sparse override can be layered over a
/// populated base with [`Options::extend`]; collection fields merge
/// instead of replacing. [`Options::defaults`] is the fully populated
/// base every client starts from.
#[derive(Clone, Default)]
pub struct Options {
    /// HTTP verb; the per-call method argument takes precedence.
    pub method: Option<Method>,
    /// Base URL a relative target resolves against, first hop only.
    pub prefix_url: Option<Url>,
    /// Resolved scheme+host+path+query for the current attempt. Derived
    /// by the pipeline, never inherited through `extend`.
    pub full_url: Option<Url>,
    /// Ordered query parameters, re-encoded on every attempt.
    pub search_params: SearchParams,
    /// Request headers; case-insensitive keys, multi-value.
    pub headers: HeaderMap,
    /// Raw byte body. At most one of `body`, `form`, `json` may be set.
    pub body: Option<Bytes>,
    /// Form payload, encoded as `application/x-www-form-urlencoded`.
    pub form: SearchParams,
    /// Structured JSON payload, marshaled via `marshal_json`.
    pub json: Option<serde_json::Value>,
    /// Override for JSON marshaling.
    pub marshal_json: Option<MarshalFn>,
    /// Override for JSON unmarshaling of response bodies.
    pub unmarshal_json: Option<UnmarshalFn>,
    /// Master switch for retries.
    pub retry: Option<bool>,
    pub retry_options: Option<RetryOptions>,
    /// Master switch for redirect-following.
    pub follow_redirect: Option<bool>,
    pub redirect_options: Option<RedirectOptions>,
    /// Per-attempt timeout handed to the transport.
    pub timeout: Option<Duration>,
    /// Transport capability performing the actual exchange.
    pub transport: Option<Arc<dyn Transport>>,
    /// Cookie store capability; enables request-cookie synchronization.
    pub cookie_store: Option<Arc<dyn CookieStore>>,
    pub hooks: Hooks,
}

impl Options {
    /// An empty option set; useful as a sparse override.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fully populated base: GET, retries and redirect-following
    /// enabled with default policies, 10 second timeout.
    pub fn defaults() -> Self {
        Self {
            method: Some(Method::GET),
            retry: Some(true),
            retry_options: Some(RetryOptions::default()),
            follow_redirect: Some(true),
            redirect_options: Some(RedirectOptions::default()),
            timeout: Some(DEFAULT_TIMEOUT),
            ..Self::new()
        }
    }

    /// Layers `other` on top of `self` and returns the merged set.
    ///
    /// Scalars present in `other` win; headers, query parameters, form
    /// fields and hooks merge (same key replaces, new key appends, key
    /// order of the base is preserved). Neither input is mutated.
    pub fn extend(&self, other: &Options) -> Result<Options> {
        let mut merged = self.clone();

        if other.method.is_some() {
            merged.method = other.method.clone();
        }
        if other.prefix_url.is_some() {
            merged.prefix_url = other.prefix_url.clone();
        }
        if other.body.is_some() {
            merged.body = other.body.clone();
        }
        if other.json.is_some() {
            merged.json = other.json.clone();
        }
        if other.marshal_json.is_some() {
            merged.marshal_json = other.marshal_json.clone();
        }
        if other.unmarshal_json.is_some() {
            merged.unmarshal_json = other.unmarshal_json.clone();
        }
        if other.retry.is_some() {
            merged.retry = other.retry;
        }
        if other.retry_options.is_some() {
            merged.retry_options = other.retry_options.clone();
        }
        if other.follow_redirect.is_some() {
            merged.follow_redirect = other.follow_redirect;
        }
        if other.redirect_options.is_some() {
            merged.redirect_options = other.redirect_options;
        }
        if other.timeout.is_some() {
            merged.timeout = other.timeout;
        }
        if other.transport.is_some() {
            merged.transport = other.transport.clone();
        }
        if other.cookie_store.is_some() {
            merged.cookie_store = other.cookie_store.clone();
        }

        merged.search_params.merge_from(&other.search_params);
        merged.form.merge_from(&other.form);
        merged.hooks.merge_from(&other.hooks);

        for key in other.headers.keys() {
            merged.headers.remove(key);
        }
        for (key, value) in other.headers.iter() {
            merged.headers.append(key.clone(), value.clone());
        }

        // Derived per attempt; a stale resolved URL must not leak into
        // the merged set.
        merged.full_url = None;

        Ok(merged)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("method", &self.method)
            .field("prefix_url", &self.prefix_url.as_ref().map(Url::as_str))
            .field("full_url", &self.full_url.as_ref().map(Url::as_str))
            .field("search_params", &self.search_params)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(Bytes::len))
            .field("form", &self.form)
            .field("json", &self.json)
            .field("retry", &self.retry)
            .field("retry_options", &self.retry_options)
            .field("follow_redirect", &self.follow_redirect)
            .field("redirect_options", &self.redirect_options)
            .field("timeout", &self.timeout)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Resolves the caller-supplied target against the configured prefix.
///
/// An absolute target wins outright; a relative one joins onto the
/// prefix. A relative target without a prefix is a configuration error.
pub(crate) fn resolve_target(prefix_url: Option<&Url>, uri: &str) -> Result<Url> {
    match Url::parse(uri) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match prefix_url {
            Some(base) => base.join(uri).map_err(Error::Url),
            None => Err(Error::Config(format!(
                "cannot resolve relative target {uri:?} without a prefix url"
            ))),
        },
        Err(err) => Err(Error::Url(err)),
    }
}
