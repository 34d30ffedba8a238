use std::fmt;

use crate::response::Response;

/// Classification of a failed transport exchange.
///
/// Retry policies match on the kind rather than on error text, so a
/// custom [`Transport`](crate::Transport) only has to pick the closest
/// category when wrapping its own failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The exchange exceeded the configured timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The request could not be built or sent.
    Request,
    /// The request or response body failed mid-transfer.
    Body,
    /// Anything the transport could not classify.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failure reported by the transport, carrying its classification.
#[derive(Debug, thiserror::Error)]
#[error("transport error ({kind}): {source}")]
pub struct TransportError {
    /// Category used by the retry policy's allow-list.
    pub kind: TransportErrorKind,
    /// Underlying error from the transport implementation.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    pub fn new(
        kind: TransportErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid option set or merge result. Never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// Target or `location` URL failed to parse or resolve.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// Network or request execution error from the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The retry limit was reached on a retryable status; carries the
    /// last received response.
    #[error("maximum retries exceeded after {retries} retries (last status {})", .response.status())]
    MaxRetriesExceeded {
        retries: usize,
        response: Box<Response>,
    },
    /// The redirect limit was reached; carries the number of hops taken.
    #[error("maximum redirects exceeded after {hops} hops")]
    MaxRedirectsExceeded { hops: usize },
    /// A `retry-after` header value that is neither integer seconds nor
    /// an HTTP date. Fatal: the retry mechanism cannot proceed.
    #[error("unparseable retry-after header value: {0:?}")]
    RetryAfter(String),
    /// JSON payload marshaling failed.
    #[error("marshal error: {0}")]
    Marshal(#[source] serde_json::Error),
    /// Response body decoding error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Returns the transport error classification, if this is a
    /// transport failure.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind),
            _ => None,
        }
    }
}
