use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::header::SET_COOKIE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::body::UnmarshalFn;
use crate::cookies::Cookie;
use crate::error::{Error, TransportError, TransportErrorKind};
use crate::Result;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BytesStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, BoxError>> + Send>>;

/// A response body, either buffered or streamed from the transport.
///
/// Dropping a `Body` releases the underlying connection; the pipeline
/// drops it on every retry/redirect path, and hands it to the caller
/// still open on the terminal success path.
pub struct Body {
    inner: BodyInner,
}

enum BodyInner {
    Empty,
    Full(Bytes),
    Stream(BytesStream),
}

impl Body {
    pub fn empty() -> Self {
        Self {
            inner: BodyInner::Empty,
        }
    }

    pub fn full(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: BodyInner::Full(bytes.into()),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, BoxError>> + Send + 'static,
    {
        Self {
            inner: BodyInner::Stream(Box::pin(stream)),
        }
    }

    /// Reads the body to completion.
    pub async fn collect(self) -> Result<Bytes> {
        match self.inner {
            BodyInner::Empty => Ok(Bytes::new()),
            BodyInner::Full(bytes) => Ok(bytes),
            BodyInner::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk
                        .map_err(|source| TransportError::new(TransportErrorKind::Body, source))?;
                    buffer.extend_from_slice(&chunk);
                }
                Ok(buffer.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            BodyInner::Empty => f.write_str("Body(empty)"),
            BodyInner::Full(bytes) => write!(f, "Body({} bytes)", bytes.len()),
            BodyInner::Stream(_) => f.write_str("Body(stream)"),
        }
    }
}

/// A response produced by a [`Transport`](crate::Transport) exchange.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Body,
    unmarshal_json: Option<UnmarshalFn>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: Body) -> Self {
        Self {
            status,
            headers,
            url,
            body,
            unmarshal_json: None,
        }
    }

    /// Installs an unmarshal override consulted by [`Response::json`].
    pub(crate) fn with_unmarshal_json(mut self, unmarshal_json: Option<UnmarshalFn>) -> Self {
        self.unmarshal_json = unmarshal_json;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL this response was served from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Name/value pairs from every `set-cookie` header, in order.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect()
    }

    /// Consumes the response and reads the full body.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.collect().await
    }

    /// Consumes the response and reads the body as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::Decode(format!("response body is not valid utf-8: {err}")))
    }

    /// Consumes the response and deserializes the body as JSON, going
    /// through the configured unmarshal override if one is set.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let unmarshal = self.unmarshal_json.clone();
        let bytes = self.bytes().await?;
        match unmarshal {
            Some(unmarshal) => {
                let value = unmarshal(&bytes)
                    .map_err(|err| Error::Decode(format!("invalid response JSON: {err}")))?;
                serde_json::from_value(value)
                    .map_err(|err| Error::Decode(format!("invalid response JSON: {err}")))
            }
            None => serde_json::from_slice(&bytes)
                .map_err(|err| Error::Decode(format!("invalid response JSON: {err}"))),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}
