//! `httpflow` is a configurable async HTTP request pipeline.
//!
//! Given a method, URL and a layered set of request options, the client
//! executes the request through a pluggable [`Transport`], then applies
//! retry, redirect-following and cookie-synchronization policies until a
//! final [`Response`] or typed [`Error`] is produced:
//!
//! - [`Client::request`] / verb helpers ([`Client::get`], [`Client::post`], ...)
//! - [`Options::extend`] for layering option sets
//! - [`RetryOptions`] / [`RedirectOptions`] for the two decision policies
//!
//! The default transport is backed by `reqwest`; any other transport can
//! be plugged in by implementing the single-method [`Transport`] trait.

mod body;
mod client;
mod cookies;
mod error;
mod hooks;
mod options;
mod redirect;
mod response;
mod retry;
mod transport;

pub use body::{MarshalFn, UnmarshalFn};
pub use client::Client;
pub use cookies::{Cookie, CookieStore, MemoryCookieJar};
pub use error::{Error, TransportError, TransportErrorKind};
pub use hooks::{BeforeRedirectHook, BeforeRequestHook, BeforeRetryHook, Hooks};
pub use options::{Options, SearchParams};
pub use redirect::RedirectOptions;
pub use response::{Body, Response};
pub use retry::{exponential_backoff, BackoffFn, RetryOptions};
pub use transport::{ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, Error>;
