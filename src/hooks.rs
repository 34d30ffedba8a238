use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::options::Options;
use crate::response::Response;

/// Called with the fully resolved options right before transport
/// handoff; the pipeline makes no further changes to the options.
pub type BeforeRequestHook = Arc<dyn Fn(&mut Options) + Send + Sync>;

/// Called before a retry sleep with the options, the transport error
/// that triggered the retry (if any), and the retry count so far.
pub type BeforeRetryHook = Arc<dyn Fn(&Options, Option<&Error>, usize) + Send + Sync>;

/// Called with the options and the redirect response before the next
/// hop is prepared.
pub type BeforeRedirectHook = Arc<dyn Fn(&Options, &Response) + Send + Sync>;

/// Hook points of the request pipeline.
///
/// Merging option sets concatenates hook lists; hooks run in
/// registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_request: Vec<BeforeRequestHook>,
    pub before_retry: Vec<BeforeRetryHook>,
    pub before_redirect: Vec<BeforeRedirectHook>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.before_request.is_empty()
            && self.before_retry.is_empty()
            && self.before_redirect.is_empty()
    }

    pub(crate) fn merge_from(&mut self, other: &Hooks) {
        self.before_request.extend(other.before_request.iter().cloned());
        self.before_retry.extend(other.before_retry.iter().cloned());
        self.before_redirect
            .extend(other.before_redirect.iter().cloned());
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_request", &self.before_request.len())
            .field("before_retry", &self.before_retry.len())
            .field("before_redirect", &self.before_redirect.len())
            .finish()
    }
}
