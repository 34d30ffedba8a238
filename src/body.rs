use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;

use crate::error::Error;
use crate::options::Options;
use crate::Result;

/// User-overridable marshal capability for the structured JSON payload.
pub type MarshalFn =
    Arc<dyn Fn(&serde_json::Value) -> std::result::Result<Vec<u8>, serde_json::Error> + Send + Sync>;

/// User-overridable unmarshal capability for JSON response bodies.
pub type UnmarshalFn = Arc<
    dyn Fn(&[u8]) -> std::result::Result<serde_json::Value, serde_json::Error> + Send + Sync,
>;

/// Encodes the active payload representation into the byte body.
///
/// Runs once per dispatch attempt, immediately before transport handoff.
/// Exactly one representation (raw body, form, json) may be set; a form
/// payload encodes as `application/x-www-form-urlencoded` with keys in
/// insertion order, a json payload goes through the marshal capability.
/// The matching `content-type` is set when the caller left it blank.
pub(crate) fn encode_body(options: &mut Options) -> Result<()> {
    let representations = usize::from(options.body.is_some())
        + usize::from(!options.form.is_empty())
        + usize::from(options.json.is_some());
    if representations > 1 {
        return Err(Error::Config(
            "at most one of body, form and json may be set".to_owned(),
        ));
    }

    if !options.form.is_empty() {
        let encoded = options.form.encode();
        options.body = Some(Bytes::from(encoded));
        set_default_content_type(options, "application/x-www-form-urlencoded");
    } else if let Some(json) = &options.json {
        let marshal = options
            .marshal_json
            .clone()
            .unwrap_or_else(|| Arc::new(|value: &serde_json::Value| serde_json::to_vec(value)));
        let bytes = marshal(json).map_err(Error::Marshal)?;
        options.body = Some(Bytes::from(bytes));
        set_default_content_type(options, "application/json");
    }

    Ok(())
}

/// Discards the encoded byte body after an attempt.
///
/// The structured representations (form/json) stay put so a retry can
/// re-encode; [`close_body`] clears everything when the logical request
/// ends or a method rewrite drops the body.
pub(crate) fn teardown_encoded_body(options: &mut Options) {
    if !options.form.is_empty() || options.json.is_some() {
        options.body = None;
    }
}

/// Clears every payload representation.
pub(crate) fn close_body(options: &mut Options) {
    options.body = None;
    options.form.clear();
    options.json = None;
}

fn set_default_content_type(options: &mut Options, value: &'static str) {
    if !options.headers.contains_key(CONTENT_TYPE) {
        options
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(value));
    }
}
