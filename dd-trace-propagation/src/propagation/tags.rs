//! Codec for the trace-level tag header (`k1=v1,k2=v2`).
//!
//! Problems never fail an inject or extract outright; they are flagged on
//! the context through the `_dd.propagation_error` tag and logged.

use crate::context::SpanContext;
use crate::dd_warn;
use crate::propagation::trace_context::{TRACEPARENT_HEADER, TRACESTATE_HEADER};

pub(crate) const ERROR_ENCODING: &str = "encoding_error";
pub(crate) const ERROR_INJECT_MAX_SIZE: &str = "inject_max_size";
pub(crate) const ERROR_EXTRACT_MAX_SIZE: &str = "extract_max_size";
pub(crate) const ERROR_DECODING: &str = "decoding_error";

/// Upper bound on an incoming tag header.
pub(crate) const EXTRACT_MAX_SIZE: usize = 512;
/// Default upper bound on an outgoing tag header.
pub(crate) const DEFAULT_INJECT_MAX_SIZE: usize = 128;

fn is_valid_tag(key: &str, value: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .chain(value.chars())
            .all(|c| ('\x20'..='\x7e').contains(&c) && c != ',' && c != '=')
}

/// Encode propagating tags as `k1=v1,k2=v2`.
///
/// Entries with characters the header cannot carry are dropped and flagged;
/// exceeding `max_len` aborts the whole header. Returns the encoded header
/// and the error-tag value to record, if any.
pub(crate) fn encode_tags<'a>(
    tags: impl Iterator<Item = (&'a str, &'a str)>,
    max_len: usize,
) -> (String, Option<&'static str>) {
    let mut out = String::new();
    let mut error = None;
    for (key, value) in tags {
        if key == TRACEPARENT_HEADER || key == TRACESTATE_HEADER {
            continue;
        }
        if !is_valid_tag(key, value) {
            dd_warn!(name: "TagCodec.Encode.DroppedTag", key = key);
            error = Some(ERROR_ENCODING);
            continue;
        }
        let separator = usize::from(!out.is_empty());
        if out.len() + separator + key.len() + 1 + value.len() > max_len {
            dd_warn!(name: "TagCodec.Encode.MaxSizeExceeded", max_len = max_len);
            return (String::new(), Some(ERROR_INJECT_MAX_SIZE));
        }
        if separator == 1 {
            out.push(',');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    (out, error)
}

/// Decode a `k1=v1,k2=v2` header into ordered pairs.
///
/// Pairs are strict: an empty key, an empty value, or a pair with no `=` at
/// all is malformed. Values may contain `=`; only the first one splits.
pub(crate) fn decode_tags(header: &str) -> Result<Vec<(String, String)>, ()> {
    if header.is_empty() {
        return Ok(Vec::new());
    }
    let mut tags = Vec::new();
    let mut searching_key = true;
    let mut start = 0;
    let mut key = "";
    for (i, c) in header.char_indices() {
        match c {
            '=' if searching_key => {
                if i == start {
                    return Err(());
                }
                key = &header[start..i];
                searching_key = false;
                start = i + 1;
            }
            ',' => {
                if searching_key || i == start {
                    return Err(());
                }
                tags.push((key.to_string(), header[start..i].to_string()));
                searching_key = true;
                start = i + 1;
            }
            _ => {}
        }
    }
    if searching_key || start == header.len() {
        return Err(());
    }
    tags.push((key.to_string(), header[start..].to_string()));
    Ok(tags)
}

/// Apply an incoming tag header to a context being extracted, flagging
/// size and syntax problems instead of failing.
pub(crate) fn apply_incoming(ctx: &SpanContext, header: &str) {
    if header.len() > EXTRACT_MAX_SIZE {
        dd_warn!(name: "TagCodec.Decode.MaxSizeExceeded", len = header.len());
        ctx.set_propagation_error(ERROR_EXTRACT_MAX_SIZE);
        return;
    }
    match decode_tags(header) {
        Ok(tags) => ctx.replace_propagating_tags(tags),
        Err(()) => {
            dd_warn!(name: "TagCodec.Decode.Malformed");
            ctx.set_propagation_error(ERROR_DECODING);
        }
    }
}
