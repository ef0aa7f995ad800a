//! W3C trace context propagation over `traceparent` and `tracestate`.
//!
//! The `traceparent` header carries the binary-exact trace identity:
//!
//! `traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`
//!
//! The `tracestate` header carries vendor-specific state as a list of
//! key-value members. This propagator owns the `dd=` member, a
//! semicolon-separated list of shortened keys (`s:` sampling priority,
//! `o:` origin, `p:` reparenting hint, `t.<suffix>:` trace-level tags);
//! every other vendor's member is preserved verbatim and re-emitted after
//! it.

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::{
    priority, SamplingMechanism, SpanContext, PROPAGATING_TAG_PREFIX, TAG_DECISION_MAKER,
    TAG_TRACE_ID_UPPER,
};
use crate::dd_warn;
use crate::error::PropagationError;
use crate::propagation::{sanitize, Propagator, TRACE_CONTEXT};
use crate::trace_id::TraceId;

pub(crate) const TRACEPARENT_HEADER: &str = "traceparent";
pub(crate) const TRACESTATE_HEADER: &str = "tracestate";

/// A version 0 traceparent is exactly `00-` + 32 hex + `-` + 16 hex + `-` +
/// 2 hex.
const TRACEPARENT_V0_LEN: usize = 55;
/// Version `ff` is forbidden by the header grammar.
const INVALID_VERSION: u8 = 0xff;
/// A tracestate holds at most this many list members.
const MAX_TRACESTATE_MEMBERS: usize = 32;
/// Budget for the content of the `dd=` member, not counting the `dd=`
/// prefix itself.
const MAX_DD_CONTENT_LEN: usize = 256;

fn hex_u64(value: &str) -> Result<u64, PropagationError> {
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PropagationError::Corrupted);
    }
    u64::from_str_radix(value, 16).map_err(|_| PropagationError::Corrupted)
}

fn hex_u8(value: &str) -> Result<u8, PropagationError> {
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PropagationError::Corrupted);
    }
    u8::from_str_radix(value, 16).map_err(|_| PropagationError::Corrupted)
}

/// Parse a traceparent header into the context, returning the sampled bit.
///
/// An all-zero trace id or span id means the header is absent in spirit,
/// not malformed, and maps to `NotFound` rather than `Corrupted`.
fn parse_traceparent(ctx: &mut SpanContext, header: &str) -> Result<bool, PropagationError> {
    let header = header.trim_matches([' ', '\t', '-']);
    if header.len() < TRACEPARENT_V0_LEN {
        return Err(PropagationError::Corrupted);
    }
    let parts: Vec<&str> = header.splitn(5, '-').collect();
    if parts.len() < 4 {
        return Err(PropagationError::Corrupted);
    }

    if parts[0].len() != 2 {
        return Err(PropagationError::Corrupted);
    }
    let version = hex_u8(&parts[0].to_ascii_lowercase())?;
    if version == INVALID_VERSION {
        return Err(PropagationError::Corrupted);
    }
    if version == 0 && header.len() != TRACEPARENT_V0_LEN {
        return Err(PropagationError::Corrupted);
    }

    let trace_id_hex = parts[1].to_ascii_lowercase();
    if trace_id_hex.len() != 32 {
        return Err(PropagationError::Corrupted);
    }
    let mut trace_id = TraceId::default();
    trace_id.set_upper(hex_u64(&trace_id_hex[..16])?);
    trace_id.set_lower(hex_u64(&trace_id_hex[16..])?);
    if trace_id.is_empty() {
        return Err(PropagationError::NotFound);
    }
    ctx.set_trace_id(trace_id);

    let span_id_hex = parts[2].to_ascii_lowercase();
    if span_id_hex.len() != 16 {
        return Err(PropagationError::Corrupted);
    }
    let span_id = hex_u64(&span_id_hex)?;
    if span_id == 0 {
        return Err(PropagationError::NotFound);
    }
    ctx.set_span_id(span_id);

    if parts[3].len() != 2 {
        return Err(PropagationError::Corrupted);
    }
    let flags = hex_u8(&parts[3].to_ascii_lowercase())?;
    Ok(flags & 0x1 == 0x1)
}

/// Parse a tracestate header into the context and reconcile the `s:`
/// priority against the traceparent sampled bit.
fn parse_tracestate(ctx: &mut SpanContext, header: Option<&str>, sampled: bool) {
    let mut state_priority: Option<i32> = None;
    if let Some(header) = header.filter(|header| !header.is_empty()) {
        // the verbatim header survives on the context so a downstream
        // inject can re-emit the other vendors' members
        ctx.put_propagating_tag(TRACESTATE_HEADER, header);
        for member in header.split(',') {
            let member = member.trim_matches([' ', '\t']);
            let Some(dd) = member.strip_prefix("dd=") else {
                continue;
            };
            for pair in dd.split(';') {
                let Some((key, value)) = pair.split_once(':') else {
                    continue;
                };
                if key == "s" {
                    if let Ok(p) = value.parse::<i32>() {
                        state_priority = Some(p);
                    }
                } else if key == "o" {
                    ctx.set_origin(value.replace('~', "="));
                } else if key == "p" {
                    ctx.set_reparent_id(value);
                } else if let Some(suffix) = key.strip_prefix("t.") {
                    ctx.put_propagating_tag(
                        format!("{PROPAGATING_TAG_PREFIX}{suffix}"),
                        value.replace('~', "="),
                    );
                }
            }
        }
    }

    match state_priority {
        Some(p) if (sampled && p > 0) || (!sampled && p <= 0) => {
            ctx.init_sampling_priority(p, SamplingMechanism::Unknown);
        }
        Some(_) if sampled => {
            // the flag says keep but the upstream decision says drop: keep
            // wins and the decision maker resets to default
            ctx.init_sampling_priority(priority::AUTO_KEEP, SamplingMechanism::Unknown);
            ctx.put_propagating_tag(
                TAG_DECISION_MAKER,
                format!("-{}", SamplingMechanism::Default.value()),
            );
        }
        Some(_) => {
            // the flag says drop but the upstream decision says keep: the
            // decision maker no longer holds
            ctx.init_sampling_priority(priority::AUTO_REJECT, SamplingMechanism::Unknown);
            ctx.unset_propagating_tag(TAG_DECISION_MAKER);
        }
        None => {
            let p = if sampled {
                priority::AUTO_KEEP
            } else {
                priority::AUTO_REJECT
            };
            ctx.init_sampling_priority(p, SamplingMechanism::Unknown);
        }
    }

    // the traceparent upper half is authoritative; a conflicting t.tid is
    // dropped
    if let Some(tid) = ctx.propagating_tag(TAG_TRACE_ID_UPPER) {
        if !ctx.trace_id().has_upper() || tid != ctx.trace_id().upper_hex() {
            ctx.unset_propagating_tag(TAG_TRACE_ID_UPPER);
        }
    }
}

/// Compose a tracestate header: the `dd=` member first, then every
/// non-`dd=` member of `old_state` verbatim, up to the member cap.
pub(crate) fn compose_tracestate(ctx: &SpanContext, priority: i32, old_state: &str) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("dd=s:");
    out.push_str(&priority.to_string());
    if let Some(origin) = ctx.origin().filter(|origin| !origin.is_empty()) {
        out.push_str(";o:");
        out.push_str(&sanitize::sanitize_origin(origin));
    }
    if let Some(reparent_id) = ctx.reparent_id() {
        out.push_str(";p:");
        out.push_str(reparent_id);
    }
    ctx.for_each_propagating_tag(|key, value| {
        let Some(suffix) = key.strip_prefix(PROPAGATING_TAG_PREFIX) else {
            return true;
        };
        if key == TAG_TRACE_ID_UPPER {
            // the upper trace id half travels in traceparent
            return true;
        }
        let key = sanitize::sanitize_key(suffix);
        let value = sanitize::sanitize_value(value);
        // the appended form is ";t." + key + ":" + value
        if out.len() - 3 + 4 + key.len() + value.len() > MAX_DD_CONTENT_LEN {
            dd_warn!(name: "TraceContextPropagator.Inject.TracestateBudgetExceeded", key = key.as_str());
            return false;
        }
        out.push_str(";t.");
        out.push_str(&key);
        out.push(':');
        out.push_str(&value);
        true
    });

    let mut members = 1;
    for member in old_state.split(',') {
        let member = member.trim_matches([' ', '\t']);
        if member.is_empty() || member.starts_with("dd=") {
            continue;
        }
        if members >= MAX_TRACESTATE_MEMBERS {
            break;
        }
        members += 1;
        out.push(',');
        out.push_str(member);
    }
    out
}

/// Propagates span contexts in the W3C trace context format.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Construct a new W3C trace context propagator.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }
}

impl Propagator for TraceContextPropagator {
    fn name(&self) -> &'static str {
        TRACE_CONTEXT
    }

    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.is_valid() {
            return Err(PropagationError::InvalidSpanContext);
        }
        let priority = ctx.sampling_priority().unwrap_or(priority::AUTO_REJECT);
        let flags = if priority >= priority::AUTO_KEEP {
            "01"
        } else {
            "00"
        };
        writer.set(
            TRACEPARENT_HEADER,
            &format!(
                "00-{}-{:016x}-{}",
                ctx.trace_id().hex_encoded(),
                ctx.span_id(),
                flags
            ),
        );

        // recompose the dd= member only when the cached header can be
        // stale; otherwise re-emit the incoming tracestate untouched
        let old_state = ctx.propagating_tag(TRACESTATE_HEADER).unwrap_or_default();
        let state = if ctx.is_updated()
            || !ctx.is_remote()
            || !old_state.starts_with("dd=")
            || !ctx.has_propagating_tags()
        {
            compose_tracestate(ctx, priority, &old_state)
        } else {
            old_state
        };
        writer.set(TRACESTATE_HEADER, &state);
        Ok(())
    }

    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut traceparent: Option<String> = None;
        let mut tracestate: Option<String> = None;
        reader.for_each(&mut |key, value| {
            match key.to_lowercase().as_str() {
                TRACEPARENT_HEADER => {
                    if traceparent.is_some() {
                        return Err(PropagationError::Corrupted);
                    }
                    traceparent = Some(value.to_string());
                }
                TRACESTATE_HEADER => {
                    // repeated headers combine into one list
                    tracestate = Some(match tracestate.take() {
                        Some(existing) => format!("{existing},{value}"),
                        None => value.to_string(),
                    });
                }
                _ => {}
            }
            Ok(())
        })?;
        let traceparent = traceparent.ok_or(PropagationError::NotFound)?;

        let mut ctx = SpanContext::remote();
        let sampled = parse_traceparent(&mut ctx, &traceparent)?;
        parse_tracestate(&mut ctx, tracestate.as_deref(), sampled);
        Ok(ctx)
    }
}
