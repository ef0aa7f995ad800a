//! Zipkin B3 header formats.
//!
//! Both variants carry hex trace and span ids plus a sampling hint. On
//! inject, any priority at or above auto-keep maps to `1`, everything else
//! to `0`; 64-bit trace ids emit 16 hex digits and 128-bit ids emit 32.

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::{priority, SamplingMechanism, SpanContext};
use crate::error::PropagationError;
use crate::propagation::{Propagator, B3_MULTI, B3_SINGLE};
use crate::trace_id::TraceId;

pub(crate) const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
pub(crate) const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
pub(crate) const B3_SAMPLED_HEADER: &str = "x-b3-sampled";
pub(crate) const B3_SINGLE_HEADER: &str = "b3";

fn trace_id_hex(trace_id: TraceId) -> String {
    if trace_id.has_upper() {
        trace_id.hex_encoded()
    } else {
        trace_id.lower_hex()
    }
}

fn sampled_flag(ctx: &SpanContext) -> &'static str {
    if ctx.sampling_priority().unwrap_or(priority::AUTO_REJECT) >= priority::AUTO_KEEP {
        "1"
    } else {
        "0"
    }
}

fn extract_span_id(value: &str) -> Result<u64, PropagationError> {
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PropagationError::Corrupted);
    }
    u64::from_str_radix(value, 16).map_err(|_| PropagationError::Corrupted)
}

/// Propagates span contexts over the three `x-b3-*` headers.
#[derive(Clone, Debug, Default)]
pub struct B3MultiPropagator {
    _private: (),
}

impl B3MultiPropagator {
    /// Construct a new multi-header B3 propagator.
    pub fn new() -> Self {
        B3MultiPropagator { _private: () }
    }
}

impl Propagator for B3MultiPropagator {
    fn name(&self) -> &'static str {
        B3_MULTI
    }

    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.is_valid() {
            return Err(PropagationError::InvalidSpanContext);
        }
        writer.set(B3_TRACE_ID_HEADER, &trace_id_hex(ctx.trace_id()));
        writer.set(B3_SPAN_ID_HEADER, &format!("{:016x}", ctx.span_id()));
        writer.set(B3_SAMPLED_HEADER, sampled_flag(ctx));
        Ok(())
    }

    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut trace_id = None;
        let mut span_id = None;
        let mut sampled = None;
        reader.for_each(&mut |key, value| {
            match key.to_lowercase().as_str() {
                B3_TRACE_ID_HEADER => trace_id = Some(value.to_string()),
                B3_SPAN_ID_HEADER => span_id = Some(value.to_string()),
                B3_SAMPLED_HEADER => sampled = Some(value.to_string()),
                _ => {}
            }
            Ok(())
        })?;

        let mut ctx = SpanContext::remote();
        if let Some(value) = trace_id {
            ctx.set_trace_id(TraceId::from_hex(&value).map_err(|_| PropagationError::Corrupted)?);
        }
        if let Some(value) = span_id {
            ctx.set_span_id(extract_span_id(&value)?);
        }
        if let Some(value) = sampled {
            let priority = value
                .parse::<i32>()
                .map_err(|_| PropagationError::Corrupted)?;
            ctx.init_sampling_priority(priority, SamplingMechanism::Unknown);
        }
        if !ctx.is_valid() {
            return Err(PropagationError::NotFound);
        }
        Ok(ctx)
    }
}

/// Propagates span contexts in the single `b3` header,
/// `{trace_id}-{span_id}[-{sampling_state}]`.
#[derive(Clone, Debug, Default)]
pub struct B3SinglePropagator {
    _private: (),
}

impl B3SinglePropagator {
    /// Construct a new single-header B3 propagator.
    pub fn new() -> Self {
        B3SinglePropagator { _private: () }
    }
}

impl Propagator for B3SinglePropagator {
    fn name(&self) -> &'static str {
        B3_SINGLE
    }

    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.is_valid() {
            return Err(PropagationError::InvalidSpanContext);
        }
        writer.set(
            B3_SINGLE_HEADER,
            &format!(
                "{}-{:016x}-{}",
                trace_id_hex(ctx.trace_id()),
                ctx.span_id(),
                sampled_flag(ctx)
            ),
        );
        Ok(())
    }

    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut header = None;
        reader.for_each(&mut |key, value| {
            if key.eq_ignore_ascii_case(B3_SINGLE_HEADER) {
                header = Some(value.to_string());
            }
            Ok(())
        })?;
        let header = header.ok_or(PropagationError::NotFound)?;

        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() < 2 {
            return Err(PropagationError::NotFound);
        }
        let mut ctx = SpanContext::remote();
        ctx.set_trace_id(TraceId::from_hex(parts[0]).map_err(|_| PropagationError::Corrupted)?);
        ctx.set_span_id(extract_span_id(parts[1])?);
        if let Some(flag) = parts.get(2).filter(|flag| !flag.is_empty()) {
            match *flag {
                "d" => ctx.init_sampling_priority(priority::USER_KEEP, SamplingMechanism::Unknown),
                _ => {
                    let priority = flag
                        .parse::<i32>()
                        .map_err(|_| PropagationError::Corrupted)?;
                    ctx.init_sampling_priority(priority, SamplingMechanism::Unknown);
                }
            }
        }
        if !ctx.is_valid() {
            return Err(PropagationError::NotFound);
        }
        Ok(ctx)
    }
}
