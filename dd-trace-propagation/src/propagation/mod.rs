//! Wire formats for carrying trace identity across process boundaries.
//!
//! Each format implements [`Propagator`]; the [`chain::ChainedPropagator`]
//! runs several of them in a configured order and reconciles whatever they
//! find. Formats are immutable after construction and safe to share across
//! threads.

use std::fmt;

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::SpanContext;
use crate::error::PropagationError;

pub mod b3;
pub mod baggage;
pub mod chain;
pub mod config;
pub mod datadog;
mod sanitize;
mod tags;
pub mod trace_context;

/// Name of the legacy Datadog multi-header format.
pub const DATADOG: &str = "datadog";
/// Name of the W3C trace context format.
pub const TRACE_CONTEXT: &str = "tracecontext";
/// Name of the Zipkin B3 multi-header format.
pub const B3_MULTI: &str = "b3multi";
/// Name of the Zipkin B3 single-header format.
pub const B3_SINGLE: &str = "b3 single header";
/// Name of the standalone baggage format.
pub const BAGGAGE: &str = "baggage";
/// Pseudo-format disabling a propagation direction.
pub const NONE: &str = "none";

/// A single wire format that can write a span context into a carrier and
/// read one back out.
pub trait Propagator: fmt::Debug + Send + Sync {
    /// Canonical name of the format, as used in configuration and span-link
    /// attributes.
    fn name(&self) -> &'static str;

    /// Write `ctx` into the carrier.
    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError>;

    /// Read a span context from the carrier.
    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError>;
}
