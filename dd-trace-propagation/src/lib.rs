//! # Datadog trace context propagation
//!
//! Serializes and deserializes the identity of an in-flight trace (trace
//! id, span id, sampling decision, origin, reparenting hint, vendor
//! tracestate, baggage, and trace-level tags) across process boundaries
//! over a configurable set of wire formats.
//!
//! Supported formats:
//!
//! - the legacy Datadog multi-header format (`x-datadog-*`)
//! - W3C trace context (`traceparent` / `tracestate`)
//! - Zipkin B3, both multi-header (`x-b3-*`) and single-header (`b3`)
//! - standalone W3C baggage (`baggage`)
//!
//! Several formats run at once behind one [`ChainedPropagator`]: injection
//! writes every configured format into the same carrier, and extraction
//! walks the configured formats in order, letting the first valid context
//! win while reconciling what the others found (same-trace W3C results
//! refine the winner, different-trace results become [`SpanLink`]s).
//!
//! # Examples
//!
//! ```
//! use dd_trace_propagation::{PropagatorBuilder, SpanContext, TraceId};
//! use std::collections::HashMap;
//!
//! let propagator = PropagatorBuilder::new().build();
//!
//! // inject the current context into outgoing headers
//! let ctx = SpanContext::new(TraceId::from_lower(1), 2);
//! let mut headers: HashMap<String, String> = HashMap::new();
//! propagator.inject(&ctx, &mut headers).unwrap();
//! assert!(headers.contains_key("traceparent"));
//!
//! // extract it back on the receiving side
//! let remote = propagator.extract(&headers).unwrap();
//! assert_eq!(remote.trace_id(), ctx.trace_id());
//! assert!(remote.is_remote());
//! ```
//!
//! Format selection honors `DD_TRACE_PROPAGATION_STYLE_INJECT`,
//! `DD_TRACE_PROPAGATION_STYLE_EXTRACT`, `DD_TRACE_PROPAGATION_STYLE`, and
//! `OTEL_PROPAGATORS`, falling back to `datadog,tracecontext,baggage`; see
//! [`PropagatorBuilder`] for the details.
//!
//! Propagators are immutable after construction and safe to share across
//! threads. A single inject or extract runs synchronously on the caller's
//! thread; the only mutable state it touches lives on the supplied
//! [`SpanContext`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod carrier;
pub mod context;
pub mod error;
mod internal_logging;
pub mod propagation;
pub mod trace_id;

pub use carrier::{HeaderReader, HeaderWriter, TextMapReader, TextMapWriter};
pub use context::{priority, SamplingMechanism, SpanContext, SpanLink};
pub use error::PropagationError;
pub use propagation::b3::{B3MultiPropagator, B3SinglePropagator};
pub use propagation::baggage::BaggagePropagator;
pub use propagation::chain::ChainedPropagator;
pub use propagation::config::{new_propagator, PropagatorBuilder};
pub use propagation::datadog::DatadogPropagator;
pub use propagation::trace_context::TraceContextPropagator;
pub use propagation::Propagator;
pub use trace_id::TraceId;
