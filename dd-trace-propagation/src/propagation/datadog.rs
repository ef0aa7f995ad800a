//! Legacy Datadog multi-header format.
//!
//! Trace identity travels as decimal strings over dedicated headers; the
//! upper half of a 128-bit trace id rides inside the trace-tags header as
//! `_dd.p.tid`, and baggage items use a prefixed key namespace.

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::{SamplingMechanism, SpanContext, TAG_TRACE_ID_UPPER};
use crate::dd_warn;
use crate::error::PropagationError;
use crate::propagation::{tags, Propagator, DATADOG};

pub(crate) const DEFAULT_TRACE_HEADER: &str = "x-datadog-trace-id";
pub(crate) const DEFAULT_PARENT_HEADER: &str = "x-datadog-parent-id";
pub(crate) const DEFAULT_PRIORITY_HEADER: &str = "x-datadog-sampling-priority";
pub(crate) const ORIGIN_HEADER: &str = "x-datadog-origin";
pub(crate) const TAGS_HEADER: &str = "x-datadog-tags";
pub(crate) const DEFAULT_BAGGAGE_PREFIX: &str = "ot-baggage-";

/// Origin marking traces started by synthetic monitoring; such traces may
/// arrive without a span id.
pub(crate) const ORIGIN_SYNTHETICS: &str = "synthetics";

/// Propagates span contexts in the legacy Datadog multi-header format.
///
/// The trace id, parent id, sampling priority, and baggage header names can
/// be overridden for deployments that rewrite headers in transit; the
/// origin and trace-tags headers are fixed.
#[derive(Clone, Debug)]
pub struct DatadogPropagator {
    trace_header: String,
    parent_header: String,
    priority_header: String,
    baggage_prefix: String,
    max_tags_header_len: usize,
}

impl Default for DatadogPropagator {
    fn default() -> Self {
        DatadogPropagator {
            trace_header: DEFAULT_TRACE_HEADER.to_string(),
            parent_header: DEFAULT_PARENT_HEADER.to_string(),
            priority_header: DEFAULT_PRIORITY_HEADER.to_string(),
            baggage_prefix: DEFAULT_BAGGAGE_PREFIX.to_string(),
            max_tags_header_len: tags::DEFAULT_INJECT_MAX_SIZE,
        }
    }
}

impl DatadogPropagator {
    /// Construct a propagator with the default header names.
    pub fn new() -> Self {
        DatadogPropagator::default()
    }

    /// Override the trace id header name.
    pub fn with_trace_header(mut self, header: impl Into<String>) -> Self {
        self.trace_header = header.into().to_lowercase();
        self
    }

    /// Override the parent id header name.
    pub fn with_parent_header(mut self, header: impl Into<String>) -> Self {
        self.parent_header = header.into().to_lowercase();
        self
    }

    /// Override the sampling priority header name.
    pub fn with_priority_header(mut self, header: impl Into<String>) -> Self {
        self.priority_header = header.into().to_lowercase();
        self
    }

    /// Override the baggage key prefix.
    pub fn with_baggage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.baggage_prefix = prefix.into().to_lowercase();
        self
    }

    /// Override the maximum encoded size of the trace-tags header.
    pub fn with_max_tags_header_len(mut self, max_len: usize) -> Self {
        self.max_tags_header_len = max_len;
        self
    }
}

impl Propagator for DatadogPropagator {
    fn name(&self) -> &'static str {
        DATADOG
    }

    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.is_valid() {
            return Err(PropagationError::InvalidSpanContext);
        }
        writer.set(&self.trace_header, &ctx.trace_id().lower().to_string());
        writer.set(&self.parent_header, &ctx.span_id().to_string());
        if let Some(priority) = ctx.sampling_priority() {
            writer.set(&self.priority_header, &priority.to_string());
        }
        if let Some(origin) = ctx.origin().filter(|origin| !origin.is_empty()) {
            writer.set(ORIGIN_HEADER, origin);
        }
        ctx.for_each_baggage_item(|key, value| {
            writer.set(&format!("{}{}", self.baggage_prefix, key), value);
            true
        });

        // the upper half of a 128-bit id only travels through the tag
        // header; a tag disagreeing with a 64-bit trace id is stale
        if ctx.trace_id().has_upper() {
            ctx.put_propagating_tag(TAG_TRACE_ID_UPPER, ctx.trace_id().upper_hex());
        } else {
            ctx.unset_propagating_tag(TAG_TRACE_ID_UPPER);
        }
        let mut pairs: Vec<(String, String)> = Vec::new();
        ctx.for_each_propagating_tag(|key, value| {
            pairs.push((key.to_string(), value.to_string()));
            true
        });
        let (header, error) = tags::encode_tags(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            self.max_tags_header_len,
        );
        if let Some(error) = error {
            ctx.set_propagation_error(error);
        }
        if !header.is_empty() {
            writer.set(TAGS_HEADER, &header);
        }
        Ok(())
    }

    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut ctx = SpanContext::remote();
        reader.for_each(&mut |key, value| {
            let key = key.to_lowercase();
            if key == self.trace_header {
                let lower = value.parse::<u64>().map_err(|_| PropagationError::Corrupted)?;
                let mut trace_id = ctx.trace_id();
                trace_id.set_lower(lower);
                ctx.set_trace_id(trace_id);
            } else if key == self.parent_header {
                ctx.set_span_id(value.parse::<u64>().map_err(|_| PropagationError::Corrupted)?);
            } else if key == self.priority_header {
                let priority = value.parse::<i32>().map_err(|_| PropagationError::Corrupted)?;
                ctx.init_sampling_priority(priority, SamplingMechanism::Unknown);
            } else if key == ORIGIN_HEADER {
                ctx.set_origin(value);
            } else if key == TAGS_HEADER {
                tags::apply_incoming(&ctx, value);
            } else if let Some(item) = key.strip_prefix(self.baggage_prefix.as_str()) {
                ctx.set_baggage_item(item.to_string(), value);
            }
            Ok(())
        })?;

        if let Some(tid) = ctx.propagating_tag(TAG_TRACE_ID_UPPER) {
            let mut trace_id = ctx.trace_id();
            if trace_id.set_upper_from_hex(&tid).is_ok() {
                ctx.set_trace_id(trace_id);
            } else {
                dd_warn!(name: "DatadogPropagator.Extract.InvalidUpperTraceId", tid = tid.as_str());
                ctx.unset_propagating_tag(TAG_TRACE_ID_UPPER);
            }
        }

        if (ctx.trace_id().is_empty() || ctx.span_id() == 0)
            && ctx.origin() != Some(ORIGIN_SYNTHETICS)
        {
            return Err(PropagationError::NotFound);
        }
        Ok(ctx)
    }
}
