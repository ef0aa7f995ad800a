//! Span context carried across process boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::trace_id::TraceId;

/// Sampling priority values understood by the wire formats.
pub mod priority {
    /// Reject the trace, decided by a user.
    pub const USER_REJECT: i32 = -1;
    /// Reject the trace, decided automatically.
    pub const AUTO_REJECT: i32 = 0;
    /// Keep the trace, decided automatically.
    pub const AUTO_KEEP: i32 = 1;
    /// Keep the trace, decided by a user.
    pub const USER_KEEP: i32 = 2;
}

/// Propagating tag carrying the upper 64 bits of a 128-bit trace id.
pub(crate) const TAG_TRACE_ID_UPPER: &str = "_dd.p.tid";
/// Propagating tag recording which mechanism made the sampling decision.
pub(crate) const TAG_DECISION_MAKER: &str = "_dd.p.dm";
/// Diagnostic tag flagging propagation encode/decode problems.
pub(crate) const TAG_PROPAGATION_ERROR: &str = "_dd.propagation_error";
/// Prefix shared by all trace-level tags that travel with the trace.
pub(crate) const PROPAGATING_TAG_PREFIX: &str = "_dd.p.";

/// Where a sampling decision came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplingMechanism {
    /// The decision was propagated from an unidentified upstream source.
    #[default]
    Unknown,
    /// The default mechanism, used before any rate is known.
    Default,
    /// An agent-supplied sampling rate.
    AgentRate,
    /// A user-defined sampling rule.
    RuleRate,
    /// An explicit user decision.
    Manual,
}

impl SamplingMechanism {
    /// Numeric form used by the decision-maker tag.
    pub fn value(self) -> i8 {
        match self {
            SamplingMechanism::Unknown => -1,
            SamplingMechanism::Default => 0,
            SamplingMechanism::AgentRate => 1,
            SamplingMechanism::RuleRate => 3,
            SamplingMechanism::Manual => 4,
        }
    }
}

/// A secondary reference from the current trace to a peer trace that was
/// observed during extraction but not adopted as the parent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpanLink {
    /// Lower 64 bits of the linked trace id.
    pub trace_id: u64,
    /// Upper 64 bits of the linked trace id.
    pub trace_id_high: u64,
    /// Span id of the linked span.
    pub span_id: u64,
    /// W3C trace flags of the linked context (0 or 1).
    pub flags: u32,
    /// Verbatim tracestate of the linked context, if any.
    pub tracestate: String,
    /// Link attributes.
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Sampling {
    priority: Option<i32>,
    mechanism: SamplingMechanism,
}

/// The identity of an in-flight trace as seen by one span.
///
/// A context is created either locally for a fresh trace or by an extractor
/// for a remote one. Trace-level state (sampling decision, baggage,
/// propagating tags) is shared by every thread holding a reference to the
/// context, so those fields sit behind a lock; the hot `has_baggage` check
/// is an atomic fast path that avoids taking it.
#[derive(Debug, Default)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: u64,
    origin: Option<String>,
    is_remote: bool,
    baggage_only: bool,
    reparent_id: Option<String>,
    span_links: Vec<SpanLink>,
    sampling: Mutex<Sampling>,
    baggage: Mutex<IndexMap<String, String>>,
    has_baggage: AtomicBool,
    tags: Mutex<IndexMap<String, String>>,
    updated: AtomicBool,
}

impl SpanContext {
    /// Create a local context with the given identity.
    pub fn new(trace_id: TraceId, span_id: u64) -> Self {
        SpanContext {
            trace_id,
            span_id,
            ..SpanContext::default()
        }
    }

    /// Create an empty context marked as coming from a remote parent.
    pub(crate) fn remote() -> Self {
        SpanContext {
            is_remote: true,
            ..SpanContext::default()
        }
    }

    /// The trace id.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Replace the trace id.
    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = trace_id;
    }

    /// The span id (the parent id when injecting).
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// Replace the span id.
    pub fn set_span_id(&mut self, span_id: u64) {
        self.span_id = span_id;
    }

    /// Returns `true` if the context has a non-empty trace id and a non-zero
    /// span id.
    pub fn is_valid(&self) -> bool {
        !self.trace_id.is_empty() && self.span_id != 0
    }

    /// The origin of the trace (e.g. `"rum"` or `"synthetics"`), if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Set the trace origin.
    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = Some(origin.into());
    }

    /// Returns `true` if the context was extracted from a carrier.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if only the baggage format produced data during
    /// extraction; such a context carries no trace identity.
    pub fn is_baggage_only(&self) -> bool {
        self.baggage_only
    }

    pub(crate) fn set_baggage_only(&mut self, baggage_only: bool) {
        self.baggage_only = baggage_only;
    }

    /// The span id hint letting the backend rewire a stubbed parent when
    /// formats disagree, as 16 hex digits.
    pub fn reparent_id(&self) -> Option<&str> {
        self.reparent_id.as_deref()
    }

    pub(crate) fn set_reparent_id(&mut self, reparent_id: impl Into<String>) {
        self.reparent_id = Some(reparent_id.into());
    }

    /// Links to peer traces observed but not adopted during extraction.
    pub fn span_links(&self) -> &[SpanLink] {
        &self.span_links
    }

    pub(crate) fn set_span_links(&mut self, links: Vec<SpanLink>) {
        self.span_links = links;
    }

    /// The sampling priority, if one has been decided.
    pub fn sampling_priority(&self) -> Option<i32> {
        self.sampling
            .lock()
            .map(|sampling| sampling.priority)
            .unwrap_or(None)
    }

    /// The mechanism that produced the current sampling decision.
    pub fn sampling_mechanism(&self) -> SamplingMechanism {
        self.sampling
            .lock()
            .map(|sampling| sampling.mechanism)
            .unwrap_or_default()
    }

    /// Set the sampling priority, recording where the decision came from.
    ///
    /// Changing the priority after extraction marks the context updated so
    /// injectors know any cached wire form is stale.
    pub fn set_sampling_priority(&self, priority: i32, mechanism: SamplingMechanism) {
        if let Ok(mut sampling) = self.sampling.lock() {
            if sampling.priority != Some(priority) {
                self.updated.store(true, Ordering::Relaxed);
            }
            *sampling = Sampling {
                priority: Some(priority),
                mechanism,
            };
        }
    }

    /// Record a sampling priority during extraction, without marking the
    /// context updated.
    pub(crate) fn init_sampling_priority(&self, priority: i32, mechanism: SamplingMechanism) {
        if let Ok(mut sampling) = self.sampling.lock() {
            *sampling = Sampling {
                priority: Some(priority),
                mechanism,
            };
        }
    }

    /// Returns `true` if the sampling decision or propagating tags changed
    /// after extraction.
    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Relaxed)
    }

    /// Set a baggage item, preserving insertion order.
    pub fn set_baggage_item(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut baggage) = self.baggage.lock() {
            baggage.insert(key.into(), value.into());
            self.has_baggage.store(true, Ordering::Relaxed);
        }
    }

    /// Look up a baggage item.
    pub fn baggage_item(&self, key: &str) -> Option<String> {
        if !self.has_baggage() {
            return None;
        }
        self.baggage
            .lock()
            .ok()
            .and_then(|baggage| baggage.get(key).cloned())
    }

    /// Returns `true` if any baggage has been set, without locking.
    pub fn has_baggage(&self) -> bool {
        self.has_baggage.load(Ordering::Relaxed)
    }

    /// Number of baggage items.
    pub fn baggage_len(&self) -> usize {
        if !self.has_baggage() {
            return 0;
        }
        self.baggage.lock().map(|baggage| baggage.len()).unwrap_or(0)
    }

    /// Visit baggage items in insertion order; the visitor returns `false`
    /// to stop early.
    pub fn for_each_baggage_item(&self, mut f: impl FnMut(&str, &str) -> bool) {
        if !self.has_baggage() {
            return;
        }
        if let Ok(baggage) = self.baggage.lock() {
            for (key, value) in baggage.iter() {
                if !f(key, value) {
                    break;
                }
            }
        }
    }

    /// Set a trace-level tag that travels with the trace across processes.
    ///
    /// Marks the context updated; see [`SpanContext::is_updated`].
    pub fn set_propagating_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.updated.store(true, Ordering::Relaxed);
        self.put_propagating_tag(key, value);
    }

    /// Set a propagating tag without marking the context updated (used while
    /// building a context during extraction).
    pub(crate) fn put_propagating_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut tags) = self.tags.lock() {
            tags.insert(key.into(), value.into());
        }
    }

    pub(crate) fn unset_propagating_tag(&self, key: &str) {
        if let Ok(mut tags) = self.tags.lock() {
            tags.shift_remove(key);
        }
    }

    /// Look up a propagating tag.
    pub fn propagating_tag(&self, key: &str) -> Option<String> {
        self.tags.lock().ok().and_then(|tags| tags.get(key).cloned())
    }

    /// Returns `true` if any propagating tags are present.
    pub fn has_propagating_tags(&self) -> bool {
        self.tags.lock().map(|tags| !tags.is_empty()).unwrap_or(false)
    }

    /// Replace all propagating tags with the decoded incoming set.
    pub(crate) fn replace_propagating_tags(&self, incoming: Vec<(String, String)>) {
        if let Ok(mut tags) = self.tags.lock() {
            *tags = incoming.into_iter().collect();
        }
    }

    /// Visit propagating tags in insertion order; the visitor returns
    /// `false` to stop early.
    pub fn for_each_propagating_tag(&self, mut f: impl FnMut(&str, &str) -> bool) {
        if let Ok(tags) = self.tags.lock() {
            for (key, value) in tags.iter() {
                if !f(key, value) {
                    break;
                }
            }
        }
    }

    /// Flag a propagation encode/decode problem on the context.
    pub(crate) fn set_propagation_error(&self, value: &'static str) {
        self.put_propagating_tag(TAG_PROPAGATION_ERROR, value);
    }
}
