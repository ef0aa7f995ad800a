//! Orchestration of multiple propagation formats.
//!
//! Inject walks the configured injectors in order against one shared
//! carrier. Extract walks the extractors in order, lets the first valid
//! context win, and reconciles what the others found: same-trace W3C
//! results refine the winner, different-trace results become span links,
//! and baggage merges in regardless of which format won.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::{priority, SpanContext, SpanLink};
use crate::dd_debug;
use crate::error::PropagationError;
use crate::propagation::trace_context::{compose_tracestate, TRACESTATE_HEADER};
use crate::propagation::{Propagator, BAGGAGE, TRACE_CONTEXT};

/// Attribute value marking a span link produced because a second format
/// reported a different trace.
const LINK_REASON: &str = "terminated_context";

/// Runs an ordered list of injectors and extractors over one carrier.
///
/// Built by [`config::PropagatorBuilder`](crate::propagation::config::PropagatorBuilder);
/// immutable afterwards and safe to share across threads.
#[derive(Debug)]
pub struct ChainedPropagator {
    injectors: Vec<Box<dyn Propagator>>,
    extractors: Vec<Box<dyn Propagator>>,
    extract_first: bool,
}

impl ChainedPropagator {
    /// Chain the given injectors and extractors in order.
    pub fn new(
        injectors: Vec<Box<dyn Propagator>>,
        extractors: Vec<Box<dyn Propagator>>,
        extract_first: bool,
    ) -> Self {
        ChainedPropagator {
            injectors,
            extractors,
            extract_first,
        }
    }

    /// Write `ctx` through every configured injector into the carrier.
    ///
    /// The first failing injector short-circuits the walk and its error is
    /// returned.
    pub fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.is_valid() {
            return Err(PropagationError::InvalidSpanContext);
        }
        for injector in &self.injectors {
            injector.inject(ctx, writer)?;
        }
        Ok(())
    }

    /// Read a span context out of the carrier, reconciling every
    /// configured extractor's result.
    pub fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut ctx: Option<SpanContext> = None;
        let mut links: Vec<SpanLink> = Vec::new();
        let mut pending_baggage: IndexMap<String, String> = IndexMap::new();

        for extractor in &self.extractors {
            if extractor.name() == BAGGAGE {
                // baggage flows independently of trace identity and never
                // competes for the winning context
                if let Ok(extracted) = extractor.extract(reader) {
                    extracted.for_each_baggage_item(|key, value| {
                        pending_baggage.insert(key.to_string(), value.to_string());
                        true
                    });
                }
                continue;
            }

            let result = extractor.extract(reader);
            match ctx {
                None => {
                    if self.extract_first {
                        return result;
                    }
                    match result {
                        Ok(extracted) => ctx = Some(extracted),
                        Err(PropagationError::NotFound) => continue,
                        Err(err) => return Err(err),
                    }
                }
                Some(ref mut winner) => {
                    let Ok(extracted) = result else { continue };
                    if extracted.trace_id() == winner.trace_id() {
                        if extractor.name() == TRACE_CONTEXT {
                            adopt_trace_context(winner, &extracted);
                        }
                    } else {
                        links.push(span_link(&extracted, extractor.name()));
                    }
                }
            }
        }

        let Some(mut ctx) = ctx else {
            if pending_baggage.is_empty() {
                return Err(PropagationError::NotFound);
            }
            let mut ctx = SpanContext::remote();
            ctx.set_baggage_only(true);
            for (key, value) in pending_baggage {
                ctx.set_baggage_item(key, value);
            }
            log_extracted(&ctx);
            return Ok(ctx);
        };

        for (key, value) in pending_baggage {
            ctx.set_baggage_item(key, value);
        }
        ctx.set_span_links(links);
        log_extracted(&ctx);
        Ok(ctx)
    }
}

/// Refine the winning context with a same-trace W3C result: adopt its
/// tracestate (recomposed around the winner's own sampling decision), and
/// when the span ids disagree, prefer the W3C span id and remember the path
/// through the winner's span in the reparenting hint.
fn adopt_trace_context(ctx: &mut SpanContext, w3c: &SpanContext) {
    let incoming = w3c.propagating_tag(TRACESTATE_HEADER).unwrap_or_default();
    let priority = ctx.sampling_priority().unwrap_or(priority::AUTO_REJECT);
    let state = compose_tracestate(ctx, priority, &incoming);
    ctx.put_propagating_tag(TRACESTATE_HEADER, state);

    if w3c.span_id() != ctx.span_id() {
        match w3c.reparent_id() {
            Some(reparent_id) => ctx.set_reparent_id(reparent_id.to_string()),
            None => ctx.set_reparent_id(format!("{:016x}", ctx.span_id())),
        }
        ctx.set_span_id(w3c.span_id());
    }
}

fn span_link(ctx: &SpanContext, format: &str) -> SpanLink {
    SpanLink {
        trace_id: ctx.trace_id().lower(),
        trace_id_high: ctx.trace_id().upper(),
        span_id: ctx.span_id(),
        flags: u32::from(ctx.sampling_priority().unwrap_or(priority::AUTO_REJECT) > 0),
        tracestate: ctx
            .propagating_tag(TRACESTATE_HEADER)
            .unwrap_or_default(),
        attributes: HashMap::from([
            ("reason".to_string(), LINK_REASON.to_string()),
            ("context_headers".to_string(), format.to_string()),
        ]),
    }
}

/// One debug record per successful extract. Baggage values are never
/// logged, only the count.
fn log_extracted(ctx: &SpanContext) {
    dd_debug!(
        name: "ChainedPropagator.Extract",
        trace_id = ctx.trace_id().hex_encoded().as_str(),
        span_id = ctx.span_id(),
        origin = ctx.origin().unwrap_or_default(),
        has_baggage = ctx.has_baggage(),
        baggage_count = ctx.baggage_len(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::b3::B3MultiPropagator;
    use crate::propagation::baggage::BaggagePropagator;
    use crate::propagation::datadog::DatadogPropagator;
    use crate::propagation::trace_context::TraceContextPropagator;
    use crate::trace_id::TraceId;

    fn carrier(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn chain(extractors: Vec<Box<dyn Propagator>>) -> ChainedPropagator {
        ChainedPropagator::new(vec![], extractors, false)
    }

    #[test]
    fn inject_runs_all_injectors_in_order() {
        let propagator = ChainedPropagator::new(
            vec![
                Box::new(DatadogPropagator::new()),
                Box::new(TraceContextPropagator::new()),
            ],
            vec![],
            false,
        );
        let ctx = SpanContext::new(TraceId::from_lower(4), 1);

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&ctx, &mut carrier).unwrap();

        assert_eq!(carrier.get("x-datadog-trace-id"), Some(&"4".to_string()));
        assert!(carrier.contains_key("traceparent"));
        assert!(carrier.contains_key("tracestate"));
    }

    #[test]
    fn inject_rejects_invalid_context() {
        let propagator = ChainedPropagator::new(
            vec![Box::new(DatadogPropagator::new())],
            vec![],
            false,
        );
        let mut carrier: HashMap<String, String> = HashMap::new();
        for ctx in [
            SpanContext::remote(),
            SpanContext::new(TraceId::EMPTY, 1),
            SpanContext::new(TraceId::from_lower(1), 0),
        ] {
            assert_eq!(
                propagator.inject(&ctx, &mut carrier).unwrap_err(),
                PropagationError::InvalidSpanContext
            );
        }
        assert!(carrier.is_empty());
    }

    #[test]
    fn extract_first_valid_context_wins() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(B3MultiPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            ("x-b3-traceid", "4"),
            ("x-b3-spanid", "9"),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id(), TraceId::from_lower(4));
        assert_eq!(ctx.span_id(), 1, "datadog ran first and keeps the span id");
        assert!(ctx.span_links().is_empty(), "same trace id makes no link");
    }

    #[test]
    fn extract_skips_not_found_and_keeps_walking() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(B3MultiPropagator::new()),
        ]);
        let carrier = carrier(&[("x-b3-traceid", "4"), ("x-b3-spanid", "9")]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id(), TraceId::from_lower(4));
        assert_eq!(ctx.span_id(), 9);
    }

    #[test]
    fn extract_nothing_is_not_found() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        let carrier: HashMap<String, String> = HashMap::new();
        assert_eq!(
            propagator.extract(&carrier).unwrap_err(),
            PropagationError::NotFound
        );
    }

    #[test]
    fn extract_error_aborts_chain() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(B3MultiPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "not-a-number"),
            ("x-b3-traceid", "4"),
            ("x-b3-spanid", "9"),
        ]);
        assert_eq!(
            propagator.extract(&carrier).unwrap_err(),
            PropagationError::Corrupted
        );
    }

    #[test]
    fn extract_error_after_winner_is_ignored() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(B3MultiPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            ("x-b3-traceid", "zzz"),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id(), TraceId::from_lower(4));
    }

    #[test]
    fn extract_w3c_same_trace_adopts_span_id_and_reparent() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            ("x-datadog-origin", "synthetics"),
            (
                "traceparent",
                "00-00000000000000000000000000000004-2222222222222222-01",
            ),
            (
                "tracestate",
                "dd=s:2;o:rum;p:0000000000000001;t.tid:1230000000000000~~,othervendor=t61rcWkgMzE",
            ),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id(), TraceId::from_lower(4));
        assert_eq!(ctx.span_id(), 0x2222222222222222);
        assert_eq!(ctx.origin(), Some("synthetics"), "the winner keeps its origin");
        assert_eq!(ctx.reparent_id(), Some("0000000000000001"));
        let state = ctx.propagating_tag("tracestate").unwrap();
        assert!(
            state.contains("othervendor=t61rcWkgMzE"),
            "vendor state survives: {state}"
        );
        assert!(ctx.span_links().is_empty());
    }

    #[test]
    fn extract_w3c_same_trace_same_span_keeps_span_id() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "2"),
            (
                "traceparent",
                "00-00000000000000000000000000000004-0000000000000002-01",
            ),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.span_id(), 2);
        assert_eq!(ctx.reparent_id(), None);
    }

    #[test]
    fn extract_w3c_reparent_falls_back_to_previous_span_id() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            (
                "traceparent",
                "00-00000000000000000000000000000004-2222222222222222-01",
            ),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.span_id(), 0x2222222222222222);
        assert_eq!(ctx.reparent_id(), Some("0000000000000001"));
    }

    #[test]
    fn extract_divergent_trace_ids_produce_span_links() {
        let propagator = chain(vec![
            Box::new(DatadogPropagator::new()),
            Box::new(TraceContextPropagator::new()),
            Box::new(B3MultiPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("x-datadog-trace-id", "1"),
            ("x-datadog-parent-id", "1"),
            (
                "traceparent",
                "00-00000000000000000000000000000002-2222222222222222-01",
            ),
            ("tracestate", "dd=s:1;o:rum;t.usr.id:baz64~~"),
            ("x-b3-traceid", "3"),
            ("x-b3-spanid", "3"),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.trace_id(), TraceId::from_lower(1));
        assert_eq!(ctx.span_id(), 1);

        let links = ctx.span_links();
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].trace_id, 2);
        assert_eq!(links[0].span_id, 0x2222222222222222);
        assert_eq!(links[0].flags, 1);
        assert_eq!(
            links[0].tracestate,
            "dd=s:1;o:rum;t.usr.id:baz64~~"
        );
        assert_eq!(links[0].attributes["reason"], "terminated_context");
        assert_eq!(links[0].attributes["context_headers"], "tracecontext");

        assert_eq!(links[1].trace_id, 3);
        assert_eq!(links[1].span_id, 3);
        assert_eq!(links[1].flags, 0, "no sampling hint means unsampled");
        assert_eq!(links[1].tracestate, "");
        assert_eq!(links[1].attributes["reason"], "terminated_context");
        assert_eq!(links[1].attributes["context_headers"], "b3multi");
    }

    #[test]
    fn extract_baggage_only_context() {
        let propagator = chain(vec![
            Box::new(BaggagePropagator::new()),
            Box::new(DatadogPropagator::new()),
        ]);
        let carrier = carrier(&[("baggage", "foo=bar,baz=qux")]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert!(ctx.trace_id().is_empty());
        assert_eq!(ctx.span_id(), 0);
        assert!(ctx.is_baggage_only());
        assert_eq!(ctx.baggage_item("foo"), Some("bar".to_string()));
        assert_eq!(ctx.baggage_item("baz"), Some("qux".to_string()));
        assert_eq!(ctx.baggage_len(), 2);
    }

    #[test]
    fn extract_merges_baggage_into_winner() {
        let propagator = chain(vec![
            Box::new(BaggagePropagator::new()),
            Box::new(DatadogPropagator::new()),
        ]);
        let carrier = carrier(&[
            ("baggage", "foo=bar"),
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            ("ot-baggage-legacy", "x"),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert!(ctx.is_valid());
        assert!(!ctx.is_baggage_only());
        assert_eq!(ctx.baggage_item("foo"), Some("bar".to_string()));
        assert_eq!(ctx.baggage_item("legacy"), Some("x".to_string()));
    }

    #[test]
    fn extract_first_returns_first_result_verbatim() {
        let propagator = ChainedPropagator::new(
            vec![],
            vec![
                Box::new(DatadogPropagator::new()),
                Box::new(TraceContextPropagator::new()),
            ],
            true,
        );
        // a corrupted datadog header fails the whole extract even though a
        // valid traceparent sits right next to it
        let carrier = carrier(&[
            ("x-datadog-trace-id", "not-a-number"),
            ("x-datadog-parent-id", "1"),
            (
                "traceparent",
                "00-00000000000000000000000000000004-2222222222222222-01",
            ),
        ]);
        assert_eq!(
            propagator.extract(&carrier).unwrap_err(),
            PropagationError::Corrupted
        );
    }

    #[test]
    fn extract_first_still_returns_valid_first_context() {
        let propagator = ChainedPropagator::new(
            vec![],
            vec![
                Box::new(DatadogPropagator::new()),
                Box::new(TraceContextPropagator::new()),
            ],
            true,
        );
        let carrier = carrier(&[
            ("x-datadog-trace-id", "4"),
            ("x-datadog-parent-id", "1"),
            (
                "traceparent",
                "00-00000000000000000000000000000004-2222222222222222-01",
            ),
        ]);

        let ctx = propagator.extract(&carrier).unwrap();
        assert_eq!(ctx.span_id(), 1, "the w3c refinement never runs");
        assert_eq!(ctx.reparent_id(), None);
    }

    #[test]
    fn round_trip_through_chain() {
        let propagator = ChainedPropagator::new(
            vec![
                Box::new(DatadogPropagator::new()),
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ],
            vec![
                Box::new(DatadogPropagator::new()),
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ],
            false,
        );

        let ctx = SpanContext::new(TraceId::new(0x640cfd8d00000000, 0x2a), 7);
        ctx.init_sampling_priority(
            priority::USER_KEEP,
            crate::context::SamplingMechanism::Manual,
        );
        ctx.set_baggage_item("foo", "bar");

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&ctx, &mut carrier).unwrap();
        let extracted = propagator.extract(&carrier).unwrap();

        assert_eq!(extracted.trace_id(), ctx.trace_id());
        assert_eq!(extracted.span_id(), ctx.span_id());
        assert_eq!(extracted.sampling_priority(), ctx.sampling_priority());
        assert_eq!(extracted.baggage_item("foo"), Some("bar".to_string()));
    }
}
