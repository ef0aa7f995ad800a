//! Propagator selection from explicit configuration and the environment.

use std::env;

use crate::dd_warn;
use crate::propagation::b3::{B3MultiPropagator, B3SinglePropagator};
use crate::propagation::baggage::BaggagePropagator;
use crate::propagation::chain::ChainedPropagator;
use crate::propagation::datadog::DatadogPropagator;
use crate::propagation::trace_context::TraceContextPropagator;
use crate::propagation::{Propagator, B3_MULTI, B3_SINGLE, BAGGAGE, DATADOG, NONE, TRACE_CONTEXT};

/// Comma-separated list of formats used when injecting.
const ENV_STYLE_INJECT: &str = "DD_TRACE_PROPAGATION_STYLE_INJECT";

/// Comma-separated list of formats used when extracting.
const ENV_STYLE_EXTRACT: &str = "DD_TRACE_PROPAGATION_STYLE_EXTRACT";

/// Comma-separated list of formats used for both directions when the
/// per-direction variables are unset.
const ENV_STYLE: &str = "DD_TRACE_PROPAGATION_STYLE";

/// OpenTelemetry propagator list, consulted last. Note the naming swap:
/// OpenTelemetry's `b3` is the single-header format and `b3multi` the
/// multi-header one.
const ENV_OTEL_PROPAGATORS: &str = "OTEL_PROPAGATORS";

/// When truthy, extraction stops at the first extractor and returns its
/// result, error included.
const ENV_EXTRACT_FIRST: &str = "DD_TRACE_PROPAGATION_EXTRACT_FIRST";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Style {
    Datadog,
    TraceContext,
    B3Multi,
    B3Single,
    Baggage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StyleList {
    /// `none` alone: the direction is disabled outright.
    Disabled,
    /// Parsed styles in configured order; may be empty when every name was
    /// invalid, in which case the default applies.
    Styles(Vec<Style>),
}

/// Which naming convention a list was written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Naming {
    Datadog,
    OpenTelemetry,
}

fn parse_style_list(raw: &str, naming: Naming) -> StyleList {
    let mut styles = Vec::new();
    let mut saw_none = false;
    for name in raw.split(',') {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let style = match name.as_str() {
            DATADOG => Some(Style::Datadog),
            TRACE_CONTEXT => Some(Style::TraceContext),
            "b3" if naming == Naming::OpenTelemetry => Some(Style::B3Single),
            "b3" | B3_MULTI => Some(Style::B3Multi),
            B3_SINGLE => Some(Style::B3Single),
            BAGGAGE => Some(Style::Baggage),
            NONE => {
                saw_none = true;
                None
            }
            unknown => {
                dd_warn!(name: "PropagatorBuilder.UnknownStyle", style = unknown);
                None
            }
        };
        if let Some(style) = style {
            if !styles.contains(&style) {
                styles.push(style);
            }
        }
    }
    if saw_none {
        if styles.is_empty() {
            return StyleList::Disabled;
        }
        dd_warn!(name: "PropagatorBuilder.NoneMixedWithStyles", list = raw);
    }
    StyleList::Styles(styles)
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Resolve one direction's style list from the environment, if any of the
/// selection variables is set.
fn styles_from_env(direction_var: &str) -> Option<StyleList> {
    if let Some(value) = env_value(direction_var) {
        return Some(parse_style_list(&value, Naming::Datadog));
    }
    if let Some(value) = env_value(ENV_STYLE) {
        return Some(parse_style_list(&value, Naming::Datadog));
    }
    if let Some(value) = env_value(ENV_OTEL_PROPAGATORS) {
        return Some(parse_style_list(&value, Naming::OpenTelemetry));
    }
    None
}

fn extract_first_from_env() -> bool {
    match env_value(ENV_EXTRACT_FIRST) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                dd_warn!(name: "PropagatorBuilder.InvalidExtractFirst", value = other);
                false
            }
        },
        None => false,
    }
}

/// Builds a [`ChainedPropagator`] from explicit options and the
/// environment.
///
/// Without overrides, both directions resolve from
/// `DD_TRACE_PROPAGATION_STYLE_INJECT` / `DD_TRACE_PROPAGATION_STYLE_EXTRACT`,
/// then `DD_TRACE_PROPAGATION_STYLE`, then `OTEL_PROPAGATORS`, and finally
/// the default `datadog,tracecontext,baggage` order.
#[derive(Debug, Default)]
pub struct PropagatorBuilder {
    datadog: DatadogPropagator,
    b3: bool,
    injectors: Option<Vec<Box<dyn Propagator>>>,
    extractors: Option<Vec<Box<dyn Propagator>>>,
}

impl PropagatorBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        PropagatorBuilder {
            datadog: DatadogPropagator::new(),
            b3: false,
            injectors: None,
            extractors: None,
        }
    }

    /// Use a customized Datadog format (header-name overrides, tag header
    /// budget) wherever the chain would use the default one.
    pub fn with_datadog_propagator(mut self, datadog: DatadogPropagator) -> Self {
        self.datadog = datadog;
        self
    }

    /// Append the B3 multi-header format to the default style list.
    pub fn with_b3(mut self, b3: bool) -> Self {
        self.b3 = b3;
        self
    }

    /// Bypass style resolution for injection and use exactly these
    /// propagators, in order.
    pub fn with_injectors(mut self, injectors: Vec<Box<dyn Propagator>>) -> Self {
        self.injectors = Some(injectors);
        self
    }

    /// Bypass style resolution for extraction and use exactly these
    /// propagators, in order.
    pub fn with_extractors(mut self, extractors: Vec<Box<dyn Propagator>>) -> Self {
        self.extractors = Some(extractors);
        self
    }

    fn make(&self, style: Style) -> Box<dyn Propagator> {
        match style {
            Style::Datadog => Box::new(self.datadog.clone()),
            Style::TraceContext => Box::new(TraceContextPropagator::new()),
            Style::B3Multi => Box::new(B3MultiPropagator::new()),
            Style::B3Single => Box::new(B3SinglePropagator::new()),
            Style::Baggage => Box::new(BaggagePropagator::new()),
        }
    }

    fn default_styles(&self) -> Vec<Style> {
        let mut styles = vec![Style::Datadog, Style::TraceContext, Style::Baggage];
        if self.b3 {
            styles.push(Style::B3Multi);
        }
        styles
    }

    fn resolve(&self, direction_var: &str) -> Vec<Box<dyn Propagator>> {
        let styles = match styles_from_env(direction_var) {
            Some(StyleList::Disabled) => return Vec::new(),
            Some(StyleList::Styles(styles)) if !styles.is_empty() => styles,
            // unset, empty, or all-invalid lists fall back to the default
            _ => self.default_styles(),
        };
        styles.into_iter().map(|style| self.make(style)).collect()
    }

    /// Resolve the configuration into an immutable propagator chain.
    pub fn build(mut self) -> ChainedPropagator {
        let injectors = match self.injectors.take() {
            Some(injectors) => injectors,
            None => self.resolve(ENV_STYLE_INJECT),
        };
        let extractors = match self.extractors.take() {
            Some(extractors) => extractors,
            None => self.resolve(ENV_STYLE_EXTRACT),
        };
        ChainedPropagator::new(injectors, extractors, extract_first_from_env())
    }
}

/// Build the default propagator chain from the environment.
pub fn new_propagator() -> ChainedPropagator {
    PropagatorBuilder::new().build()
}
