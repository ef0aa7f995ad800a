//! Errors produced by the propagation engine.

use thiserror::Error;

/// Errors returned while injecting a span context into a carrier or
/// extracting one back out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagationError {
    /// The carrier cannot expose its contents as text key/value pairs.
    #[error("invalid carrier")]
    InvalidCarrier,

    /// The span context is missing a trace id or span id and cannot be
    /// injected.
    #[error("invalid span context")]
    InvalidSpanContext,

    /// No propagation format found a span context in the carrier.
    #[error("span context not found")]
    NotFound,

    /// The carrier holds a syntactically invalid header for a format that
    /// fails rather than skips.
    #[error("span context corrupted")]
    Corrupted,
}
