//! W3C-style baggage propagation.
//!
//! Baggage flows orthogonally to trace identity: the propagator reads and
//! writes only the `baggage` header and never produces a trace id or span
//! id of its own.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::carrier::{TextMapReader, TextMapWriter};
use crate::context::SpanContext;
use crate::dd_warn;
use crate::error::PropagationError;
use crate::propagation::{Propagator, BAGGAGE};

pub(crate) const BAGGAGE_HEADER: &str = "baggage";

/// Maximum number of items carried in one baggage header.
const MAX_ITEMS: usize = 64;
/// Maximum encoded size of one baggage header in bytes.
const MAX_BYTES: usize = 8192;

// Characters that survive percent-encoding unescaped, per field. Keys
// exclude every list and pair delimiter; values additionally keep a wider
// punctuation range.
const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'*')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');
const VALUE_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b'<')
    .remove(b'>')
    .remove(b'?')
    .remove(b'@')
    .remove(b'[')
    .remove(b']')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'{')
    .remove(b'|')
    .remove(b'}')
    .remove(b'~');

/// Encode baggage items as a percent-encoded `k=v,k=v` header.
///
/// Items past the count or byte budget are dropped silently and encoding
/// stops.
pub(crate) fn encode_baggage<'a>(items: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (count, (key, value)) in items.enumerate() {
        if count >= MAX_ITEMS {
            dd_warn!(name: "BaggagePropagator.Inject.MaxItemsExceeded", max_items = MAX_ITEMS);
            break;
        }
        let piece = format!(
            "{}={}",
            utf8_percent_encode(key.trim(), KEY_ESCAPES),
            utf8_percent_encode(value.trim(), VALUE_ESCAPES)
        );
        let separator = usize::from(!out.is_empty());
        if out.len() + separator + piece.len() > MAX_BYTES {
            dd_warn!(name: "BaggagePropagator.Inject.MaxBytesExceeded", max_bytes = MAX_BYTES);
            break;
        }
        if separator == 1 {
            out.push(',');
        }
        out.push_str(&piece);
    }
    out
}

/// Decode a baggage header into ordered items.
///
/// Any piece missing its `=`, key, or value poisons the whole header:
/// `None` is returned and no partial baggage survives.
pub(crate) fn decode_baggage(header: &str) -> Option<Vec<(String, String)>> {
    let mut items = Vec::new();
    for piece in header.split(',') {
        let (key, value) = piece.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return None;
        }
        let key = percent_decode_str(key).decode_utf8().ok()?;
        let value = percent_decode_str(value).decode_utf8().ok()?;
        items.push((key.into_owned(), value.into_owned()));
    }
    Some(items)
}

/// Propagates baggage items in the `baggage` header.
#[derive(Clone, Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl Propagator for BaggagePropagator {
    fn name(&self) -> &'static str {
        BAGGAGE
    }

    fn inject(
        &self,
        ctx: &SpanContext,
        writer: &mut dyn TextMapWriter,
    ) -> Result<(), PropagationError> {
        if !ctx.has_baggage() {
            return Ok(());
        }
        let mut items = Vec::new();
        ctx.for_each_baggage_item(|key, value| {
            items.push((key.to_string(), value.to_string()));
            true
        });
        let header = encode_baggage(items.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if !header.is_empty() {
            writer.set(BAGGAGE_HEADER, &header);
        }
        Ok(())
    }

    fn extract(&self, reader: &dyn TextMapReader) -> Result<SpanContext, PropagationError> {
        let mut header = None;
        reader.for_each(&mut |key, value| {
            if key.eq_ignore_ascii_case(BAGGAGE_HEADER) {
                header = Some(value.to_string());
            }
            Ok(())
        })?;
        let header = header.ok_or(PropagationError::NotFound)?;

        let mut ctx = SpanContext::remote();
        ctx.set_baggage_only(true);
        match decode_baggage(&header) {
            Some(items) => {
                for (key, value) in items {
                    ctx.set_baggage_item(key, value);
                }
            }
            None => {
                dd_warn!(name: "BaggagePropagator.Extract.MalformedHeader");
            }
        }
        Ok(ctx)
    }
}
