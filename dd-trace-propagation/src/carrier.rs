//! Carrier interfaces for reading and writing propagated headers.
//!
//! Propagators never see concrete transport types; they walk a
//! [`TextMapReader`] on extract and write through a [`TextMapWriter`] on
//! inject. Key comparisons are case-insensitive on the reading side.

use std::collections::HashMap;

use crate::error::PropagationError;

/// A readable carrier yielding `(key, value)` pairs to a cancelable visitor.
pub trait TextMapReader {
    /// Visit each key/value pair in the carrier, stopping at the first
    /// visitor error and returning it.
    fn for_each(
        &self,
        visitor: &mut dyn FnMut(&str, &str) -> Result<(), PropagationError>,
    ) -> Result<(), PropagationError>;
}

/// A writable carrier accepting header values.
pub trait TextMapWriter {
    /// Set a key and value in the carrier, overwriting any previous value
    /// for the same key.
    fn set(&mut self, key: &str, value: &str);
}

impl<S: std::hash::BuildHasher> TextMapReader for HashMap<String, String, S> {
    fn for_each(
        &self,
        visitor: &mut dyn FnMut(&str, &str) -> Result<(), PropagationError>,
    ) -> Result<(), PropagationError> {
        for (key, value) in self.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }
}

impl<S: std::hash::BuildHasher> TextMapWriter for HashMap<String, String, S> {
    /// Set a key and value in the HashMap, lowercasing the key so lookups
    /// stay case-insensitive.
    fn set(&mut self, key: &str, value: &str) {
        self.insert(key.to_lowercase(), value.to_string());
    }
}

/// A [`TextMapReader`] over [`http::HeaderMap`].
pub struct HeaderReader<'a>(pub &'a http::HeaderMap);

impl TextMapReader for HeaderReader<'_> {
    /// Visit each header. A value that cannot be viewed as a string makes
    /// the carrier unusable for text propagation.
    fn for_each(
        &self,
        visitor: &mut dyn FnMut(&str, &str) -> Result<(), PropagationError>,
    ) -> Result<(), PropagationError> {
        for (name, value) in self.0.iter() {
            let value = value
                .to_str()
                .map_err(|_| PropagationError::InvalidCarrier)?;
            visitor(name.as_str(), value)?;
        }
        Ok(())
    }
}

/// A [`TextMapWriter`] over [`http::HeaderMap`].
pub struct HeaderWriter<'a>(pub &'a mut http::HeaderMap);

impl TextMapWriter for HeaderWriter<'_> {
    /// Set a key and value in the HeaderMap. Does nothing if the key or
    /// value are not valid inputs.
    fn set(&mut self, key: &str, value: &str) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(value) = http::header::HeaderValue::from_str(value) {
                self.0.insert(name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_set_and_walk() {
        let mut carrier = HashMap::new();
        carrier.set("headerName", "value");
        carrier.set("headerName", "value2");

        let mut seen = Vec::new();
        carrier
            .for_each(&mut |k, v| {
                seen.push((k.to_string(), v.to_string()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            seen,
            [("headername".to_string(), "value2".to_string())],
            "case insensitive storage, last write wins"
        );
    }

    #[test]
    fn hash_map_visitor_error_stops_walk() {
        let mut carrier = HashMap::new();
        carrier.set("one", "1");
        carrier.set("two", "2");

        let mut visits = 0;
        let result = carrier.for_each(&mut |_, _| {
            visits += 1;
            Err(PropagationError::Corrupted)
        });
        assert_eq!(result, Err(PropagationError::Corrupted));
        assert_eq!(visits, 1);
    }

    #[test]
    fn http_headers_round_trip() {
        let mut carrier = http::HeaderMap::new();
        HeaderWriter(&mut carrier).set("headerName", "value");

        let mut seen = Vec::new();
        HeaderReader(&carrier)
            .for_each(&mut |k, v| {
                seen.push((k.to_string(), v.to_string()));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, [("headername".to_string(), "value".to_string())]);
    }

    #[test]
    fn http_headers_skip_invalid_inputs() {
        let mut carrier = http::HeaderMap::new();
        HeaderWriter(&mut carrier).set("bad header name", "value");
        HeaderWriter(&mut carrier).set("name", "bad\nvalue");
        assert!(carrier.is_empty());
    }

    #[test]
    fn http_headers_non_ascii_value_is_invalid_carrier() {
        let mut carrier = http::HeaderMap::new();
        carrier.insert(
            http::header::HeaderName::from_static("x-binary"),
            http::header::HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );

        let result = HeaderReader(&carrier).for_each(&mut |_, _| Ok(()));
        assert_eq!(result, Err(PropagationError::InvalidCarrier));
    }
}
