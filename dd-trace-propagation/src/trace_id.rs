//! 128-bit trace ids and their hex codecs.

use std::fmt;

use thiserror::Error;

/// Error returned when a hex string cannot be parsed into a trace id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid hex trace id")]
pub struct ParseTraceIdError;

/// A 128-bit trace id stored as two unsigned 64-bit halves.
///
/// The lower half is the in-process numeric form used by legacy headers;
/// the upper half is only non-zero for 128-bit ids and travels hex-encoded.
/// An id is empty when both halves are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceId {
    upper: u64,
    lower: u64,
}

impl TraceId {
    /// The empty (invalid) trace id.
    pub const EMPTY: TraceId = TraceId { upper: 0, lower: 0 };

    /// Construct a trace id from both halves.
    pub fn new(upper: u64, lower: u64) -> Self {
        TraceId { upper, lower }
    }

    /// Construct a 64-bit trace id.
    pub fn from_lower(lower: u64) -> Self {
        TraceId { upper: 0, lower }
    }

    /// Parse a hex-encoded trace id of up to 32 digits.
    ///
    /// Longer inputs keep only the rightmost 32 digits; leading zeros are
    /// stripped before numeric parsing, so an all-zero input yields the
    /// empty id rather than an error.
    pub fn from_hex(hex: &str) -> Result<Self, ParseTraceIdError> {
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseTraceIdError);
        }
        let hex = if hex.len() > 32 {
            &hex[hex.len() - 32..]
        } else {
            hex
        };
        let hex = hex.trim_start_matches('0');
        if hex.is_empty() {
            return Ok(TraceId::EMPTY);
        }
        if hex.len() <= 16 {
            let lower = u64::from_str_radix(hex, 16).map_err(|_| ParseTraceIdError)?;
            Ok(TraceId { upper: 0, lower })
        } else {
            let (upper, lower) = hex.split_at(hex.len() - 16);
            Ok(TraceId {
                upper: u64::from_str_radix(upper, 16).map_err(|_| ParseTraceIdError)?,
                lower: u64::from_str_radix(lower, 16).map_err(|_| ParseTraceIdError)?,
            })
        }
    }

    /// Returns `true` if both halves are zero.
    pub fn is_empty(&self) -> bool {
        self.upper == 0 && self.lower == 0
    }

    /// Returns `true` if the id does not fit in 64 bits.
    pub fn has_upper(&self) -> bool {
        self.upper != 0
    }

    /// The upper 64 bits.
    pub fn upper(&self) -> u64 {
        self.upper
    }

    /// The lower 64 bits.
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Replace the lower 64 bits.
    pub fn set_lower(&mut self, lower: u64) {
        self.lower = lower;
    }

    /// Replace the upper 64 bits.
    pub fn set_upper(&mut self, upper: u64) {
        self.upper = upper;
    }

    /// Replace the upper 64 bits from exactly 16 hex digits.
    pub fn set_upper_from_hex(&mut self, hex: &str) -> Result<(), ParseTraceIdError> {
        if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseTraceIdError);
        }
        self.upper = u64::from_str_radix(hex, 16).map_err(|_| ParseTraceIdError)?;
        Ok(())
    }

    /// The full id as 32 lowercase hex digits.
    pub fn hex_encoded(&self) -> String {
        format!("{:016x}{:016x}", self.upper, self.lower)
    }

    /// The upper half as 16 lowercase hex digits.
    pub fn upper_hex(&self) -> String {
        format!("{:016x}", self.upper)
    }

    /// The lower half as 16 lowercase hex digits.
    pub fn lower_hex(&self) -> String {
        format!("{:016x}", self.lower)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.upper, self.lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn from_hex_data() -> Vec<(&'static str, u64, u64, &'static str)> {
        vec![
            ("1", 0, 1, "single digit"),
            ("00000000000000000000000000000001", 0, 1, "full width lower one"),
            ("0000000000000001", 0, 1, "16 digit lower one"),
            ("640cfd8d00000000000000000000002a", 0x640cfd8d00000000, 0x2a, "128 bit id"),
            ("abcdef0123456789", 0, 0xabcdef0123456789, "16 digit id"),
            ("00000000000000010000000000000000", 1, 0, "upper only"),
            ("ffffffffffffffffffffffffffffffff", u64::MAX, u64::MAX, "max id"),
            ("0", 0, 0, "zero"),
            ("00000000000000000000000000000000", 0, 0, "full width zero"),
            ("", 0, 0, "empty input"),
            ("999640cfd8d00000000000000000000002a", 0x640cfd8d00000000, 0x2a, "overlong keeps rightmost 32"),
        ]
    }

    #[test]
    fn from_hex() {
        for (input, upper, lower, reason) in from_hex_data() {
            let id = TraceId::from_hex(input).unwrap();
            assert_eq!(id.upper(), upper, "{reason}");
            assert_eq!(id.lower(), lower, "{reason}");
        }
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        for input in ["qw", "640cfd8d0000000g", "0x12", "12 34", "café"] {
            assert!(TraceId::from_hex(input).is_err(), "{input}");
        }
    }

    #[test]
    fn set_upper_from_hex() {
        let mut id = TraceId::from_lower(42);
        id.set_upper_from_hex("640cfd8d00000000").unwrap();
        assert_eq!(id.upper(), 0x640cfd8d00000000);
        assert_eq!(id.lower(), 42);
        assert!(id.has_upper());

        for bad in ["", "640cfd8d", "640cfd8d0000000000", "640cfd8d0000000g"] {
            assert!(id.set_upper_from_hex(bad).is_err(), "{bad}");
        }
        // a failed update leaves the id untouched
        assert_eq!(id.upper(), 0x640cfd8d00000000);
    }

    #[test]
    fn hex_round_trip() {
        let id = TraceId::new(0x640cfd8d00000000, 0x2a);
        assert_eq!(id.hex_encoded(), "640cfd8d00000000000000000000002a");
        assert_eq!(id.upper_hex(), "640cfd8d00000000");
        assert_eq!(id.lower_hex(), "000000000000002a");
        assert_eq!(TraceId::from_hex(&id.hex_encoded()).unwrap(), id);
    }

    #[test]
    fn emptiness() {
        assert!(TraceId::EMPTY.is_empty());
        assert!(!TraceId::EMPTY.has_upper());
        assert!(!TraceId::from_lower(1).is_empty());

        let mut id = TraceId::EMPTY;
        id.set_upper(1);
        assert!(!id.is_empty());
        assert!(id.has_upper());
        id.set_upper(0);
        id.set_lower(7);
        assert!(!id.is_empty());
        assert!(!id.has_upper());
    }
}
