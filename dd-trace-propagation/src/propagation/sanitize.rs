//! Character-class mappers keeping tracestate members inside the W3C
//! grammar.
//!
//! Each mapper classifies one code point at a time as `(replacement,
//! collapse)`; when `collapse` is set, a run of such characters folds into a
//! single underscore. The run state lives on the call stack, so every
//! invocation starts clean.

fn sanitize(input: &str, map: impl Fn(char) -> (char, bool)) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        let (replacement, collapse) = map(c);
        if collapse {
            if in_run {
                continue;
            }
            in_run = true;
        } else {
            in_run = false;
        }
        out.push(replacement);
    }
    out
}

fn key_char(c: char) -> (char, bool) {
    match c {
        ',' | '=' => ('_', false),
        c if !('\x20'..='\x7e').contains(&c) => ('_', true),
        c => (c, false),
    }
}

// `~` is the escape form of `=` on the wire and must come through a second
// sanitizing pass unchanged, so it is a fixed point of both mappers below.
fn value_char(c: char) -> (char, bool) {
    match c {
        '=' => ('~', false),
        ',' | ';' => ('_', false),
        c if !('\x20'..='\x7e').contains(&c) => ('_', true),
        c => (c, false),
    }
}

fn origin_char(c: char) -> (char, bool) {
    match c {
        '=' => ('~', false),
        ',' | ';' => ('_', false),
        // unlike tracestate values, a space is not allowed in an origin
        c if !('\x21'..='\x7e').contains(&c) => ('_', true),
        c => (c, false),
    }
}

/// Sanitize a tracestate list-member key.
pub(crate) fn sanitize_key(key: &str) -> String {
    sanitize(key, key_char)
}

/// Sanitize a tracestate list-member value.
pub(crate) fn sanitize_value(value: &str) -> String {
    sanitize(value, value_char)
}

/// Sanitize a trace origin for embedding in a tracestate member.
pub(crate) fn sanitize_origin(origin: &str) -> String {
    sanitize(origin, origin_char)
}
