//! Reversible escape encoding for nested docids.
//!
//! A nested docid is `outerEscaped ! innerEscaped ! …` where `!` delimits
//! components and `\` escapes both itself and the delimiter inside a
//! component.

pub const DELIMITER: char = '!';
const ESCAPE: char = '\\';

/// Escape one raw component so it can sit between delimiters.
pub fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        if c == ESCAPE || c == DELIMITER {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Undo [`escape`] on one component (no delimiters expected inside).
pub fn unescape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// True when the docid names an archive member (contains an unescaped
/// delimiter).
pub fn is_nested(doc_id: &str) -> bool {
    first_delimiter(doc_id).is_some()
}

/// Split off the outermost component: `(unescaped outer, still-escaped
/// remainder)`. One split per call; recursion handles deeper nesting.
pub fn split_nested(doc_id: &str) -> Option<(String, &str)> {
    let at = first_delimiter(doc_id)?;
    Some((unescape(&doc_id[..at]), &doc_id[at + 1..]))
}

/// Strip every virtual component, leaving the raw outermost docid.
pub fn strip_virtual(doc_id: &str) -> String {
    match split_nested(doc_id) {
        Some((outer, _)) => outer,
        None => unescape(doc_id),
    }
}

/// Append one more (raw) component to an already-escaped prefix.
pub fn push_component(prefix: &str, component: &str) -> String {
    format!("{prefix}{DELIMITER}{}", escape(component))
}

fn first_delimiter(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'!' => return Some(i),
            _ => i += 1,
        }
    }
    None
}
