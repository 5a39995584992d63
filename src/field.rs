//! Canonical header field ids.
//!
//! Well-known field names get a small integer id assigned at parse time so
//! that metadata derivation and repeated lookups (`Header view & field
//! index`, spec.md §4.2) don't re-compare strings. Anything else collapses
//! to `Unknown`, the field's bytes remain reachable through the field-index
//! entry regardless.

/// A canonical id for a header field name.
///
/// Unlike `enums::headers::Header` in the teacher's crate (which owns a
/// `String` for unrecognized names), `FieldId` never owns bytes: the
/// field-index entry it tags already carries the `(name_offset, name_len)`
/// pointing into the header buffer, so `Unknown` is a unit variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Host,
    Connection,
    KeepAlive,
    ContentLength,
    TransferEncoding,
    ContentEncoding,
    Expect,
    Upgrade,
    Trailer,
    Unknown,
}

impl FieldId {
    /// Classify a field name. Case-insensitive per RFC 7230 §3.2.
    pub fn classify(name: &[u8]) -> FieldId {
        use self::FieldId::*;
        if eq_ignore_case(name, b"Host") {
            Host
        } else if eq_ignore_case(name, b"Connection") {
            Connection
        } else if eq_ignore_case(name, b"Keep-Alive") {
            KeepAlive
        } else if eq_ignore_case(name, b"Content-Length") {
            ContentLength
        } else if eq_ignore_case(name, b"Transfer-Encoding") {
            TransferEncoding
        } else if eq_ignore_case(name, b"Content-Encoding") {
            ContentEncoding
        } else if eq_ignore_case(name, b"Expect") {
            Expect
        } else if eq_ignore_case(name, b"Upgrade") {
            Upgrade
        } else if eq_ignore_case(name, b"Trailer") {
            Trailer
        } else {
            Unknown
        }
    }

    /// True for fields whose values are a comma-separated list and should
    /// be concatenated by `combine_field_values` rather than kept as
    /// distinct occurrences.
    pub fn is_list(&self) -> bool {
        matches!(*self,
            FieldId::Connection | FieldId::TransferEncoding |
            FieldId::ContentEncoding | FieldId::Trailer)
    }
}

fn eq_ignore_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter())
        .all(|(&x, &y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

#[cfg(test)]
mod test {
    use super::FieldId;

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(FieldId::classify(b"content-length"), FieldId::ContentLength);
        assert_eq!(FieldId::classify(b"CONTENT-LENGTH"), FieldId::ContentLength);
        assert_eq!(FieldId::classify(b"Content-Length"), FieldId::ContentLength);
    }

    #[test]
    fn unknown_field() {
        assert_eq!(FieldId::classify(b"X-Request-Id"), FieldId::Unknown);
    }
}
