//! Small case-insensitive token matchers for header values that carry a
//! single significant keyword, possibly amid a comma-separated list and
//! surrounded by optional whitespace.
//!
//! Ported near-verbatim from the teacher's `src/headers.rs`, which used
//! exactly this style to recognize `close`, `chunked` and `100-continue`
//! without allocating.

/// Does `val`, trimmed of OWS, equal `close` case-insensitively?
pub fn is_close(val: &[u8]) -> bool {
    token_eq(val, b"close")
}

/// Does `val`, trimmed of OWS, equal `chunked` case-insensitively?
pub fn is_chunked(val: &[u8]) -> bool {
    token_eq(val, b"chunked")
}

/// Does `val`, trimmed of OWS, equal `100-continue` case-insensitively?
pub fn is_continue(val: &[u8]) -> bool {
    token_eq(val, b"100-continue")
}

fn is_ows(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | b' ' | b'\t')
}

fn token_eq(val: &[u8], target: &[u8]) -> bool {
    let trimmed = trim_ows(val);
    trimmed.len() == target.len() &&
        trimmed.iter().zip(target.iter())
            .all(|(&a, &b)| a.to_ascii_lowercase() == b)
}

fn trim_ows(val: &[u8]) -> &[u8] {
    let start = val.iter().position(|&b| !is_ows(b)).unwrap_or(val.len());
    let end = val.iter().rposition(|&b| !is_ows(b)).map(|i| i + 1).unwrap_or(start);
    &val[start..end]
}

/// Split a comma-separated list header value into trimmed tokens.
pub fn split_list(val: &[u8]) -> impl Iterator<Item = &[u8]> {
    val.split(|&b| b == b',').map(trim_ows).filter(|t| !t.is_empty())
}

/// Does any token in the comma-separated list satisfy `pred`?
pub fn list_any(val: &[u8], pred: impl Fn(&[u8]) -> bool) -> bool {
    split_list(val).any(|t| pred(t))
}

/// The last token in a comma-separated list, if any.
pub fn list_last(val: &[u8]) -> Option<&[u8]> {
    split_list(val).last()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_chunked() {
        assert!(is_chunked(b"chunked"));
        assert!(is_chunked(b"Chunked"));
        assert!(is_chunked(b"chuNKED"));
        assert!(is_chunked(b"   CHUNKED  "));
        assert!(!is_chunked(b"   CHUNKED 1 "));
    }

    #[test]
    fn test_close() {
        assert!(is_close(b"close"));
        assert!(is_close(b" CLOSE"));
        assert!(!is_close(b"Close  1 "));
        assert!(!is_close(b" xclose   "));
    }

    #[test]
    fn test_continue() {
        assert!(is_continue(b"100-continue"));
        assert!(is_continue(b"  100-CONTINUE"));
        assert!(!is_continue(b"100-continue y  "));
    }

    #[test]
    fn last_token_of_list() {
        assert_eq!(list_last(b"gzip, chunked"), Some(&b"chunked"[..]));
        assert_eq!(list_last(b""), None);
    }

    #[test]
    fn any_token_matches_close() {
        assert!(list_any(b"keep-alive, close", is_close));
        assert!(!list_any(b"keep-alive", is_close));
    }
}
