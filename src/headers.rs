//! Header view and field index (spec.md §3, §4.2).
//!
//! The request-line/status-line and field-line grammar itself is tokenized
//! by `httparse::Request`/`httparse::Response` (the same crate `chunked.rs`
//! already uses for `parse_chunk_size`), the way the teacher's
//! `client/parser.rs`/`server/headers.rs` wrap it: parse once against a
//! small on-stack header array, retry with a larger heap-allocated one on
//! `TooManyHeaders`. Two things `httparse` does not do are still
//! hand-written here: resolving obs-fold continuations (RFC 7230 §3.2.4)
//! before handing the buffer to `httparse`, and copying the borrowed
//! `httparse::Header`s out into this crate's own back-allocated
//! `FieldTable` (`FieldEntry` offset records) so the field index survives
//! past the parse call instead of staying tied to `httparse`'s borrow.
//!
//! obs-fold is resolved in place: the CRLF of a folded continuation line is
//! overwritten with plain spaces directly in the header buffer. This keeps
//! the buffer's length (and every other field's offsets) unchanged, so
//! `buffer()` still reads as one contiguous wire-format span and field
//! ranges stay simple `(offset, length)` pairs instead of needing a
//! copy-compaction pass.

use crate::error::HeaderError;
use crate::field::FieldId;
use crate::token;
use crate::version::Version;

/// One occurrence of a header field in the header buffer.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    pub name_offset: usize,
    pub name_len: usize,
    pub value_offset: usize,
    pub value_len: usize,
    pub id: FieldId,
}

/// The back-allocated field-index table (spec.md §9 "Field index via
/// back-allocated arena"). Capacity is fixed at construction and charged
/// against the owning `Workspace`'s budget via `Workspace::reserve_back`.
#[derive(Debug, Default)]
pub struct FieldTable {
    entries: Vec<FieldEntry>,
    max: usize,
}

impl FieldTable {
    pub fn with_capacity(max: usize) -> FieldTable {
        FieldTable { entries: Vec::with_capacity(max), max }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, entry: FieldEntry) -> Result<(), HeaderError> {
        if self.entries.len() >= self.max {
            return Err(HeaderError::TooManyFields);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn as_slice(&self) -> &[FieldEntry] {
        &self.entries
    }
}

/// The parsed start-line: either a request-line or a status-line.
#[derive(Debug, Clone)]
pub enum StartLine {
    Request { method: (usize, usize), target: (usize, usize), version: Version },
    Response { version: Version, status: u16, reason: (usize, usize) },
}

/// Result of a completed single-pass header scan.
pub struct Scanned {
    pub start_line: StartLine,
    pub fields: FieldTable,
    /// Number of bytes of `buf` consumed, i.e. up to and including the
    /// final CRLFCRLF.
    pub consumed: usize,
}

/// On-stack header count handed to `httparse` before retrying with a
/// heap-allocated array sized to the caller's `max_fields` on
/// `TooManyHeaders` — mirrors the teacher's `server/headers.rs`/
/// `client/parser.rs::parse_headers` retry loop (`MIN_HEADERS`/
/// `MAX_HEADERS`), except the retry size is the config's own field-index
/// capacity rather than a second fixed constant, since `httparse` is never
/// allowed to index more fields than `FieldTable` has room for anyway.
const STACK_HEADERS: usize = 16;

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' {
            if buf[i + 1] == b'\n' {
                return Some(i);
            }
            return None; // bare CR: strict error, caller reports it
        }
        if buf[i] == b'\n' {
            return None; // bare LF
        }
        i += 1;
    }
    None
}

/// Resolve obs-fold (RFC 7230 §3.2.4) continuations in the field-line
/// section starting at `start`, and locate the end of that section (just
/// past the final CRLFCRLF). `httparse` has no notion of folding — a
/// continuation line looks like a malformed header line to it — so this
/// has to run before the buffer is handed over; everything else about
/// tokenizing the now-fold-free lines is `httparse`'s job.
///
/// Returns `Ok(None)` if the field-line section isn't complete yet.
fn unfold(buf: &mut [u8], start: usize) -> Result<Option<usize>, HeaderError> {
    let mut pos = start;
    loop {
        if pos + 1 < buf.len() && buf[pos] == b'\r' && buf[pos + 1] == b'\n' {
            return Ok(Some(pos + 2));
        }
        let mut line_end = match find_crlf(buf, pos) {
            Some(i) => i,
            None => return Ok(None),
        };
        let mut next = line_end + 2;
        while next < buf.len() && (buf[next] == b' ' || buf[next] == b'\t') {
            let cont_end = match find_crlf(buf, next) {
                Some(i) => i,
                None => return Ok(None),
            };
            // Splice the fold's CRLF into spaces in place; this keeps the
            // buffer length (and every other field's offsets) fixed.
            for b in &mut buf[line_end..next] {
                *b = b' ';
            }
            line_end = cont_end;
            next = cont_end + 2;
        }
        pos = next;
    }
}

fn map_httparse_error(e: httparse::Error) -> HeaderError {
    match e {
        httparse::Error::HeaderName => HeaderError::InvalidFieldName,
        httparse::Error::HeaderValue => HeaderError::InvalidFieldValue,
        httparse::Error::NewLine => HeaderError::BareCrOrLf,
        httparse::Error::Status | httparse::Error::Token | httparse::Error::Version =>
            HeaderError::InvalidStartLine,
        httparse::Error::TooManyHeaders => HeaderError::TooManyFields,
    }
}

/// Copy `httparse`'s borrowed headers into this crate's own back-allocated
/// `FieldTable`, recording each name/value as an `(offset, len)` pair into
/// `buf` rather than keeping the borrow alive (spec.md §4.2) — the one
/// thing `httparse` doesn't do for us.
fn copy_headers(
    buf: &[u8],
    headers: &[httparse::Header<'_>],
    max_fields: usize,
) -> Result<FieldTable, HeaderError> {
    let base = buf.as_ptr() as usize;
    let mut fields = FieldTable::with_capacity(max_fields);
    for h in headers {
        let name_offset = h.name.as_ptr() as usize - base;
        let value_offset = h.value.as_ptr() as usize - base;
        let id = FieldId::classify(h.name.as_bytes());
        fields.push(FieldEntry {
            name_offset,
            name_len: h.name.len(),
            value_offset,
            value_len: h.value.len(),
            id,
        })?;
    }
    Ok(fields)
}

fn version_of(raw: Option<u8>) -> Result<Version, HeaderError> {
    match raw {
        Some(0) => Ok(Version::Http10),
        Some(1) => Ok(Version::Http11),
        _ => Err(HeaderError::InvalidStartLine),
    }
}

fn offset_of(buf: &[u8], s: &str) -> (usize, usize) {
    let start = s.as_ptr() as usize - buf.as_ptr() as usize;
    (start, start + s.len())
}

/// Scan `buf` for a complete header section (start-line plus field lines
/// up to and including the final CRLFCRLF). Returns `Ok(None)` if `buf`
/// does not yet contain a complete header section (the caller should
/// supply more input); `Ok(Some(..))` once it does; `Err` on any ABNF
/// violation, which is always unrecoverable for the current stream.
///
/// `want_response` selects status-line vs. request-line grammar.
pub fn scan(
    buf: &mut [u8],
    want_response: bool,
    max_fields: usize,
) -> Result<Option<Scanned>, HeaderError> {
    let first_crlf = match find_crlf(buf, 0) {
        Some(i) => i,
        None => return Ok(None),
    };
    let header_end = match unfold(buf, first_crlf + 2)? {
        Some(end) => end,
        None => return Ok(None),
    };
    let input = &buf[..header_end];
    let mut stack_headers = [httparse::EMPTY_HEADER; STACK_HEADERS];
    let mut heap_headers;

    if want_response {
        let mut raw = httparse::Response::new(&mut stack_headers);
        let mut result = raw.parse(input);
        if matches!(result, Err(httparse::Error::TooManyHeaders)) && max_fields > STACK_HEADERS {
            heap_headers = vec![httparse::EMPTY_HEADER; max_fields];
            raw = httparse::Response::new(&mut heap_headers);
            result = raw.parse(input);
        }
        let consumed = match result.map_err(map_httparse_error)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };
        let version = version_of(raw.version)?;
        let status = raw.code.ok_or(HeaderError::InvalidStartLine)?;
        let reason = offset_of(buf, raw.reason.unwrap_or(""));
        let fields = copy_headers(buf, raw.headers, max_fields)?;
        let start_line = StartLine::Response { version, status, reason };
        Ok(Some(Scanned { start_line, fields, consumed }))
    } else {
        let mut raw = httparse::Request::new(&mut stack_headers);
        let mut result = raw.parse(input);
        if matches!(result, Err(httparse::Error::TooManyHeaders)) && max_fields > STACK_HEADERS {
            heap_headers = vec![httparse::EMPTY_HEADER; max_fields];
            raw = httparse::Request::new(&mut heap_headers);
            result = raw.parse(input);
        }
        let consumed = match result.map_err(map_httparse_error)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };
        let version = version_of(raw.version)?;
        let method = offset_of(buf, raw.method.ok_or(HeaderError::InvalidStartLine)?);
        let target = offset_of(buf, raw.path.ok_or(HeaderError::InvalidStartLine)?);
        let fields = copy_headers(buf, raw.headers, max_fields)?;
        let start_line = StartLine::Request { method, target, version };
        Ok(Some(Scanned { start_line, fields, consumed }))
    }
}

/// Scan a field-line section (no start-line) beginning at `start`, up to
/// and including its terminating CRLFCRLF. Shared by `scan` for the header
/// section and by `chunked.rs` for the trailer-part of a chunked body,
/// which has exactly the same grammar.
///
/// Returns the fields found and the absolute offset just past the final
/// CRLFCRLF, i.e. the number of bytes of `buf` consumed from its start
/// (not from `start`).
pub fn scan_fields(
    buf: &mut [u8],
    start: usize,
    max_fields: usize,
) -> Result<Option<(FieldTable, usize)>, HeaderError> {
    let header_end = match unfold(buf, start)? {
        Some(end) => end,
        None => return Ok(None),
    };
    let input = &buf[start..header_end];
    let mut stack_headers = [httparse::EMPTY_HEADER; STACK_HEADERS];
    let mut heap_headers;
    let mut result = httparse::parse_headers(input, &mut stack_headers);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) && max_fields > STACK_HEADERS {
        heap_headers = vec![httparse::EMPTY_HEADER; max_fields];
        result = httparse::parse_headers(input, &mut heap_headers);
    }
    match result.map_err(map_httparse_error)? {
        httparse::Status::Complete((_, headers)) => {
            let fields = copy_headers(buf, headers, max_fields)?;
            Ok(Some((fields, header_end)))
        }
        httparse::Status::Partial => Ok(None),
    }
}

// ---------------------------------------------------------------------
// Metadata derivation (spec.md §3 "Metadata", "Payload kind decision").
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    Absent,
    Exact(u64),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Identity,
    Gzip,
    Deflate,
    Br,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    None,
    Size(u64),
    Chunked,
    ToEof,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub content_length: ContentLength,
    pub is_chunked: bool,
    pub content_encoding: Coding,
    pub connection_close: bool,
    pub expect_100_continue: bool,
    pub upgrade: bool,
    pub payload_kind: PayloadKind,
}

/// Does this response status forbid a body regardless of framing headers?
/// 1xx, 204, 304 (spec.md §3 "HEAD responses and 1xx/204/304 statuses
/// force `none`").
pub fn status_forbids_body(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}

/// Derive `Metadata` from a completed header scan.
///
/// `is_request` distinguishes request framing rules (no body by default)
/// from response framing rules (`to_eof` by default). `head_response`
/// forces `PayloadKind::None` for a response known to answer a HEAD
/// request, since its Content-Length describes a body that was not sent.
pub fn derive(
    buf: &[u8],
    start_line: &StartLine,
    fields: &FieldTable,
    is_request: bool,
    head_response: bool,
) -> Metadata {
    let mut has_te = false;
    let mut te_chunked = false;
    let mut content_length = ContentLength::Absent;
    let mut saw_content_length = false;
    let mut connection_close = false;
    let mut expect_100_continue = false;
    let mut upgrade = false;
    let mut content_encoding = Coding::Identity;

    for f in fields.as_slice() {
        let value = &buf[f.value_offset..f.value_offset + f.value_len];
        match f.id {
            FieldId::TransferEncoding => {
                has_te = true;
                if let Some(last) = token::list_last(value) {
                    te_chunked = token::is_chunked(last);
                }
            }
            FieldId::ContentLength => {
                let parsed = std::str::from_utf8(value).ok()
                    .and_then(|s| s.parse::<u64>().ok());
                match parsed {
                    None => content_length = ContentLength::Error,
                    Some(n) => {
                        if saw_content_length {
                            if content_length != ContentLength::Exact(n) {
                                content_length = ContentLength::Error;
                            }
                        } else {
                            content_length = ContentLength::Exact(n);
                        }
                        saw_content_length = true;
                    }
                }
            }
            FieldId::Connection => {
                if token::list_any(value, token::is_close) {
                    connection_close = true;
                }
            }
            FieldId::Expect => {
                if token::is_continue(value) {
                    expect_100_continue = true;
                }
            }
            FieldId::Upgrade => {
                upgrade = true;
            }
            FieldId::ContentEncoding => {
                content_encoding = match token::list_last(value) {
                    Some(v) if eq_ci(v, b"gzip") || eq_ci(v, b"x-gzip") => Coding::Gzip,
                    Some(v) if eq_ci(v, b"deflate") => Coding::Deflate,
                    Some(v) if eq_ci(v, b"br") => Coding::Br,
                    Some(v) if eq_ci(v, b"identity") => Coding::Identity,
                    Some(_) => Coding::Unsupported,
                    None => Coding::Identity,
                };
            }
            _ => {}
        }
    }

    let version_10 = matches!(start_line,
        StartLine::Request { version: Version::Http10, .. } |
        StartLine::Response { version: Version::Http10, .. });
    if version_10 {
        connection_close = true;
    }

    let payload_kind = if te_chunked {
        PayloadKind::Chunked
    } else if has_te {
        // Transfer-Encoding present but not terminated by `chunked`: the
        // message length cannot be determined safely.
        PayloadKind::Error
    } else {
        match content_length {
            ContentLength::Error => PayloadKind::Error,
            ContentLength::Exact(0) => PayloadKind::None,
            ContentLength::Exact(n) => PayloadKind::Size(n),
            ContentLength::Absent => {
                if is_request {
                    PayloadKind::None
                } else {
                    PayloadKind::ToEof
                }
            }
        }
    };

    let forced_none = head_response || match start_line {
        StartLine::Response { status, .. } => status_forbids_body(*status),
        StartLine::Request { .. } => false,
    };

    Metadata {
        content_length,
        is_chunked: te_chunked,
        content_encoding,
        connection_close,
        expect_100_continue,
        upgrade,
        payload_kind: if forced_none { PayloadKind::None } else { payload_kind },
    }
}

fn eq_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter())
        .all(|(&x, &y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

// ---------------------------------------------------------------------
// Read-only view over a completed header.
// ---------------------------------------------------------------------

/// Borrowed, read-only access to a completed header section: the
/// start-line, the field index, and lookup helpers (spec.md §4.2).
pub struct HeaderView<'a> {
    pub buf: &'a [u8],
    pub start_line: &'a StartLine,
    pub fields: &'a [FieldEntry],
}

impl<'a> HeaderView<'a> {
    /// Exactly the bytes on the wire, up to and including the final
    /// CRLFCRLF (spec.md §4.2 invariant).
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn version(&self) -> Version {
        match *self.start_line {
            StartLine::Request { version, .. } => version,
            StartLine::Response { version, .. } => version,
        }
    }

    pub fn method(&self) -> Option<&'a str> {
        match *self.start_line {
            StartLine::Request { method: (s, e), .. } => std::str::from_utf8(&self.buf[s..e]).ok(),
            StartLine::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&'a str> {
        match *self.start_line {
            StartLine::Request { target: (s, e), .. } => std::str::from_utf8(&self.buf[s..e]).ok(),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match *self.start_line {
            StartLine::Response { status, .. } => Some(status),
            StartLine::Request { .. } => None,
        }
    }

    pub fn count(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, f: &FieldEntry) -> &'a str {
        std::str::from_utf8(&self.buf[f.name_offset..f.name_offset + f.name_len]).unwrap_or("")
    }

    fn field_value(&self, f: &FieldEntry) -> &'a str {
        std::str::from_utf8(&self.buf[f.value_offset..f.value_offset + f.value_len]).unwrap_or("")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.fields.iter().any(|f| self.field_name(f).eq_ignore_ascii_case(name))
    }

    pub fn find(&self, name: &str) -> Option<&'a str> {
        self.fields.iter()
            .find(|f| self.field_name(f).eq_ignore_ascii_case(name))
            .map(|f| self.field_value(f))
    }

    pub fn find_by_id(&self, id: FieldId) -> Option<&'a str> {
        self.fields.iter().find(|f| f.id == id).map(|f| self.field_value(f))
    }

    pub fn find_all<'b>(&'b self, name: &str) -> impl Iterator<Item = &'a str> + 'b {
        self.fields.iter()
            .filter(move |f| self.field_name(f).eq_ignore_ascii_case(name))
            .map(move |f| self.field_value(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.fields.iter().map(move |f| (self.field_name(f), self.field_value(f)))
    }

    /// Concatenate every occurrence of `name` with `,` (spec.md §4.2
    /// "multi-value collapse"). Intended for list-producing fields such
    /// as `Transfer-Encoding` or `Connection`.
    pub fn combine_field_values(&self, name: &str) -> Option<String> {
        let mut out: Option<String> = None;
        for v in self.find_all(name) {
            match &mut out {
                None => out = Some(v.to_string()),
                Some(s) => {
                    s.push(',');
                    s.push_str(v);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scan_req(mut raw: Vec<u8>) -> Scanned {
        scan(&mut raw, false, 64).unwrap().unwrap()
    }

    #[test]
    fn simple_request() {
        let raw = b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n".to_vec();
        let s = scan_req(raw.clone());
        let view = HeaderView { buf: &raw[..s.consumed], start_line: &s.start_line, fields: s.fields.as_slice() };
        assert_eq!(view.method(), Some("GET"));
        assert_eq!(view.target(), Some("/foo"));
        assert_eq!(view.find("host"), Some("example.com"));
        assert_eq!(view.version(), Version::Http11);
    }

    #[test]
    fn obs_fold_is_replaced_with_space() {
        let raw = b"GET / HTTP/1.1\r\nX-Long: part-one\r\n  part-two\r\n\r\n".to_vec();
        let s = scan_req(raw.clone());
        let view = HeaderView { buf: &raw[..s.consumed], start_line: &s.start_line, fields: s.fields.as_slice() };
        assert_eq!(view.find("x-long"), Some("part-one    part-two"));
    }

    #[test]
    fn incomplete_header_returns_none() {
        let mut raw = b"GET / HTTP/1.1\r\nHost: x".to_vec();
        assert!(scan(&mut raw, false, 64).unwrap().is_none());
    }

    #[test]
    fn bad_method_token_is_rejected() {
        let mut raw = b"G(T / HTTP/1.1\r\n\r\n".to_vec();
        assert!(matches!(scan(&mut raw, false, 64), Err(HeaderError::InvalidStartLine)));
    }

    #[test]
    fn duplicate_distinct_content_length_is_error() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n".to_vec();
        let s = scan_req(raw.clone());
        let meta = derive(&raw, &s.start_line, &s.fields, true, false);
        assert_eq!(meta.payload_kind, PayloadKind::Error);
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 6\r\n\r\n".to_vec();
        let s = scan_req(raw.clone());
        let meta = derive(&raw, &s.start_line, &s.fields, true, false);
        assert_eq!(meta.payload_kind, PayloadKind::Chunked);
    }

    #[test]
    fn response_without_content_length_is_to_eof() {
        let mut raw = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        let s = scan(&mut raw, true, 64).unwrap().unwrap();
        let meta = derive(&raw, &s.start_line, &s.fields, false, false);
        assert_eq!(meta.payload_kind, PayloadKind::ToEof);
    }

    #[test]
    fn informational_status_forces_none() {
        let mut raw = b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n".to_vec();
        let s = scan(&mut raw, true, 64).unwrap().unwrap();
        let meta = derive(&raw, &s.start_line, &s.fields, false, false);
        assert_eq!(meta.payload_kind, PayloadKind::None);
    }
}
