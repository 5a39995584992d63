//! The HTTP/1.1 parser state machine (spec.md §4.4).
//!
//! `reset → start → header → header_done → body → (complete_in_place |
//! complete) → start …`, grounded on the teacher's `server/proto.rs`
//! `InState`/`BodyProgress` split and `chunked.rs`'s buffered/pending
//! bookkeeping, generalized over this crate's bespoke `Workspace`/`RingBuf`
//! instead of `netbuf::Buf`, and extended with the decompression-filter and
//! sink delivery paths `tk-http` doesn't need but the original Boost.Http
//! `parser.hpp` does.

use std::sync::Arc;

use crate::chunked::{ChunkedDecoder, StepOutcome as ChunkStep};
use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::field::FieldId;
use crate::filter::{self, Filter};
use crate::headers::{self, FieldTable, HeaderView, Metadata, PayloadKind, StartLine};
use crate::ring::RingBuf;
use crate::workspace::{Addr, Workspace};

/// Caller-provided consumer of decoded body bytes (spec.md §4.4 "Sink
/// delivery mode"). Attached between `header_done` and the first body
/// byte; the parser pushes decoded bytes into it as they become available
/// instead of accumulating them in the in-place ring.
pub trait Sink {
    /// Consume a prefix of `buffer`, returning how many bytes were taken.
    /// `more == false` marks the final call for this message's body.
    fn on_write(&mut self, buffer: &[u8], more: bool) -> std::io::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between messages of the same stream; `start()` must be called.
    Idle,
    /// Accumulating/scanning the header section.
    Header,
    /// Header complete, metadata derived, body not yet begun. A sink may
    /// still be attached here.
    HeaderDone,
    /// Body framing in progress.
    Body,
    /// Body framing complete; any unconsumed bytes remain pullable
    /// in-place via `pull_body`/`body`.
    CompleteInPlace,
    /// Terminal error occurred; `reset()` required before further use.
    Faulted,
}

enum Progress {
    Advanced,
    NeedInput,
    Done,
}

/// A streaming HTTP/1.1 parser reused across every message of one stream.
pub struct Parser {
    config: Arc<ParserConfig>,
    want_response: bool,

    workspace: Workspace,
    io_addr: Addr,
    decoded_addr: Addr,
    trailer_addr: Addr,
    input: RingBuf,
    decoded: RingBuf,
    overread_scratch: Vec<u8>,
    /// Reused scratch buffers for the filter/sink delivery paths, grown
    /// once to their steady-state high-water mark and `clear()`ed (never
    /// reallocated down) between calls.
    raw_scratch: Vec<u8>,
    sink_scratch: Vec<u8>,

    state: State,
    eof_committed: bool,
    head_response: bool,

    start_line: Option<StartLine>,
    header_len: usize,
    fields: FieldTable,
    metadata: Option<Metadata>,

    body_limit: u64,
    body_total: u64,
    /// `None` once the payload kind is `to_eof`'s unbounded remainder;
    /// `Some(remaining_encoded_bytes)` for `size(N)`.
    remaining: Option<u64>,
    chunked: Option<ChunkedDecoder>,
    trailer_fill: usize,
    trailer_fields: Option<FieldTable>,

    /// Bytes already admitted (counted against `body_total`) but not yet
    /// drained by the caller via `consume_body`. Lives in `input` when no
    /// filter is installed, in `decoded` when one is.
    pending_avail: usize,

    filter: Option<Box<dyn Filter + Send>>,
    sink: Option<Box<dyn Sink>>,
}

impl Parser {
    /// Construct a parser for request messages (`want_response = false`)
    /// or response messages (`want_response = true`). Allocates the
    /// `Workspace` immediately; the header/body ring regions themselves
    /// are (re-)reserved by `start()`.
    pub fn new(config: Arc<ParserConfig>, want_response: bool) -> Parser {
        let workspace = Workspace::new(config.workspace_size);
        let body_limit = config.body_limit;
        Parser {
            config,
            want_response,
            workspace,
            io_addr: 0..0,
            decoded_addr: 0..0,
            trailer_addr: 0..0,
            input: RingBuf::new(0),
            decoded: RingBuf::new(0),
            overread_scratch: Vec::new(),
            raw_scratch: Vec::new(),
            sink_scratch: Vec::new(),
            state: State::Idle,
            eof_committed: false,
            head_response: false,
            start_line: None,
            header_len: 0,
            fields: FieldTable::with_capacity(0),
            metadata: None,
            body_limit,
            body_total: 0,
            remaining: None,
            chunked: None,
            trailer_fill: 0,
            trailer_fields: None,
            pending_avail: 0,
            filter: None,
            sink: None,
        }
    }

    /// Begin an entirely new stream: no overread is preserved. Call before
    /// the first `start()`, or after any terminal `ParseError` other than
    /// `NeedMoreInput`.
    pub fn reset(&mut self) {
        self.workspace.clear();
        self.io_addr = 0..0;
        self.decoded_addr = 0..0;
        self.trailer_addr = 0..0;
        self.input = RingBuf::new(0);
        self.decoded = RingBuf::new(0);
        self.overread_scratch.clear();
        self.state = State::Idle;
        self.eof_committed = false;
        self.start_line = None;
        self.header_len = 0;
        self.fields.clear();
        self.metadata = None;
        self.body_total = 0;
        self.remaining = None;
        self.chunked = None;
        self.trailer_fill = 0;
        self.trailer_fields = None;
        self.pending_avail = 0;
        self.filter = None;
        self.sink = None;
    }

    /// Begin one message. Preserves overread (pipelined) bytes from the
    /// previous message by compacting them to the front of the re-reserved
    /// I/O region (spec.md §3 "Lifecycles").
    pub fn start(&mut self, head_response: bool) -> Result<(), ParseError> {
        let io_capacity = self.config.headers_max_size.max(self.config.min_buffer);
        let decoded_capacity = self.config.min_buffer;
        let trailer_capacity = self.config.headers_max_size;

        self.overread_scratch.clear();
        if self.io_addr.end > self.io_addr.start {
            let region = &self.workspace.data()[self.io_addr.clone()];
            let (a, b) = self.input.data(region);
            self.overread_scratch.extend_from_slice(a);
            self.overread_scratch.extend_from_slice(b);
        }

        self.workspace.clear();
        self.io_addr = self.workspace.reserve_front(io_capacity)
            .map_err(|_| ParseError::WorkspaceTooSmall)?;
        self.decoded_addr = self.workspace.reserve_front(decoded_capacity)
            .map_err(|_| ParseError::WorkspaceTooSmall)?;
        self.trailer_addr = self.workspace.reserve_front(trailer_capacity)
            .map_err(|_| ParseError::WorkspaceTooSmall)?;
        self.workspace.reserve_back(self.config.max_fields * std::mem::size_of::<headers::FieldEntry>())
            .map_err(|_| ParseError::WorkspaceTooSmall)?;

        self.input = RingBuf::new(io_capacity);
        self.decoded = RingBuf::new(decoded_capacity);
        {
            let region = &mut self.workspace.data_mut()[self.io_addr.clone()];
            region[..self.overread_scratch.len()].copy_from_slice(&self.overread_scratch);
        }
        self.input.commit(self.overread_scratch.len());

        self.eof_committed = false;
        self.head_response = head_response;
        self.start_line = None;
        self.header_len = 0;
        self.fields = FieldTable::with_capacity(self.config.max_fields);
        self.metadata = None;
        self.body_total = 0;
        self.remaining = None;
        self.chunked = None;
        self.trailer_fill = 0;
        self.trailer_fields = None;
        self.pending_avail = 0;
        self.filter = None;
        self.sink = None;
        self.state = State::Header;
        log::trace!("parser: start, head_response={}", head_response);
        Ok(())
    }

    /// A mutable buffer for the caller to fill with wire bytes, capped at
    /// `ParserConfig::max_prepare`. Invalidated by the next `commit`/
    /// `commit_eof`.
    pub fn prepare(&mut self) -> &mut [u8] {
        let cap = self.config.max_prepare;
        let region = &mut self.workspace.data_mut()[self.io_addr.clone()];
        let (first, _second) = self.input.free_mut(region);
        let n = first.len().min(cap);
        &mut first[..n]
    }

    /// Confirm that `n` bytes were written into the buffer `prepare()`
    /// returned.
    pub fn commit(&mut self, n: usize) {
        self.input.commit(n);
    }

    /// Signal clean end-of-stream: no further bytes will ever arrive.
    pub fn commit_eof(&mut self) {
        self.eof_committed = true;
    }

    /// Attach a sink between `header_done` and the first body byte.
    pub fn attach_sink(&mut self, sink: Box<dyn Sink>) {
        assert!(matches!(self.state, State::HeaderDone),
            "attach_sink called outside header_done");
        self.sink = Some(sink);
    }

    /// Override `ParserConfig::body_limit` for the current message only.
    /// Must be called between `start()`/`header_done` and the first body
    /// byte.
    pub fn set_body_limit(&mut self, n: u64) {
        self.body_limit = n;
    }

    pub fn got_header(&self) -> bool {
        !matches!(self.state, State::Idle | State::Header)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::CompleteInPlace)
    }

    pub fn header(&self) -> HeaderView {
        assert!(self.got_header(), "header() called before got_header()");
        let buf = &self.workspace.data()[self.io_addr.start..self.io_addr.start + self.header_len];
        HeaderView {
            buf,
            start_line: self.start_line.as_ref().unwrap(),
            fields: self.fields.as_slice(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        self.metadata.as_ref().expect("metadata() called before got_header()")
    }

    /// Trailer fields parsed after a chunked body's terminal `0`-chunk, if
    /// the message used chunked transfer-coding and has completed.
    pub fn trailer(&self) -> Option<&[headers::FieldEntry]> {
        self.trailer_fields.as_ref().map(|t| t.as_slice())
    }

    /// Advance the state machine as far as currently buffered input (and
    /// `commit_eof`) allow.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        if matches!(self.state, State::Faulted) {
            return Err(ParseError::Incomplete);
        }
        if matches!(self.state, State::Header) {
            match self.advance_header()? {
                Progress::NeedInput => {
                    if self.eof_committed {
                        self.state = State::Faulted;
                        let err = if self.input.is_empty() && self.header_len == 0 {
                            ParseError::EndOfStream
                        } else {
                            ParseError::Incomplete
                        };
                        log::debug!("parser: stream ended while reading header: {:?}", err);
                        return Err(err);
                    }
                    return Err(ParseError::NeedMoreInput);
                }
                Progress::Done => {
                    self.state = State::HeaderDone;
                    log::trace!("parser: header parsed, {} bytes", self.header_len);
                }
                Progress::Advanced => unreachable!("advance_header never reports bare progress"),
            }
        }
        if matches!(self.state, State::HeaderDone) {
            self.enter_body()?;
            self.state = State::Body;
        }
        if matches!(self.state, State::Body) {
            loop {
                match self.advance_body() {
                    Ok(Progress::Advanced) => continue,
                    Ok(Progress::NeedInput) => {
                        if self.eof_committed {
                            self.state = State::Faulted;
                            return Err(ParseError::Incomplete);
                        }
                        return Err(ParseError::NeedMoreInput);
                    }
                    Ok(Progress::Done) => {
                        self.state = State::CompleteInPlace;
                        log::trace!("parser: body complete, {} bytes total", self.body_total);
                        return Ok(());
                    }
                    Err(e) => {
                        self.state = State::Faulted;
                        log::warn!("parser: body framing error: {:?}", e);
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    fn advance_header(&mut self) -> Result<Progress, ParseError> {
        let max_fields = self.config.max_fields;
        let want_response = self.want_response;
        let buf = &mut self.workspace.data_mut()[self.io_addr.clone()];
        let region = &mut buf[..self.input.len()];
        if region.len() > self.config.headers_max_size {
            return Err(ParseError::BadHeader(crate::error::HeaderError::HeaderTooLarge));
        }
        match headers::scan(region, want_response, max_fields)? {
            None => Ok(Progress::NeedInput),
            Some(scanned) => {
                self.input.consume(scanned.consumed);
                self.header_len = scanned.consumed;
                self.start_line = Some(scanned.start_line);
                self.fields = scanned.fields;
                Ok(Progress::Done)
            }
        }
    }

    fn enter_body(&mut self) -> Result<(), ParseError> {
        let buf = &self.workspace.data()[self.io_addr.start..self.io_addr.start + self.header_len];
        let meta = headers::derive(buf, self.start_line.as_ref().unwrap(), &self.fields,
            !self.want_response, self.head_response);
        let kind = meta.payload_kind;
        self.metadata = Some(meta);
        log::trace!("parser: payload kind {:?}", kind);

        if matches!(kind, PayloadKind::Error) {
            return Err(ParseError::BadHeader(crate::error::HeaderError::InvalidContentLength));
        }

        match kind {
            PayloadKind::Size(n) => self.remaining = Some(n),
            PayloadKind::ToEof => self.remaining = None,
            PayloadKind::Chunked => self.chunked = Some(ChunkedDecoder::new()),
            PayloadKind::None | PayloadKind::Error => {}
        }

        if !matches!(meta.content_encoding, crate::headers::Coding::Identity) {
            let enabled = match meta.content_encoding {
                crate::headers::Coding::Gzip => self.config.apply_gzip_decoder,
                crate::headers::Coding::Deflate => self.config.apply_deflate_decoder,
                crate::headers::Coding::Br => self.config.apply_brotli_decoder,
                _ => false,
            };
            if enabled {
                self.filter = filter::decompressor_for(meta.content_encoding);
            }
        }
        Ok(())
    }

    fn advance_body(&mut self) -> Result<Progress, ParseError> {
        let kind = self.metadata.as_ref().unwrap().payload_kind;
        match kind {
            PayloadKind::None => Ok(Progress::Done),
            PayloadKind::Error => unreachable!("rejected in enter_body"),
            PayloadKind::Size(_) | PayloadKind::ToEof => self.advance_linear(),
            PayloadKind::Chunked => self.advance_chunked(),
        }
    }

    /// Drive `size(N)`/`to_eof` framing: everything currently in `input`
    /// beyond what's already pending is payload, no framing to strip.
    fn advance_linear(&mut self) -> Result<Progress, ParseError> {
        let raw_avail = self.input.len() - self.pending_avail;
        if raw_avail == 0 {
            return match self.remaining {
                Some(0) => Ok(Progress::Done),
                // `to_eof` framing (`remaining == None`) has no declared
                // length: it completes on a clean EOF rather than a byte
                // count, so a committed EOF with nothing left to admit is
                // completion, not a request for more input.
                None if self.eof_committed => Ok(Progress::Done),
                _ => Ok(Progress::NeedInput),
            };
        }
        let cap = match self.remaining {
            Some(r) => (r.min(raw_avail as u64)) as usize,
            None => raw_avail,
        };
        if cap == 0 {
            return Ok(Progress::Done);
        }
        self.admit(cap)?;
        if let Some(r) = self.remaining.as_mut() {
            *r -= cap as u64;
            if *r == 0 {
                return Ok(Progress::Done);
            }
        }
        Ok(Progress::Advanced)
    }

    fn advance_chunked(&mut self) -> Result<Progress, ParseError> {
        let max_fields = self.config.max_fields;
        let io_addr = self.io_addr.clone();
        let trailer_addr = self.trailer_addr.clone();
        let outcome = {
            let whole = self.workspace.data_mut();
            let (io_part, rest) = whole.split_at_mut(io_addr.end);
            let io_region = &mut io_part[io_addr.start..];
            let trailer_region = &mut rest[
                (trailer_addr.start - io_addr.end)..(trailer_addr.end - io_addr.end)];
            self.chunked.as_mut().unwrap().step(
                &mut self.input, io_region, trailer_region, &mut self.trailer_fill, max_fields)?
        };
        match outcome {
            ChunkStep::NeedMoreInput => Ok(Progress::NeedInput),
            ChunkStep::Payload(n) => {
                let delta = n.saturating_sub(self.pending_avail);
                if delta == 0 {
                    return Ok(Progress::NeedInput);
                }
                self.admit(delta)?;
                Ok(Progress::Advanced)
            }
            ChunkStep::Done { trailer } => {
                self.trailer_fields = Some(trailer);
                Ok(Progress::Done)
            }
        }
    }

    /// Admit `n` new raw bytes from the front of `input` (immediately
    /// following whatever is already `pending_avail`) into the delivery
    /// ring, enforcing `body_limit`, then (if a sink is attached) push
    /// straight through to it.
    fn admit(&mut self, n: usize) -> Result<(), ParseError> {
        if self.filter.is_some() {
            self.admit_through_filter(n)?;
        } else {
            let prospective = self.body_total + n as u64;
            if prospective > self.body_limit {
                return Err(ParseError::BodyTooLarge);
            }
            self.body_total = prospective;
            self.pending_avail += n;
        }
        if self.sink.is_some() {
            self.drain_to_sink_fully()?;
        }
        Ok(())
    }

    /// Call `drain_to_sink` repeatedly until the sink stops making forward
    /// progress or the backlog is empty. A single `drain_to_sink` call only
    /// offers the sink one `on_write`; without this loop, a sink that takes
    /// a fixed-size bite per call would never see the rest of a backlog
    /// admitted on the very last raw bytes of a message, since no further
    /// `admit` call will ever happen once payload framing reports
    /// completion.
    fn drain_to_sink_fully(&mut self) -> Result<(), ParseError> {
        loop {
            if self.pending_avail == 0 {
                return Ok(());
            }
            let before = self.pending_avail;
            self.drain_to_sink()?;
            if self.pending_avail == before {
                return Ok(());
            }
        }
    }

    fn admit_through_filter(&mut self, n: usize) -> Result<(), ParseError> {
        let io_addr = self.io_addr.clone();
        let decoded_addr = self.decoded_addr.clone();
        let more = !self.eof_committed;
        let (raw, out_bytes) = {
            let whole = self.workspace.data_mut();
            let (io_part, rest) = whole.split_at_mut(io_addr.end);
            let io_region = &io_part[io_addr.start..];
            let decoded_region = &mut rest[
                (decoded_addr.start - io_addr.end)..(decoded_addr.end - io_addr.end)];
            let (a, b) = self.input.data(io_region);
            self.raw_scratch.clear();
            self.raw_scratch.extend(a.iter().chain(b.iter()).take(n));
            let (out_first, _out_second) = self.decoded.free_mut(decoded_region);
            let filter = self.filter.as_mut().unwrap();
            let result = filter.process(out_first, &self.raw_scratch, more)?;
            (self.raw_scratch.len(), result.out_bytes)
        };
        self.input.consume(raw);
        self.decoded.commit(out_bytes);
        let prospective = self.body_total + out_bytes as u64;
        if prospective > self.body_limit {
            return Err(ParseError::BodyTooLarge);
        }
        self.body_total = prospective;
        self.pending_avail += out_bytes;
        Ok(())
    }

    fn drain_to_sink(&mut self) -> Result<(), ParseError> {
        let more = !self.eof_committed;
        let (taken, consumed) = {
            let region: &[u8] = if self.filter.is_some() {
                &self.workspace.data()[self.decoded_addr.clone()]
            } else {
                &self.workspace.data()[self.io_addr.clone()]
            };
            let ring = if self.filter.is_some() { &self.decoded } else { &self.input };
            let (a, b) = ring.data(region);
            self.sink_scratch.clear();
            self.sink_scratch.extend(a.iter().chain(b.iter()).take(self.pending_avail));
            let consumed = self.sink.as_mut().unwrap().on_write(&self.sink_scratch, more)
                .map_err(ParseError::Io)?;
            (self.sink_scratch.len(), consumed)
        };
        if self.filter.is_some() {
            self.decoded.consume(consumed);
        } else {
            self.input.consume(consumed);
            if let Some(c) = self.chunked.as_mut() {
                c.consumed_payload(consumed);
            }
        }
        self.pending_avail -= consumed;
        if consumed == 0 && taken > 0 {
            let full = if self.filter.is_some() { self.decoded.free() == 0 } else { self.input.free() == 0 };
            if full {
                return Err(ParseError::InPlaceOverflow);
            }
        }
        Ok(())
    }

    /// Two-segment const view over currently admitted, undrained body
    /// bytes.
    pub fn pull_body(&self) -> (&[u8], &[u8]) {
        if self.filter.is_some() {
            let region = &self.workspace.data()[self.decoded_addr.clone()];
            self.decoded.data(region)
        } else {
            let region = &self.workspace.data()[self.io_addr.clone()];
            self.input.data(region)
        }
    }

    /// Release `n` admitted body bytes previously returned by `pull_body`.
    pub fn consume_body(&mut self, n: usize) {
        assert!(n <= self.pending_avail, "consume_body past admitted bytes");
        if self.filter.is_some() {
            self.decoded.consume(n);
        } else {
            self.input.consume(n);
            if let Some(c) = self.chunked.as_mut() {
                c.consumed_payload(n);
            }
        }
        self.pending_avail -= n;
    }

    /// A single contiguous view of the whole body, valid only once
    /// `is_complete()` and the in-place ring never wrapped (i.e. nothing
    /// was drained mid-stream via `consume_body`).
    pub fn body(&self) -> Option<&[u8]> {
        if !self.is_complete() {
            return None;
        }
        let (a, b) = self.pull_body();
        if b.is_empty() { Some(a) } else { None }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ParserConfig;

    fn parser() -> Parser {
        Parser::new(ParserConfig::new().done(), false)
    }

    #[test]
    fn request_with_content_length() {
        let mut p = parser();
        p.start(false).unwrap();
        let input = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nHello";
        p.prepare()[..input.len()].copy_from_slice(input);
        p.commit(input.len());
        match p.parse() {
            Ok(()) => {}
            Err(ParseError::NeedMoreInput) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
        assert!(p.got_header());
        assert_eq!(p.header().method(), Some("POST"));
        assert_eq!(p.header().target(), Some("/"));
        assert!(p.is_complete());
        assert_eq!(p.body(), Some(&b"Hello"[..]));
    }

    #[test]
    fn chunked_response_split_across_reads() {
        let mut p = Parser::new(ParserConfig::new().done(), true);
        p.start(false).unwrap();
        let pieces: &[&[u8]] = &[
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n",
            b"5\r\nHello\r\n",
            b"7\r\n, World\r\n",
            b"0\r\n\r\n",
        ];
        for piece in pieces {
            p.prepare()[..piece.len()].copy_from_slice(piece);
            p.commit(piece.len());
            let _ = p.parse();
        }
        assert_eq!(p.header().status(), Some(200));
        assert!(p.is_complete());
        let (a, b) = p.pull_body();
        let mut body = Vec::new();
        body.extend_from_slice(a);
        body.extend_from_slice(b);
        assert_eq!(body, b"Hello, World");
    }

    #[test]
    fn body_too_large_is_reported() {
        let cfg = ParserConfig::new().body_limit(3).done();
        let mut p = Parser::new(cfg, true);
        p.start(false).unwrap();
        let input = b"HTTP/1.1 200 OK\r\n\r\n12345";
        p.prepare()[..input.len()].copy_from_slice(input);
        p.commit(input.len());
        p.commit_eof();
        let err = loop {
            match p.parse() {
                Err(ParseError::NeedMoreInput) => continue,
                Err(e) => break e,
                Ok(()) => panic!("expected body_too_large"),
            }
        };
        assert!(matches!(err, ParseError::BodyTooLarge));
        assert!(p.got_header());
    }

    #[test]
    fn to_eof_body_completes_on_clean_eof() {
        let mut p = Parser::new(ParserConfig::new().done(), true);
        p.start(false).unwrap();
        let input = b"HTTP/1.1 200 OK\r\n\r\nhello";
        p.prepare()[..input.len()].copy_from_slice(input);
        p.commit(input.len());
        p.commit_eof();
        loop {
            match p.parse() {
                Err(ParseError::NeedMoreInput) => continue,
                Ok(()) => break,
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }
        assert!(p.is_complete());
        assert_eq!(p.body(), Some(&b"hello"[..]));
    }

    #[test]
    fn malformed_chunk_size_is_bad_payload() {
        let mut p = Parser::new(ParserConfig::new().done(), true);
        p.start(false).unwrap();
        let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
        p.prepare()[..head.len()].copy_from_slice(head);
        p.commit(head.len());
        let _ = p.parse();
        let body = b"xxxasdfasdfasd";
        p.prepare()[..body.len()].copy_from_slice(body);
        p.commit(body.len());
        let err = p.parse().unwrap_err();
        assert!(matches!(err, ParseError::BadPayload(_)));
    }

    #[test]
    fn pipelined_messages_share_a_stream() {
        let mut p = parser();
        let wire = b"GET /a HTTP/1.1\r\nContent-Length: 0\r\n\r\nGET /b HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
        p.start(false).unwrap();
        p.prepare()[..wire.len()].copy_from_slice(wire);
        p.commit(wire.len());
        let _ = p.parse();
        assert_eq!(p.header().target(), Some("/a"));
        assert!(p.is_complete());

        p.start(false).unwrap();
        let _ = p.parse();
        assert_eq!(p.header().target(), Some("/b"));
        assert!(p.is_complete());
    }

    /// A sink that only ever accepts a fixed number of bytes per call and
    /// records everything it was actually handed, to exercise the "sink
    /// consumes fewer bytes than offered" half of spec.md §4.4's sink
    /// delivery mode.
    struct CappedSink {
        taken: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
        cap: usize,
    }

    impl Sink for CappedSink {
        fn on_write(&mut self, buffer: &[u8], _more: bool) -> std::io::Result<usize> {
            let n = buffer.len().min(self.cap);
            self.taken.borrow_mut().extend_from_slice(&buffer[..n]);
            Ok(n)
        }
    }

    #[test]
    fn sink_receives_body_bytes_as_they_decode() {
        let mut p = parser();
        p.start(false).unwrap();
        let input = b"POST / HTTP/1.1\r\nContent-Length: 11\r\n\r\n";
        p.prepare()[..input.len()].copy_from_slice(input);
        p.commit(input.len());
        let _ = p.parse();
        assert!(p.got_header());

        let taken = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        p.attach_sink(Box::new(CappedSink { taken: taken.clone(), cap: 1024 }));

        let body = b"hello world";
        p.prepare()[..body.len()].copy_from_slice(body);
        p.commit(body.len());
        let _ = p.parse();
        assert!(p.is_complete());
        assert_eq!(&taken.borrow()[..], body);
    }

    #[test]
    fn slow_sink_drains_the_whole_backlog_before_completion() {
        let mut p = parser();
        p.start(false).unwrap();
        let input = b"POST / HTTP/1.1\r\nContent-Length: 11\r\n\r\n";
        p.prepare()[..input.len()].copy_from_slice(input);
        p.commit(input.len());
        let _ = p.parse();

        let taken = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        p.attach_sink(Box::new(CappedSink { taken: taken.clone(), cap: 3 }));

        // All 11 body bytes arrive as one admission, but the sink only
        // ever takes 3 bytes per `on_write` call: `drain_to_sink_fully`
        // must keep calling it until the whole backlog has been delivered,
        // since this is the last raw input and no further `admit` call
        // would otherwise give the sink another chance.
        let body = b"hello world";
        p.prepare()[..body.len()].copy_from_slice(body);
        p.commit(body.len());
        match p.parse() {
            Ok(()) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
        assert!(p.is_complete());
        assert_eq!(&taken.borrow()[..], body);
    }
}
