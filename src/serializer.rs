//! The HTTP/1.1 serializer state machine (spec.md §4.5).
//!
//! Grounded on the teacher's `src/base_serializer.rs` `MessageState` (the
//! `ResponseStart`/`Headers`/`FixedHeaders`/`ChunkedHeaders`/`FixedBody`/
//! `ChunkedBody`/`Done` progression and its `response_status`/`add_header`/
//! `add_length`/`add_chunked`/`done_headers`/`write_body`/`done` method
//! names), generalized from the teacher's imperative "append to a `Buf` as
//! you go" API to the caller-supplies-one-`OutboundMessage` contract
//! spec.md §4.5 requires, and carried over a bespoke `Workspace` instead of
//! a `netbuf::Buf`. The streaming body mode (`start_stream`/
//! `stream_prepare`/`stream_commit`/`stream_close`) and the compressor
//! filter path have no teacher counterpart (the teacher only ever builds a
//! response from buffers the caller already assembled); both are
//! generalized from the parser's own ring-buffer and `Filter` plumbing.

use std::io::Write;
use std::sync::Arc;

use crate::config::SerializerConfig;
use crate::error::SerializeError;
use crate::field::FieldId;
use crate::filter::{Compressor, Filter};
use crate::headers::Coding;
use crate::ring::RingBuf;
use crate::token;
use crate::version::Version;
use crate::workspace::{Addr, Workspace};

/// The start-line of a message to be serialized.
pub enum StartLine<'a> {
    Request { method: &'a str, target: &'a str, version: Version },
    Response { version: Version, status: u16, reason: &'a str },
}

/// Everything the serializer needs to emit a header section. Borrowed only
/// for the duration of the `start*` call that consumes it; the header
/// bytes it produces are copied into the `Workspace` immediately.
///
/// Framing (`Content-Length` vs. `Transfer-Encoding: chunked` vs. neither)
/// and `Connection: close` are derived from `headers`/`close` exactly as a
/// caller would write them on the wire, mirroring spec.md §3's payload-kind
/// table but in the outbound direction: the caller states the framing it
/// wants via an ordinary header, rather than the engine inferring one.
pub struct OutboundMessage<'a> {
    pub start_line: StartLine<'a>,
    pub headers: &'a [(&'a str, &'a str)],
    /// This message is a response to a HEAD request: body bytes are framed
    /// (Content-Length still counted) but never actually emitted.
    pub head_response: bool,
    /// Force `Connection: close` even if not already present among
    /// `headers` and the framing doesn't already require it.
    pub close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    None,
    Size(u64),
    Chunked,
    ToEof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Header,
    /// Header fully sent, `Expect: 100-continue` was present; the next
    /// `prepare()` surfaces the suspension once, then proceeds to body.
    AwaitingContinue,
    Body,
    Done,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    Empty,
    Buffers,
    Stream,
}

/// A streaming HTTP/1.1 serializer reused across every message it emits.
pub struct Serializer {
    config: Arc<SerializerConfig>,

    workspace: Workspace,
    header_addr: Addr,
    out_addr: Addr,
    in_addr: Addr,
    out_ring: RingBuf,
    in_ring: RingBuf,

    state: State,
    header_len: usize,
    header_sent: usize,

    framing: Framing,
    body_mode: BodyMode,
    head_response: bool,
    body_emitted: u64,

    buffers: Vec<Vec<u8>>,
    buffer_idx: usize,
    buffer_off: usize,

    stream_closed: bool,
    filter: Option<Box<dyn Filter + Send>>,
    /// Compressed bytes already produced by `filter` but not yet pushed
    /// through chunk/size framing into `out_ring` — needed because a
    /// filter always consumes all the raw input handed to it in one call
    /// (see `filter.rs`'s doc comment on buffering into an internal
    /// `Vec<u8>`), while `out_ring` may not have room for all of its
    /// output at once. Framing the filter's output eagerly and dropping
    /// whatever didn't fit would silently corrupt the compressed stream.
    pending_filtered: Vec<u8>,

    fault: Option<String>,
}

fn io_err(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::WriteZero, message.into())
}

impl Serializer {
    pub fn new(config: Arc<SerializerConfig>) -> Serializer {
        let workspace = Workspace::new(config.workspace_size);
        Serializer {
            config,
            workspace,
            header_addr: 0..0,
            out_addr: 0..0,
            in_addr: 0..0,
            out_ring: RingBuf::new(0),
            in_ring: RingBuf::new(0),
            state: State::Idle,
            header_len: 0,
            header_sent: 0,
            framing: Framing::None,
            body_mode: BodyMode::Empty,
            head_response: false,
            body_emitted: 0,
            buffers: Vec::new(),
            buffer_idx: 0,
            buffer_off: 0,
            stream_closed: false,
            filter: None,
            pending_filtered: Vec::new(),
            fault: None,
        }
    }

    /// Clear the faulted state (or simply start fresh). Required before
    /// reuse once `prepare()`/`stream_commit()` has reported an `Io` fault.
    pub fn reset(&mut self) {
        self.workspace.clear();
        self.header_addr = 0..0;
        self.out_addr = 0..0;
        self.in_addr = 0..0;
        self.out_ring = RingBuf::new(0);
        self.in_ring = RingBuf::new(0);
        self.state = State::Idle;
        self.header_len = 0;
        self.header_sent = 0;
        self.framing = Framing::None;
        self.body_mode = BodyMode::Empty;
        self.head_response = false;
        self.body_emitted = 0;
        self.buffers.clear();
        self.buffer_idx = 0;
        self.buffer_off = 0;
        self.stream_closed = false;
        self.filter = None;
        self.pending_filtered.clear();
        self.fault = None;
    }

    fn reserve_regions(&mut self) -> Result<(), SerializeError> {
        self.workspace.clear();
        let header_cap = self.config.workspace_size / 4;
        let out_cap = self.config.payload_buffer.max(self.config.workspace_size / 4);
        let in_cap = self.config.payload_buffer;
        self.header_addr = self.workspace.reserve_front(header_cap)
            .map_err(|_| SerializeError::HeaderTooLarge)?;
        self.out_addr = self.workspace.reserve_front(out_cap)
            .map_err(|_| SerializeError::HeaderTooLarge)?;
        self.in_addr = self.workspace.reserve_front(in_cap)
            .map_err(|_| SerializeError::HeaderTooLarge)?;
        self.out_ring = RingBuf::new(out_cap);
        self.in_ring = RingBuf::new(in_cap);
        Ok(())
    }

    /// Write the start-line and header fields of `msg` into the header
    /// region, returning the derived body framing, the effective
    /// `Connection: close`, whether `Expect: 100-continue` was present,
    /// and any requested `Content-Encoding` compressor.
    fn compose_header(&mut self, msg: &OutboundMessage)
        -> Result<(Framing, bool, bool, Option<Coding>), SerializeError>
    {
        let region = &mut self.workspace.data_mut()[self.header_addr.clone()];
        let region_len = region.len();
        let mut cursor: &mut [u8] = region;

        match msg.start_line {
            StartLine::Request { method, target, version } => {
                write!(cursor, "{} {} {}\r\n", method, target, version)
                    .map_err(|_| SerializeError::HeaderTooLarge)?;
            }
            StartLine::Response { version, status, reason } => {
                write!(cursor, "{} {} {}\r\n", version, status, reason)
                    .map_err(|_| SerializeError::HeaderTooLarge)?;
            }
        }

        let mut content_length: Option<u64> = None;
        let mut chunked = false;
        let mut close = msg.close;
        let mut connection_written = false;
        let mut expect_continue = false;
        let mut content_encoding = None;

        for &(name, value) in msg.headers {
            if name.as_bytes().iter().any(|&b| b == b'\r' || b == b'\n')
                || value.as_bytes().iter().any(|&b| b == b'\r' || b == b'\n')
            {
                panic!("header name/value must not contain CR or LF: {:?}: {:?}", name, value);
            }
            write!(cursor, "{}: {}\r\n", name, value)
                .map_err(|_| SerializeError::HeaderTooLarge)?;

            match FieldId::classify(name.as_bytes()) {
                FieldId::ContentLength => {
                    content_length = value.parse().ok();
                }
                FieldId::TransferEncoding => {
                    chunked = token::list_any(value.as_bytes(), token::is_chunked);
                }
                FieldId::Connection => {
                    connection_written = true;
                    if token::list_any(value.as_bytes(), token::is_close) {
                        close = true;
                    }
                }
                FieldId::Expect => {
                    if token::is_continue(value.as_bytes()) {
                        expect_continue = true;
                    }
                }
                FieldId::ContentEncoding => {
                    content_encoding = match value {
                        v if v.eq_ignore_ascii_case("gzip") => Some(Coding::Gzip),
                        v if v.eq_ignore_ascii_case("deflate") => Some(Coding::Deflate),
                        v if v.eq_ignore_ascii_case("br") => Some(Coding::Br),
                        _ => None,
                    };
                }
                _ => {}
            }
        }

        let body_allowed = match msg.start_line {
            StartLine::Response { status, .. } => !crate::headers::status_forbids_body(status),
            StartLine::Request { .. } => true,
        } && !msg.head_response;

        let framing = if chunked {
            Framing::Chunked
        } else if let Some(n) = content_length {
            Framing::Size(n)
        } else if !body_allowed {
            Framing::None
        } else {
            Framing::ToEof
        };

        if matches!(framing, Framing::ToEof) && !close {
            close = true;
        }
        if close && !connection_written {
            write!(cursor, "Connection: close\r\n")
                .map_err(|_| SerializeError::HeaderTooLarge)?;
        }
        write!(cursor, "\r\n").map_err(|_| SerializeError::HeaderTooLarge)?;

        self.header_len = region_len - cursor.len();
        Ok((framing, close, expect_continue, content_encoding))
    }

    fn begin(
        &mut self,
        msg: &OutboundMessage,
        body_mode: BodyMode,
        buffers: Vec<Vec<u8>>,
    ) -> Result<(), SerializeError> {
        self.reserve_regions()?;
        let (framing, _close, expect_continue, content_encoding) = self.compose_header(msg)?;

        self.framing = framing;
        self.body_mode = body_mode;
        self.head_response = msg.head_response;
        self.header_sent = 0;
        self.body_emitted = 0;
        self.buffers = buffers;
        self.buffer_idx = 0;
        self.buffer_off = 0;
        self.stream_closed = false;
        self.fault = None;
        self.pending_filtered.clear();

        self.filter = content_encoding.and_then(|coding| match coding {
            Coding::Gzip if self.config.apply_gzip_encoder =>
                Some(Box::new(Compressor::gzip(self.config.zlib_comp_level)) as Box<dyn Filter + Send>),
            Coding::Deflate if self.config.apply_deflate_encoder =>
                Some(Box::new(Compressor::deflate(self.config.zlib_comp_level)) as Box<dyn Filter + Send>),
            Coding::Br if self.config.apply_brotli_encoder =>
                Some(Box::new(Compressor::brotli(
                    self.config.brotli_comp_quality, self.config.brotli_comp_window)) as Box<dyn Filter + Send>),
            _ => None,
        });

        self.state = if expect_continue { State::AwaitingContinue } else { State::Header };
        log::trace!("serializer: start, framing={:?} body_mode={:?}", self.framing, self.body_mode);
        Ok(())
    }

    /// Begin a message with no body (spec.md §4.5 "start(msg) (empty
    /// body)").
    pub fn start(&mut self, msg: &OutboundMessage) -> Result<(), SerializeError> {
        self.begin(msg, BodyMode::Empty, Vec::new())
    }

    /// Begin a message whose body is a caller-supplied sequence of byte
    /// buffers, already fully in memory.
    pub fn start_with_buffers(&mut self, msg: &OutboundMessage, buffers: Vec<Vec<u8>>)
        -> Result<(), SerializeError>
    {
        self.begin(msg, BodyMode::Buffers, buffers)
    }

    /// Begin a message whose body the caller will push incrementally via
    /// `stream_prepare()`/`stream_commit()`/`stream_close()`.
    pub fn start_stream(&mut self, msg: &OutboundMessage) -> Result<(), SerializeError> {
        self.begin(msg, BodyMode::Stream, Vec::new())
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn fail(&mut self, message: impl Into<String>) -> SerializeError {
        let message = message.into();
        self.fault = Some(message.clone());
        self.state = State::Faulted;
        SerializeError::Io(io_err(message))
    }

    /// A constant-buffer view of output ready to transmit. Call `consume`
    /// to advance past bytes actually written to the wire.
    pub fn prepare(&mut self) -> Result<&[u8], SerializeError> {
        if let Some(msg) = &self.fault {
            return Err(SerializeError::Io(io_err(msg.clone())));
        }
        if matches!(self.state, State::Header) {
            if self.header_sent < self.header_len {
                let region = &self.workspace.data()[self.header_addr.clone()];
                return Ok(&region[self.header_sent..self.header_len]);
            }
            self.state = State::Body;
        }
        if matches!(self.state, State::AwaitingContinue) {
            if self.header_sent < self.header_len {
                let region = &self.workspace.data()[self.header_addr.clone()];
                return Ok(&region[self.header_sent..self.header_len]);
            }
            self.state = State::Body;
            return Err(SerializeError::Expect100Continue);
        }
        if matches!(self.state, State::Body) {
            self.pump_body()?;
            let region = &self.workspace.data()[self.out_addr.clone()];
            let (a, _b) = self.out_ring.data(region);
            if a.is_empty() && self.body_done() {
                self.state = State::Done;
                return Ok(&[]);
            }
            if a.is_empty() {
                return Err(SerializeError::NeedData);
            }
            return Ok(a);
        }
        Ok(&[])
    }

    /// Advance past `n` bytes of whatever `prepare()` last returned.
    pub fn consume(&mut self, n: usize) {
        match self.state {
            State::Header | State::AwaitingContinue => {
                self.header_sent += n;
            }
            State::Body => {
                self.out_ring.consume(n);
            }
            _ => {}
        }
    }

    fn body_done(&self) -> bool {
        if self.filter.is_some() && !self.pending_filtered.is_empty() {
            return false;
        }
        match self.body_mode {
            BodyMode::Empty => true,
            BodyMode::Buffers => self.buffer_idx >= self.buffers.len(),
            BodyMode::Stream => self.stream_closed && self.in_ring.is_empty(),
        }
    }

    /// Feed as much body data as currently available through framing (and
    /// an installed compressor, if any) into `out_ring`.
    fn pump_body(&mut self) -> Result<(), SerializeError> {
        loop {
            let out_region_free = {
                let region = &self.workspace.data()[self.out_addr.clone()];
                self.out_ring.data(region);
                self.out_ring.free()
            };
            if out_region_free == 0 {
                return Ok(());
            }

            // Drain anything the filter already produced before pulling more
            // raw body bytes: framing must never reorder compressed output.
            if self.filter.is_some() && !self.pending_filtered.is_empty() {
                let drained = self.drain_pending()?;
                if drained == 0 {
                    return Ok(());
                }
                continue;
            }

            match self.body_mode {
                BodyMode::Empty => return Ok(()),
                BodyMode::Buffers => {
                    if self.buffer_idx >= self.buffers.len() {
                        return Ok(());
                    }
                    let chunk_owned;
                    {
                        let buf = &self.buffers[self.buffer_idx];
                        let remaining = &buf[self.buffer_off..];
                        if remaining.is_empty() {
                            self.buffer_idx += 1;
                            self.buffer_off = 0;
                            continue;
                        }
                        chunk_owned = remaining.to_vec();
                    }
                    let is_last_chunk = self.buffer_idx + 1 == self.buffers.len();
                    if self.filter.is_some() {
                        self.push_through_filter(&chunk_owned, !is_last_chunk)?;
                        self.buffer_idx += 1;
                        self.buffer_off = 0;
                        continue;
                    }
                    let consumed = self.frame_and_append(&chunk_owned)?;
                    self.buffer_off += consumed;
                    if consumed == 0 {
                        return Ok(());
                    }
                }
                BodyMode::Stream => {
                    let region = &self.workspace.data()[self.in_addr.clone()];
                    let (a, b) = self.in_ring.data(region);
                    if a.is_empty() && b.is_empty() {
                        if self.stream_closed && self.filter.is_some() {
                            self.push_through_filter(&[], false)?;
                        }
                        return Ok(());
                    }
                    let staged: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
                    if self.filter.is_some() {
                        self.push_through_filter(&staged, !self.stream_closed)?;
                        self.in_ring.consume(staged.len());
                        continue;
                    }
                    let consumed = self.frame_and_append(&staged)?;
                    self.in_ring.consume(consumed);
                    if consumed == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run `data` through the installed compressor, buffering every
    /// produced byte into `pending_filtered` (never dropped, regardless of
    /// how much room `out_ring` currently has).
    fn push_through_filter(&mut self, data: &[u8], more: bool) -> Result<(), SerializeError> {
        let mut scratch = vec![0u8; self.config.payload_buffer];
        let mut first = true;
        loop {
            let input: &[u8] = if first { data } else { &[] };
            first = false;
            let result = {
                let filter = self.filter.as_mut().unwrap();
                filter.process(&mut scratch, input, more)?
            };
            if result.out_bytes > 0 {
                self.pending_filtered.extend_from_slice(&scratch[..result.out_bytes]);
            }
            if !result.out_short {
                return Ok(());
            }
        }
    }

    /// Push as much of `pending_filtered` through framing into `out_ring`
    /// as currently fits, leaving any remainder buffered for next time.
    fn drain_pending(&mut self) -> Result<usize, SerializeError> {
        let data = std::mem::take(&mut self.pending_filtered);
        let n = self.frame_and_append(&data)?;
        if n < data.len() {
            self.pending_filtered = data[n..].to_vec();
        }
        Ok(n)
    }

    /// Apply chunked/size/to_eof framing to already-compressed `data` and
    /// append it to `out_ring`, truncating to what currently fits.
    fn frame_and_append(&mut self, data: &[u8]) -> Result<usize, SerializeError> {
        if data.is_empty() {
            return Ok(0);
        }
        let free = {
            let region = &self.workspace.data()[self.out_addr.clone()];
            self.out_ring.data(region);
            self.out_ring.free()
        };
        // Upper-bound the chunk-size line's length using `free` itself:
        // the real emitted chunk can never exceed `free`, so its hex
        // digit count can never exceed that of `free`.
        let overhead = match self.framing {
            Framing::Chunked => format!("{:x}\r\n", free).len() + 2,
            _ => 0,
        };
        if free <= overhead {
            return Ok(0);
        }
        let room = free - overhead;
        let n = data.len().min(room);
        if n == 0 {
            return Ok(0);
        }

        match self.framing {
            Framing::Size(limit) => {
                let prospective = self.body_emitted + n as u64;
                if prospective > limit {
                    return Err(self.fail(format!(
                        "body exceeds declared Content-Length: {} remaining, {} offered",
                        limit - self.body_emitted, n)));
                }
                self.append_raw(&data[..n]);
                self.body_emitted = prospective;
            }
            Framing::Chunked => {
                let header = format!("{:x}\r\n", n);
                self.append_raw(header.as_bytes());
                self.append_raw(&data[..n]);
                self.append_raw(b"\r\n");
                self.body_emitted += n as u64;
            }
            Framing::ToEof => {
                self.append_raw(&data[..n]);
                self.body_emitted += n as u64;
            }
            Framing::None => {
                return Err(self.fail("write attempted on a bodyless message"));
            }
        }
        Ok(n)
    }

    fn append_raw(&mut self, data: &[u8]) {
        if self.head_response {
            // HEAD responses: count bytes against framing but never emit
            // them, matching the teacher's `FixedBody { is_head: true, .. }`
            // treatment in `base_serializer.rs::write_body`.
            return;
        }
        let region = &mut self.workspace.data_mut()[self.out_addr.clone()];
        let (first, second) = self.out_ring.free_mut(region);
        let n1 = data.len().min(first.len());
        first[..n1].copy_from_slice(&data[..n1]);
        if n1 < data.len() {
            let n2 = data.len() - n1;
            second[..n2].copy_from_slice(&data[n1..]);
        }
        self.out_ring.commit(data.len());
    }

    // -- Stream-mode body input -------------------------------------------------

    /// Currently writable byte count in stream mode, accounting for
    /// chunk-framing overhead (spec.md §4.5 "Buffer layout invariants").
    /// The number of bytes `stream_prepare()` will expose in the *next*
    /// call. The ring's free space can be split across two wrapped
    /// segments; this reports only the first one, since `stream_prepare()`
    /// only ever hands out a single contiguous slice (same one-segment-at-
    /// a-time contract as `Parser::prepare()`). A caller that fills and
    /// commits the full amount and calls again will see the remainder.
    pub fn stream_capacity(&self) -> usize {
        assert!(matches!(self.body_mode, BodyMode::Stream),
            "stream_capacity() called outside stream mode");
        self.in_ring.free_contiguous()
    }

    /// A mutable region the caller writes body bytes into, then confirms
    /// with `stream_commit`.
    pub fn stream_prepare(&mut self) -> &mut [u8] {
        assert!(matches!(self.body_mode, BodyMode::Stream),
            "stream_prepare() called outside stream mode");
        let region = &mut self.workspace.data_mut()[self.in_addr.clone()];
        let (first, _second) = self.in_ring.free_mut(region);
        first
    }

    pub fn stream_commit(&mut self, n: usize) {
        assert!(matches!(self.body_mode, BodyMode::Stream),
            "stream_commit() called outside stream mode");
        self.in_ring.commit(n);
    }

    /// Signal end-of-body: no further `stream_commit` calls will occur.
    /// `prepare()` will continue draining buffered bytes, then (if
    /// chunked) emit the terminal `0\r\n\r\n`, before `is_done()` becomes
    /// true.
    pub fn stream_close(&mut self) {
        assert!(matches!(self.body_mode, BodyMode::Stream),
            "stream_close() called outside stream mode");
        self.stream_closed = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SerializerConfig;

    fn serializer() -> Serializer {
        Serializer::new(SerializerConfig::new().done())
    }

    fn drain(s: &mut Serializer) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match s.prepare() {
                Ok(buf) => {
                    if buf.is_empty() && s.is_done() {
                        break;
                    }
                    let n = buf.len();
                    out.extend_from_slice(buf);
                    s.consume(n);
                }
                Err(SerializeError::NeedData) => break,
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }
        out
    }

    #[test]
    fn request_with_content_length_round_trips() {
        let mut s = serializer();
        let headers = [("Content-Length", "5")];
        let msg = OutboundMessage {
            start_line: StartLine::Request { method: "POST", target: "/", version: Version::Http11 },
            headers: &headers,
            head_response: false,
            close: false,
        };
        s.start_with_buffers(&msg, vec![b"Hello".to_vec()]).unwrap();
        let out = drain(&mut s);
        assert_eq!(out, b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nHello");
        assert!(s.is_done());
    }

    #[test]
    fn expect_100_continue_suspends_once() {
        let mut s = serializer();
        let headers = [("Expect", "100-continue"), ("Content-Length", "5")];
        let msg = OutboundMessage {
            start_line: StartLine::Request { method: "GET", target: "/", version: Version::Http11 },
            headers: &headers,
            head_response: false,
            close: false,
        };
        s.start_with_buffers(&msg, vec![b"12345".to_vec()]).unwrap();

        let header_bytes = b"GET / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n";
        let mut emitted = Vec::new();
        loop {
            let buf = s.prepare().unwrap();
            if buf.is_empty() {
                break;
            }
            let n = buf.len();
            emitted.extend_from_slice(buf);
            s.consume(n);
        }
        assert_eq!(emitted, header_bytes);

        match s.prepare() {
            Err(SerializeError::Expect100Continue) => {}
            other => panic!("expected Expect100Continue, got {:?}", other.map(|b| b.to_vec())),
        }

        let mut body = Vec::new();
        loop {
            match s.prepare() {
                Ok(buf) => {
                    if buf.is_empty() && s.is_done() {
                        break;
                    }
                    let n = buf.len();
                    body.extend_from_slice(buf);
                    s.consume(n);
                }
                Err(e) => panic!("unexpected: {:?}", e),
            }
        }
        assert_eq!(body, b"12345");

        let mut total = header_bytes.to_vec();
        total.extend_from_slice(b"12345");
        assert_eq!(total.len(), header_bytes.len() + 5);
        assert!(s.is_done());
    }

    #[test]
    fn chunked_stream_emission() {
        let mut s = serializer();
        let headers = [("Transfer-Encoding", "chunked")];
        let msg = OutboundMessage {
            start_line: StartLine::Response { version: Version::Http11, status: 200, reason: "OK" },
            headers: &headers,
            head_response: false,
            close: false,
        };
        s.start_stream(&msg).unwrap();

        // Drain the header first.
        loop {
            let buf = s.prepare().unwrap();
            if buf.is_empty() {
                break;
            }
            let n = buf.len();
            s.consume(n);
        }

        let body = vec![b'X'; 2048];
        let mut written = 0;
        while written < body.len() {
            let cap = s.stream_capacity();
            if cap == 0 {
                // Drain what's been framed so far to make room.
                loop {
                    match s.prepare() {
                        Ok(buf) if !buf.is_empty() => { let n = buf.len(); s.consume(n); }
                        _ => break,
                    }
                }
                continue;
            }
            let n = cap.min(body.len() - written);
            s.stream_prepare()[..n].copy_from_slice(&body[written..written + n]);
            s.stream_commit(n);
            written += n;
        }
        s.stream_close();

        let mut frames = Vec::new();
        loop {
            match s.prepare() {
                Ok(buf) => {
                    if buf.is_empty() && s.is_done() {
                        break;
                    }
                    let n = buf.len();
                    frames.extend_from_slice(buf);
                    s.consume(n);
                }
                Err(SerializeError::NeedData) => break,
                Err(e) => panic!("unexpected: {:?}", e),
            }
        }

        let mut expected = format!("{:x}\r\n", 2048).into_bytes();
        expected.extend_from_slice(&body);
        expected.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(frames, expected);
    }

    #[test]
    fn bodyless_response_completes_after_header() {
        let mut s = serializer();
        let msg = OutboundMessage {
            start_line: StartLine::Response { version: Version::Http11, status: 204, reason: "No Content" },
            headers: &[],
            head_response: false,
            close: false,
        };
        s.start(&msg).unwrap();
        let out = drain(&mut s);
        assert_eq!(out, b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(s.is_done());
    }
}
