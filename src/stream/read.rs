use futures::{try_ready, Async, Poll};
use tokio_io::AsyncRead;

use crate::error::ParseError;
use crate::parser::Parser;

/// Copy as much of `a` then `b` as fits into `dest`; returns bytes copied.
fn copy_two(a: &[u8], b: &[u8], dest: &mut [u8]) -> usize {
    let n1 = a.len().min(dest.len());
    dest[..n1].copy_from_slice(&a[..n1]);
    let n2 = b.len().min(dest.len() - n1);
    dest[n1..n1 + n2].copy_from_slice(&b[..n2]);
    n1 + n2
}

/// Wraps `{ stream, parser }` (spec.md §4.6), exposing the parser's
/// decoded body as a generic read-stream.
pub struct ReadStream<S> {
    stream: S,
    parser: Parser,
}

impl<S: AsyncRead> ReadStream<S> {
    pub fn new(stream: S, parser: Parser) -> ReadStream<S> {
        ReadStream { stream, parser }
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    pub fn into_inner(self) -> (S, Parser) {
        (self.stream, self.parser)
    }

    /// One `stream.poll_read` into the parser's input buffer.
    fn fill_some(&mut self) -> Poll<(), ParseError> {
        let n = {
            let buf = self.parser.prepare();
            try_ready!(self.stream.poll_read(buf).map_err(ParseError::from))
        };
        if n == 0 {
            self.parser.commit_eof();
        } else {
            self.parser.commit(n);
        }
        Ok(Async::Ready(()))
    }

    /// Drive header parsing to completion, suspending on I/O as needed
    /// (spec.md §4.6 step 1).
    fn ensure_header(&mut self) -> Poll<(), ParseError> {
        while !self.parser.got_header() {
            match self.parser.parse() {
                Ok(()) => {}
                Err(ParseError::NeedMoreInput) => try_ready!(self.fill_some()),
                Err(e) => return Err(e),
            }
        }
        Ok(Async::Ready(()))
    }

    /// `read_some(mutable_buffer) → (ec, n)` (spec.md §4.6).
    ///
    /// Returns `Ok(Async::Ready(0))` at end of body, matching the
    /// conventional `read_some` "eof" signal.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Poll<usize, ParseError> {
        try_ready!(self.ensure_header());
        loop {
            let copied = {
                let (a, b) = self.parser.pull_body();
                copy_two(a, b, buf)
            };
            if copied > 0 {
                self.parser.consume_body(copied);
                return Ok(Async::Ready(copied));
            }
            if self.parser.is_complete() {
                return Ok(Async::Ready(0));
            }
            match self.parser.parse() {
                Ok(()) => continue,
                Err(ParseError::NeedMoreInput) => try_ready!(self.fill_some()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Lazy body source (spec.md §4.6 second paragraph): fills `bufs` with
    /// up to `max` const-buffer slices into parser-owned memory. Call
    /// `consume` to release them once written elsewhere.
    pub fn pull<'a>(&'a mut self, bufs: &mut [&'a [u8]], max: usize) -> Poll<usize, ParseError> {
        try_ready!(self.ensure_header());
        loop {
            let (a, b) = self.parser.pull_body();
            if !a.is_empty() || !b.is_empty() {
                let mut count = 0;
                if !a.is_empty() && count < bufs.len() && count < max {
                    bufs[count] = a;
                    count += 1;
                }
                if !b.is_empty() && count < bufs.len() && count < max {
                    bufs[count] = b;
                    count += 1;
                }
                return Ok(Async::Ready(count));
            }
            if self.parser.is_complete() {
                return Ok(Async::Ready(0));
            }
            match self.parser.parse() {
                Ok(()) => continue,
                Err(ParseError::NeedMoreInput) => try_ready!(self.fill_some()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Release `n` bytes previously handed out by `pull`.
    pub fn consume(&mut self, n: usize) {
        self.parser.consume_body(n);
    }
}

#[cfg(test)]
mod test {
    use futures::Async;

    use crate::config::ParserConfig;
    use crate::stream::test_support::ChunkedReader;

    use super::*;

    fn read_stream(data: &[u8], chunk: usize) -> ReadStream<ChunkedReader> {
        let reader = ChunkedReader::new(data.to_vec(), chunk);
        let mut parser = Parser::new(ParserConfig::new().done(), false);
        parser.start(false).unwrap();
        ReadStream::new(reader, parser)
    }

    #[test]
    fn read_some_returns_body_split_across_small_reads() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
        let mut rs = read_stream(input, 3);

        let mut body = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match rs.read_some(&mut buf).unwrap() {
                Async::Ready(0) => break,
                Async::Ready(n) => body.extend_from_slice(&buf[..n]),
                Async::NotReady => panic!("ChunkedReader never returns NotReady"),
            }
        }
        assert_eq!(body, b"hello world");
        assert_eq!(rs.parser().header().method(), Some("POST"));
    }

    #[test]
    fn pull_hands_out_body_without_copying_then_consume_releases_it() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhowdy";
        let mut rs = read_stream(input, 1024);

        let mut bufs: [&[u8]; 2] = [&[], &[]];
        let n = rs.pull(&mut bufs, 2).unwrap();
        assert_eq!(n, Async::Ready(1));
        assert_eq!(bufs[0], b"howdy");
        rs.consume(5);

        let n = rs.pull(&mut bufs, 2).unwrap();
        assert_eq!(n, Async::Ready(0));
    }

    #[test]
    fn read_some_reports_eof_for_bodyless_response() {
        let mut parser = Parser::new(ParserConfig::new().done(), true);
        parser.start(false).unwrap();
        let reader = ChunkedReader::new(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec(), 1024);
        let mut rs = ReadStream::new(reader, parser);

        let mut buf = [0u8; 16];
        assert_eq!(rs.read_some(&mut buf).unwrap(), Async::Ready(0));
    }
}
