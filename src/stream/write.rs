use futures::{Async, Poll};
use tokio_io::AsyncWrite;

use crate::error::SerializeError;
use crate::serializer::{OutboundMessage, Serializer};

/// Wraps `{ stream, serializer }` (spec.md §4.7), exposing the serializer
/// as a generic write-stream / write-sink. The body is always driven
/// through the serializer's stream mode (`start_stream`), since that is
/// the one mode whose input side (`stream_prepare`/`stream_commit`)
/// matches an arbitrary caller-supplied `write_some(buf)` call.
pub struct WriteStream<S> {
    stream: S,
    serializer: Serializer,
    /// A stream-write failure observed after bytes were already committed
    /// to the serializer, held back until the next call so the caller's
    /// "bytes accepted" count stays correct for the call that triggered it
    /// (spec.md §4.7 "Deferred-error rule").
    deferred_error: Option<SerializeError>,
}

impl<S: AsyncWrite> WriteStream<S> {
    pub fn new(stream: S, serializer: Serializer) -> WriteStream<S> {
        WriteStream { stream, serializer, deferred_error: None }
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    pub fn into_inner(self) -> (S, Serializer) {
        (self.stream, self.serializer)
    }

    /// Begin a message whose body will be supplied via `write_some`.
    pub fn start(&mut self, msg: &OutboundMessage) -> Result<(), SerializeError> {
        self.serializer.start_stream(msg)
    }

    fn take_deferred(&mut self) -> Result<(), SerializeError> {
        match self.deferred_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One `serializer.prepare → stream.write_some → serializer.consume`
    /// step. `Ok(Async::Ready(0))` means there was nothing to write right
    /// now (either the serializer is done, or it needs more body input
    /// before it can produce anything else).
    fn pump_once(&mut self) -> Poll<usize, SerializeError> {
        let out = match self.serializer.prepare() {
            Ok(out) => out,
            Err(SerializeError::NeedData) | Err(SerializeError::Expect100Continue) => {
                return Ok(Async::Ready(0));
            }
            Err(e) => return Err(e),
        };
        if out.is_empty() {
            return Ok(Async::Ready(0));
        }
        match self.stream.poll_write(out) {
            Ok(Async::Ready(n)) => {
                self.serializer.consume(n);
                Ok(Async::Ready(n))
            }
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort drain attempted right after committing caller bytes:
    /// any failure here is deferred rather than propagated, since the
    /// caller has already been told those bytes were accepted.
    fn drain_best_effort(&mut self) {
        if let Err(e) = self.pump_once() {
            self.deferred_error = Some(e);
        }
    }

    /// `write_some(const_buffers) → (ec, n)` (spec.md §4.7).
    pub fn write_some(&mut self, buf: &[u8]) -> Poll<usize, SerializeError> {
        self.take_deferred()?;
        if buf.is_empty() {
            self.drain_best_effort();
            return Ok(Async::Ready(0));
        }
        loop {
            let cap = self.serializer.stream_capacity();
            let n = cap.min(buf.len());
            if n > 0 {
                self.serializer.stream_prepare()[..n].copy_from_slice(&buf[..n]);
                self.serializer.stream_commit(n);
                self.drain_best_effort();
                return Ok(Async::Ready(n));
            }
            // No room to accept anything yet: nothing has been committed,
            // so this drain's errors/suspension propagate directly.
            match self.pump_once()? {
                Async::Ready(_) => continue,
                Async::NotReady => return Ok(Async::NotReady),
            }
        }
    }

    /// `close() / write_eof()` (spec.md §4.7): signal end of body and
    /// drain everything, including chunked framing's terminal sequence.
    pub fn close(&mut self) -> Poll<(), SerializeError> {
        self.take_deferred()?;
        self.serializer.stream_close();
        while !self.serializer.is_done() {
            match self.pump_once()? {
                Async::Ready(_) => continue,
                Async::NotReady => return Ok(Async::NotReady),
            }
        }
        Ok(Async::Ready(()))
    }
}

#[cfg(test)]
mod test {
    use crate::config::SerializerConfig;
    use crate::serializer::{Serializer, StartLine};
    use crate::stream::test_support::RecordingWriter;
    use crate::version::Version;

    use super::*;

    fn write_stream() -> WriteStream<RecordingWriter> {
        let serializer = Serializer::new(SerializerConfig::new().done());
        WriteStream::new(RecordingWriter::default(), serializer)
    }

    #[test]
    fn write_some_then_close_emits_chunked_body_across_many_small_writes() {
        let mut ws = write_stream();
        let headers = [("Transfer-Encoding", "chunked")];
        let msg = OutboundMessage {
            start_line: StartLine::Response { version: Version::Http11, status: 200, reason: "OK" },
            headers: &headers,
            head_response: false,
            close: false,
        };
        ws.start(&msg).unwrap();

        // A body larger than a single ring-buffer segment, fed in small
        // pieces, to exercise the stream_capacity/stream_prepare contract
        // across several commits.
        let body = vec![b'Y'; 4096];
        let mut written = 0;
        while written < body.len() {
            let n = 7.min(body.len() - written);
            match ws.write_some(&body[written..written + n]).unwrap() {
                Async::Ready(accepted) => written += accepted,
                Async::NotReady => panic!("RecordingWriter never returns NotReady"),
            }
        }
        match ws.close().unwrap() {
            Async::Ready(()) => {}
            Async::NotReady => panic!("RecordingWriter never returns NotReady"),
        }

        let (stream, _) = ws.into_inner();
        let out = String::from_utf8_lossy(&stream.written);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Transfer-Encoding: chunked\r\n"));
        assert!(out.ends_with("0\r\n\r\n"));
        let body_start = out.find("\r\n\r\n").unwrap() + 4;
        let total_ys: usize = out[body_start..].matches('Y').count();
        assert_eq!(total_ys, 4096);
    }

    #[test]
    fn write_some_on_empty_buffer_only_drains() {
        let mut ws = write_stream();
        let msg = OutboundMessage {
            start_line: StartLine::Response { version: Version::Http11, status: 204, reason: "No Content" },
            headers: &[],
            head_response: false,
            close: false,
        };
        ws.start(&msg).unwrap();
        assert_eq!(ws.write_some(&[]).unwrap(), Async::Ready(0));
    }
}
