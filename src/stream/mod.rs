//! Thin adapters binding the parser and the serializer to a generic
//! asynchronous byte stream (spec.md §4.6, §4.7).
//!
//! Grounded on the teacher's `client/parser.rs` (`Parser: Future`, driving
//! `io.read()`/`codec.data_received()` in a `poll`-style loop until
//! `Async::NotReady`) and `server/response_writer.rs` (`ResponseWriter`
//! wrapping `MessageState` plus an `IoBuf<S>`), but built directly against
//! `tokio_io::{AsyncRead, AsyncWrite}` instead of `tk_bufstream::IoBuf` —
//! this crate's `Workspace`-backed rings already do what `IoBuf`/`netbuf`
//! did for the teacher, so there is nothing left for a buffering wrapper
//! to add.

mod read;
mod write;

pub use self::read::ReadStream;
pub use self::write::WriteStream;

/// Minimal `AsyncRead`/`AsyncWrite` test doubles shared by `read`'s and
/// `write`'s unit tests, in place of the teacher's `tk_bufstream::MockData`
/// (not a dependency of this crate).
#[cfg(test)]
mod test_support {
    use std::io::{self, Read, Write};

    use futures::{Async, Poll};
    use tokio_io::{AsyncRead, AsyncWrite};

    /// Feeds fixed-size chunks of a byte vector to the reader, so tests can
    /// exercise a parser/reader loop spanning more than one `poll_read`.
    pub struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        pub fn new(data: Vec<u8>, chunk: usize) -> ChunkedReader {
            ChunkedReader { data, pos: 0, chunk }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(buf.len()).min(self.chunk);
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl AsyncRead for ChunkedReader {}

    /// Captures everything written to it.
    #[derive(Default)]
    pub struct RecordingWriter {
        pub written: Vec<u8>,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsyncRead for RecordingWriter {}

    impl AsyncWrite for RecordingWriter {
        fn shutdown(&mut self) -> Poll<(), io::Error> {
            Ok(Async::Ready(()))
        }
    }
}
