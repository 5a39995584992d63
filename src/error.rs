//! Error taxonomy for the parser, the serializer and the stream adapters.
//!
//! The parser and the serializer each have their own error enum instead of
//! sharing one: the sets of things that can go wrong on the read side and
//! the write side barely overlap, and keeping them separate means a caller
//! matching on `ParseError` never has to think about serializer-only
//! variants like `NeedData`.

use std::fmt;
use std::io;

/// Errors surfaced while decoding header bytes into the field index.
///
/// These are always unrecoverable: once one is returned, the stream
/// requires `reset()` before any further use.
quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        /// A bare CR or LF appeared where the ABNF requires CRLF.
        BareCrOrLf {
            description("bare CR or LF in header section")
        }
        /// `field-name` contained an octet outside the `token` grammar.
        InvalidFieldName {
            description("invalid character in header field name")
        }
        /// `field-value` contained an octet outside the allowed set
        /// (outside obs-fold continuation lines).
        InvalidFieldValue {
            description("invalid character in header field value")
        }
        /// The start-line did not match `method SP target SP version` or
        /// `version SP status SP reason`.
        InvalidStartLine {
            description("malformed request-line or status-line")
        }
        /// `Content-Length` appeared more than once with differing values,
        /// or a single value was not a valid non-negative integer.
        InvalidContentLength {
            description("duplicate or malformed Content-Length")
        }
        /// The header section exceeded `ParserConfig::headers_max_size`.
        HeaderTooLarge {
            description("header section exceeds configured maximum size")
        }
        /// More header fields than the parser is configured to index.
        TooManyFields {
            description("too many header fields")
        }
    }
}

/// Errors surfaced while framing or decoding the message body.
quick_error! {
    #[derive(Debug)]
    pub enum PayloadError {
        /// A chunk-size line was not valid hex, optionally followed by
        /// `;` chunk-extensions, terminated by CRLF.
        InvalidChunkSize {
            description("invalid chunked transfer-encoding chunk size")
        }
        /// A chunk body was not followed by the required CRLF.
        InvalidChunkTerminator {
            description("chunk data not followed by CRLF")
        }
        /// Trailer section after the terminal `0\r\n` chunk was malformed.
        InvalidTrailer {
            description("malformed chunked trailer section")
        }
    }
}

/// An error surfaced by an installed compressor/decompressor filter.
///
/// See [`crate::filter::Filter`].
#[derive(Debug)]
pub struct CodecError {
    pub(crate) message: String,
}

impl CodecError {
    pub fn new<S: Into<String>>(message: S) -> CodecError {
        CodecError { message: message.into() }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "codec error: {}", self.message)
    }
}

/// Every error the parser can report from `Parser::parse`.
quick_error! {
    #[derive(Debug)]
    pub enum ParseError {
        /// Not an error: the caller must supply more input via
        /// `prepare()`/`commit()` before calling `parse()` again. Does not
        /// change parser state and is not terminal.
        NeedMoreInput {
            description("need more input")
        }
        /// The stream closed cleanly before any bytes of a new message
        /// arrived. Terminal; call `reset()` to reuse the parser.
        EndOfStream {
            description("end of stream")
        }
        /// The stream closed in the middle of a message. Terminal.
        Incomplete {
            description("unexpected end of stream mid-message")
        }
        /// Syntactic error in the header section. Terminal; the header
        /// parsed so far (if any) remains accessible via the metadata that
        /// had already been finalized.
        BadHeader(err: HeaderError) {
            description("malformed header")
            display("malformed header: {}", err)
            from()
        }
        /// Chunked-encoding or other framing error. Terminal, but the
        /// header view and metadata remain valid (the header was already
        /// parsed before the body framing error occurred).
        BadPayload(err: PayloadError) {
            description("malformed payload framing")
            display("malformed payload framing: {}", err)
            from()
        }
        /// Declared or running decoded body length exceeded the configured
        /// or per-message body limit. Terminal.
        BodyTooLarge {
            description("body exceeds configured limit")
        }
        /// The in-place ring buffer filled up with no attached sink able to
        /// drain it. Terminal.
        InPlaceOverflow {
            description("body ring buffer full with no consumer")
        }
        /// The configured `ParserConfig::workspace_size` is too small to
        /// hold the header buffer, decoded-body ring, and trailer scratch
        /// region this configuration calls for. Surfaced from `start()`.
        WorkspaceTooSmall {
            description("workspace too small for configured buffer sizes")
        }
        /// Transparent pass-through from an installed decompression filter.
        Codec(err: CodecError) {
            description("codec error")
            display("{}", err)
            from()
        }
        /// Failure reading from the underlying stream, surfaced by an
        /// adapter (see `stream::read::ReadStream`).
        Io(err: io::Error) {
            description("i/o error")
            display("i/o error: {}", err)
            from()
        }
    }
}

impl ParseError {
    /// True for the one recoverable code; everything else is terminal and
    /// requires `reset()` before the instance can be reused.
    pub fn is_recoverable(&self) -> bool {
        matches!(*self, ParseError::NeedMoreInput)
    }
}

/// Every error the serializer can report from `Serializer::prepare`.
quick_error! {
    #[derive(Debug)]
    pub enum SerializeError {
        /// Not an error: stream mode is waiting for the caller to push more
        /// body bytes via `stream_commit()` or to call `stream_close()`.
        NeedData {
            description("waiting for more body data")
        }
        /// Not an error: the header (including a 100-continue status line)
        /// has been emitted; the next `prepare()` call proceeds to the
        /// body.
        Expect100Continue {
            description("awaiting request body after 100-continue")
        }
        /// Transparent pass-through from an installed compression filter.
        Codec(err: CodecError) {
            description("codec error")
            display("{}", err)
            from()
        }
        /// The composed header section (start-line + fields) did not fit
        /// in `SerializerConfig::workspace_size`. Surfaced from `start()`/
        /// `start_stream()`.
        HeaderTooLarge {
            description("composed header exceeds configured workspace size")
        }
        /// The attached body source, or the underlying stream write,
        /// failed. Puts the serializer into the faulted state.
        Io(err: io::Error) {
            description("i/o error")
            display("i/o error: {}", err)
            from()
        }
    }
}

impl SerializeError {
    /// True for the two recoverable codes.
    pub fn is_recoverable(&self) -> bool {
        matches!(*self,
            SerializeError::NeedData | SerializeError::Expect100Continue)
    }
}
