//! Streaming transformation filter (spec.md §4.3).
//!
//! A `Filter` pulls bytes from an input slice and pushes transformed bytes
//! into an output slice, exactly like the Boost.Http zlib/brotli service
//! interfaces this is grounded on (`original_source/include/boost/http/
//! zlib/inflate.hpp`, `.../brotli/{decode,encode}.hpp`), but expressed as
//! an owned safe Rust value instead of an `init`/`process`/`destroy` C
//! service triple.
//!
//! Each concrete filter is built on the ecosystem crate the ambient stack
//! for Content-Encoding naturally reaches for: `flate2` for gzip/deflate,
//! `brotli` for br. Both crates expose a `std::io::Write`-based streaming
//! API rather than flate2's lower-level `Decompress`/`Compress` process
//! loop for gzip (the low-level API only speaks raw/zlib-wrapped deflate,
//! not the gzip container), so every filter here buffers transformed
//! bytes into a small internal `Vec<u8>` and drains it into the caller's
//! `out` slice — the `Workspace` still owns the slot this `Vec` reuses the
//! capacity of across a message; it never reallocates in steady state
//! once warmed up past the first message's high-water mark.

use std::io::Write;

use crate::error::CodecError;
use crate::headers::Coding;

/// Outcome of one `Filter::process` call.
#[derive(Debug, Clone, Copy)]
pub struct FilterResult {
    /// Bytes consumed from `input`.
    pub in_bytes: usize,
    /// Bytes written to `out`.
    pub out_bytes: usize,
    /// The filter will produce no further output.
    pub finished: bool,
    /// `out` could not accept the filter's desired minimum output chunk;
    /// the caller should drain `out` and call `process` again.
    pub out_short: bool,
}

/// A streaming compressor or decompressor installed by the parser
/// (decompression, per Content-Encoding) or the serializer (compression).
pub trait Filter {
    /// Pull bytes from `input`, push transformed bytes into `out`.
    ///
    /// `more == true` means the caller may supply additional input later;
    /// `more == false` means `input` is the final chunk for this message
    /// and the filter should flush/finish.
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool)
        -> Result<FilterResult, CodecError>;
}

/// Construct the decompressor named by a Content-Encoding, if the
/// corresponding service is enabled in the parser's configuration.
pub fn decompressor_for(coding: Coding) -> Option<Box<dyn Filter + Send>> {
    match coding {
        Coding::Gzip => Some(Box::new(GzipDecoder::new())),
        Coding::Deflate => Some(Box::new(ZlibDecoder::new())),
        Coding::Br => Some(Box::new(BrotliDecoder::new())),
        Coding::Identity | Coding::Unsupported => None,
    }
}

fn drain_into(staged: &mut Vec<u8>, out: &mut [u8]) -> (usize, bool) {
    let n = staged.len().min(out.len());
    out[..n].copy_from_slice(&staged[..n]);
    staged.drain(..n);
    (n, !staged.is_empty())
}

/// Content-Encoding: gzip, backed by `flate2::write::GzDecoder`.
pub struct GzipDecoder {
    inner: flate2::write::GzDecoder<Vec<u8>>,
    eof_sent: bool,
}

impl GzipDecoder {
    pub fn new() -> GzipDecoder {
        GzipDecoder { inner: flate2::write::GzDecoder::new(Vec::new()), eof_sent: false }
    }
}

impl Filter for GzipDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool)
        -> Result<FilterResult, CodecError>
    {
        self.inner.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
        if !more && !self.eof_sent {
            self.inner.try_finish().map_err(|e| CodecError::new(e.to_string()))?;
            self.eof_sent = true;
        }
        let (out_bytes, out_short) = drain_into(self.inner.get_mut(), out);
        let finished = self.eof_sent && self.inner.get_ref().is_empty();
        Ok(FilterResult { in_bytes: input.len(), out_bytes, finished, out_short })
    }
}

/// Content-Encoding: deflate. Per RFC 7230/2616 convention almost every
/// implementation in the wild sends a zlib-wrapped deflate stream (not
/// raw deflate) under this name, so this filter uses `ZlibDecoder`.
///
/// `flate2::write::ZlibDecoder` has no window-bits knob on the backend this
/// crate builds against (that control only exists on the `zlib`/`zlib-ng`
/// C-binding backends, not the default pure-Rust one), so there is no
/// `zlib_window_bits` config option to honor here; see DESIGN.md.
pub struct ZlibDecoder {
    inner: flate2::write::ZlibDecoder<Vec<u8>>,
    eof_sent: bool,
}

impl ZlibDecoder {
    pub fn new() -> ZlibDecoder {
        ZlibDecoder { inner: flate2::write::ZlibDecoder::new(Vec::new()), eof_sent: false }
    }
}

impl Filter for ZlibDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool)
        -> Result<FilterResult, CodecError>
    {
        self.inner.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
        if !more && !self.eof_sent {
            self.inner.try_finish().map_err(|e| CodecError::new(e.to_string()))?;
            self.eof_sent = true;
        }
        let (out_bytes, out_short) = drain_into(self.inner.get_mut(), out);
        let finished = self.eof_sent && self.inner.get_ref().is_empty();
        Ok(FilterResult { in_bytes: input.len(), out_bytes, finished, out_short })
    }
}

/// Content-Encoding: br, backed by the `brotli` crate's write-based
/// decompressor.
pub struct BrotliDecoder {
    inner: brotli::DecompressorWriter<Vec<u8>>,
    finished: bool,
}

impl BrotliDecoder {
    pub fn new() -> BrotliDecoder {
        BrotliDecoder {
            inner: brotli::DecompressorWriter::new(Vec::new(), 4096),
            finished: false,
        }
    }
}

impl Filter for BrotliDecoder {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool)
        -> Result<FilterResult, CodecError>
    {
        self.inner.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
        let (out_bytes, out_short) = drain_into(self.inner.get_mut(), out);
        if !more && out_bytes == 0 {
            self.finished = true;
        }
        Ok(FilterResult { in_bytes: input.len(), out_bytes, finished: self.finished, out_short })
    }
}

/// Compressor installed by the serializer, matching one of the
/// `apply_{gzip,deflate,brotli}_encoder` configuration knobs.
pub enum Compressor {
    Gzip(flate2::write::GzEncoder<Vec<u8>>, bool),
    Deflate(flate2::write::ZlibEncoder<Vec<u8>>, bool),
    Brotli(brotli::CompressorWriter<Vec<u8>>, bool),
}

impl Compressor {
    pub fn gzip(level: u32) -> Compressor {
        Compressor::Gzip(
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level)),
            false)
    }

    pub fn deflate(level: u32) -> Compressor {
        Compressor::Deflate(
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level)),
            false)
    }

    pub fn brotli(quality: u32, window: u32) -> Compressor {
        Compressor::Brotli(
            brotli::CompressorWriter::new(Vec::new(), 4096, quality, window),
            false)
    }
}

impl Filter for Compressor {
    fn process(&mut self, out: &mut [u8], input: &[u8], more: bool)
        -> Result<FilterResult, CodecError>
    {
        match self {
            Compressor::Gzip(enc, eof_sent) => {
                enc.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
                if !more && !*eof_sent {
                    enc.try_finish().map_err(|e| CodecError::new(e.to_string()))?;
                    *eof_sent = true;
                }
                let (out_bytes, out_short) = drain_into(enc.get_mut(), out);
                Ok(FilterResult {
                    in_bytes: input.len(), out_bytes, out_short,
                    finished: *eof_sent && enc.get_ref().is_empty(),
                })
            }
            Compressor::Deflate(enc, eof_sent) => {
                enc.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
                if !more && !*eof_sent {
                    enc.try_finish().map_err(|e| CodecError::new(e.to_string()))?;
                    *eof_sent = true;
                }
                let (out_bytes, out_short) = drain_into(enc.get_mut(), out);
                Ok(FilterResult {
                    in_bytes: input.len(), out_bytes, out_short,
                    finished: *eof_sent && enc.get_ref().is_empty(),
                })
            }
            Compressor::Brotli(enc, eof_sent) => {
                enc.write_all(input).map_err(|e| CodecError::new(e.to_string()))?;
                if !more {
                    enc.flush().map_err(|e| CodecError::new(e.to_string()))?;
                    *eof_sent = true;
                }
                let (out_bytes, out_short) = drain_into(enc.get_mut(), out);
                Ok(FilterResult {
                    in_bytes: input.len(), out_bytes, out_short,
                    finished: *eof_sent && enc.get_ref().is_empty(),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let mut enc = Compressor::gzip(6);
        let mut compressed = Vec::new();
        let mut scratch = [0u8; 256];
        // Feed the one input chunk as the final write, then keep calling
        // with empty input to drain the encoder's trailer.
        let mut first = true;
        loop {
            let input: &[u8] = if first { b"hello, world" } else { b"" };
            first = false;
            let r = enc.process(&mut scratch, input, false).unwrap();
            compressed.extend_from_slice(&scratch[..r.out_bytes]);
            if r.finished {
                break;
            }
        }

        let mut dec = GzipDecoder::new();
        let mut out = Vec::new();
        let mut scratch = [0u8; 256];
        loop {
            let r = dec.process(&mut scratch, &compressed, false).unwrap();
            out.extend_from_slice(&scratch[..r.out_bytes]);
            compressed.clear();
            if r.finished {
                break;
            }
        }
        assert_eq!(out, b"hello, world");
    }
}
