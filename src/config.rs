//! Parser and serializer configuration (spec.md §6 "Configuration structs").
//!
//! Plain structs with a builder, the way the teacher's `server::Config`
//! (`src/server/mod.rs`) is built: defaults live on `Default`, individual
//! knobs are set through `with_*` methods that return `Self` for chaining,
//! and the whole thing is meant to be wrapped in an `Arc` and shared across
//! every `Parser`/`Serializer` built from it.

use std::sync::Arc;

/// Configuration governing one `Parser`'s behavior across every message it
/// handles. Shared (via `Arc`) rather than copied per instance, matching
/// the teacher's `Arc<Config>` convention for long-lived per-connection
/// settings.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Total size of the `Workspace` the parser allocates once, up front.
    pub workspace_size: usize,
    /// Max decoded body bytes per message, unless overridden by
    /// `Parser::set_body_limit` for the current message.
    pub body_limit: u64,
    /// Hard cap on header-section bytes; exceeding raises `HeaderTooLarge`.
    pub headers_max_size: usize,
    /// Floor for ring-buffer sizing within the Workspace.
    pub min_buffer: usize,
    /// Cap on a single `prepare()` return, bounding per-iteration I/O.
    pub max_prepare: usize,
    /// Space reserved for sink type-erasure (unused in the in-place-only
    /// delivery path, charged regardless so switching modes never resizes
    /// the Workspace).
    pub max_type_erase: usize,
    /// Maximum header fields indexed (back-allocation sizing).
    pub max_fields: usize,
    pub apply_gzip_decoder: bool,
    pub apply_deflate_decoder: bool,
    pub apply_brotli_decoder: bool,
}

impl Default for ParserConfig {
    fn default() -> ParserConfig {
        ParserConfig {
            workspace_size: 64 * 1024,
            body_limit: 10 * 1024 * 1024,
            headers_max_size: 16 * 1024,
            min_buffer: 8 * 1024,
            max_prepare: 64 * 1024,
            max_type_erase: 256,
            max_fields: 128,
            apply_gzip_decoder: true,
            apply_deflate_decoder: true,
            apply_brotli_decoder: true,
        }
    }
}

impl ParserConfig {
    pub fn new() -> ParserConfig {
        ParserConfig::default()
    }

    pub fn workspace_size(mut self, n: usize) -> Self {
        self.workspace_size = n;
        self
    }

    pub fn body_limit(mut self, n: u64) -> Self {
        self.body_limit = n;
        self
    }

    pub fn headers_max_size(mut self, n: usize) -> Self {
        self.headers_max_size = n;
        self
    }

    pub fn min_buffer(mut self, n: usize) -> Self {
        self.min_buffer = n;
        self
    }

    pub fn max_prepare(mut self, n: usize) -> Self {
        self.max_prepare = n;
        self
    }

    pub fn max_fields(mut self, n: usize) -> Self {
        self.max_fields = n;
        self
    }

    pub fn apply_gzip_decoder(mut self, v: bool) -> Self {
        self.apply_gzip_decoder = v;
        self
    }

    pub fn apply_deflate_decoder(mut self, v: bool) -> Self {
        self.apply_deflate_decoder = v;
        self
    }

    pub fn apply_brotli_decoder(mut self, v: bool) -> Self {
        self.apply_brotli_decoder = v;
        self
    }

    pub fn done(self) -> Arc<ParserConfig> {
        Arc::new(self)
    }
}

/// Configuration governing one `Serializer`'s behavior across every message
/// it emits.
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub workspace_size: usize,
    /// Minimum stream capacity reported by `stream_capacity()` in stream
    /// mode.
    pub payload_buffer: usize,
    pub apply_gzip_encoder: bool,
    pub apply_deflate_encoder: bool,
    pub apply_brotli_encoder: bool,
    pub zlib_comp_level: u32,
    pub brotli_comp_quality: u32,
    pub brotli_comp_window: u32,
}

impl Default for SerializerConfig {
    fn default() -> SerializerConfig {
        SerializerConfig {
            workspace_size: 64 * 1024,
            payload_buffer: 8 * 1024,
            apply_gzip_encoder: false,
            apply_deflate_encoder: false,
            apply_brotli_encoder: false,
            zlib_comp_level: 6,
            brotli_comp_quality: 5,
            brotli_comp_window: 22,
        }
    }
}

impl SerializerConfig {
    pub fn new() -> SerializerConfig {
        SerializerConfig::default()
    }

    pub fn workspace_size(mut self, n: usize) -> Self {
        self.workspace_size = n;
        self
    }

    pub fn payload_buffer(mut self, n: usize) -> Self {
        self.payload_buffer = n;
        self
    }

    pub fn apply_gzip_encoder(mut self, v: bool) -> Self {
        self.apply_gzip_encoder = v;
        self
    }

    pub fn apply_deflate_encoder(mut self, v: bool) -> Self {
        self.apply_deflate_encoder = v;
        self
    }

    pub fn apply_brotli_encoder(mut self, v: bool) -> Self {
        self.apply_brotli_encoder = v;
        self
    }

    pub fn zlib_comp_level(mut self, n: u32) -> Self {
        self.zlib_comp_level = n;
        self
    }

    pub fn brotli_comp_quality(mut self, n: u32) -> Self {
        self.brotli_comp_quality = n;
        self
    }

    pub fn brotli_comp_window(mut self, n: u32) -> Self {
        self.brotli_comp_window = n;
        self
    }

    pub fn done(self) -> Arc<SerializerConfig> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = ParserConfig::new().body_limit(1024).headers_max_size(512).done();
        assert_eq!(cfg.body_limit, 1024);
        assert_eq!(cfg.headers_max_size, 512);
        assert_eq!(cfg.min_buffer, ParserConfig::default().min_buffer);
    }
}
