//! A streaming HTTP/1.1 parser and serializer operating over a single
//! caller-supplied memory region (a [`workspace::Workspace`]), with thin
//! adapters ([`stream::ReadStream`], [`stream::WriteStream`]) to a generic
//! asynchronous byte-stream I/O interface.
//!
//! The parser ([`parser::Parser`]) and the serializer ([`serializer::Serializer`])
//! are reused across every message of one connection: `start()`/`reset()`
//! re-derive their internal ring buffers from the same backing allocation
//! instead of growing a new one per message.

#[macro_use(quick_error)] extern crate quick_error;

pub mod chunked;
pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod headers;
pub mod parser;
pub mod ring;
pub mod serializer;
pub mod stream;
pub mod token;
pub mod version;
pub mod workspace;

pub use crate::config::{ParserConfig, SerializerConfig};
pub use crate::error::{ParseError, SerializeError};
pub use crate::headers::{HeaderView, Metadata, PayloadKind};
pub use crate::parser::{Parser, Sink};
pub use crate::serializer::{OutboundMessage, Serializer, StartLine};
pub use crate::stream::{ReadStream, WriteStream};
pub use crate::version::Version;
pub use crate::workspace::Workspace;
