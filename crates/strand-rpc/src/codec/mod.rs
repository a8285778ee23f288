//! Framing of JSON values over byte streams.
//!
//! Two framings are supported, selected by [`WireFraming`]: a bare stream of
//! concatenated JSON values, and LSP-style `Content-Length` headers. Readers
//! yield `Ok(None)` on a clean end of stream so read loops can finish
//! without treating a closed peer as an error.

mod content_length;
mod error;
mod json_stream;

use std::io::{Read, Write};

use serde_json::Value;
use strand_config::WireFraming;

pub use self::content_length::{ContentLengthReader, ContentLengthWriter, MAX_FRAME_LENGTH};
pub use self::error::CodecError;
pub use self::json_stream::{JsonStreamReader, JsonStreamWriter};

/// Decodes successive JSON values from a byte stream.
pub trait ValueReader: Send {
    /// Blocks until the next complete value has been decoded.
    ///
    /// Returns `Ok(None)` once the stream ends between values.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for malformed frames, invalid JSON, or IO
    /// failures, including a stream that ends inside a value.
    fn next_value(&mut self) -> Result<Option<Value>, CodecError>;
}

/// Encodes JSON values onto a byte stream.
pub trait ValueWriter: Send {
    /// Writes one complete frame and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when serialisation or the write fails.
    fn write_value(&mut self, value: &Value) -> Result<(), CodecError>;
}

/// Builds the reader for `framing` over `read`.
#[must_use]
pub fn value_reader<R>(read: R, framing: WireFraming) -> Box<dyn ValueReader>
where
    R: Read + Send + 'static,
{
    match framing {
        WireFraming::JsonStream => Box::new(JsonStreamReader::new(read)),
        WireFraming::ContentLength => Box::new(ContentLengthReader::new(read)),
    }
}

/// Builds the writer for `framing` over `write`.
#[must_use]
pub fn value_writer<W>(write: W, framing: WireFraming) -> Box<dyn ValueWriter>
where
    W: Write + Send + 'static,
{
    match framing {
        WireFraming::JsonStream => Box::new(JsonStreamWriter::new(write)),
        WireFraming::ContentLength => Box::new(ContentLengthWriter::new(write)),
    }
}
