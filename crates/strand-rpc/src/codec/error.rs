//! Errors raised while framing JSON values.

use std::io;

use thiserror::Error;

/// Failure to read or write a framed JSON value.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying stream failed.
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
    /// The payload was not valid JSON, or ended inside a value.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A frame's header block carried no `Content-Length`.
    #[error("missing Content-Length header")]
    MissingContentLength,
    /// A frame declared a payload longer than the reader accepts.
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Declared payload length.
        length: usize,
        /// Largest accepted payload length.
        limit: usize,
    },
    /// A header line could not be parsed.
    #[error("invalid frame header: {line}")]
    InvalidHeader {
        /// Offending header line, trimmed.
        line: String,
    },
}

impl CodecError {
    /// Returns `true` when the error means the peer went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        let kind = match self {
            Self::Io(error) => error.kind(),
            Self::Json(error) => match error.io_error_kind() {
                Some(kind) => kind,
                None => return error.is_eof(),
            },
            Self::MissingContentLength
            | Self::FrameTooLarge { .. }
            | Self::InvalidHeader { .. } => return false,
        };
        matches!(
            kind,
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::NotConnected
        )
    }
}
