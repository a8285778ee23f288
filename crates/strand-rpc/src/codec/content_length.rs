//! `Content-Length` header framing, as used by the Language Server Protocol.
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};

use serde_json::Value;

use super::{CodecError, ValueReader, ValueWriter};

/// Largest payload a [`ContentLengthReader`] accepts by default: 64 MiB.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Reads header-framed JSON payloads.
pub struct ContentLengthReader<R: Read> {
    read: BufReader<R>,
    max_frame_length: usize,
}

impl<R: Read> ContentLengthReader<R> {
    /// Wraps `read` in a buffered frame reader limited to
    /// [`MAX_FRAME_LENGTH`].
    pub fn new(read: R) -> Self {
        Self::with_limit(read, MAX_FRAME_LENGTH)
    }

    /// Wraps `read`, rejecting payloads longer than `max_frame_length`.
    pub fn with_limit(read: R, max_frame_length: usize) -> Self {
        Self {
            read: BufReader::new(read),
            max_frame_length,
        }
    }

    /// Reads exactly `length` payload bytes, growing the buffer as they
    /// arrive rather than trusting the header up front.
    fn read_payload(&mut self, length: usize) -> Result<Vec<u8>, CodecError> {
        if length > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                length,
                limit: self.max_frame_length,
            });
        }
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(length)
            .map_err(|_| CodecError::FrameTooLarge {
                length,
                limit: self.max_frame_length,
            })?;
        let limit = u64::try_from(length).unwrap_or(u64::MAX);
        let received = (&mut self.read).take(limit).read_to_end(&mut payload)?;
        if received < length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed while reading frame payload",
            )
            .into());
        }
        Ok(payload)
    }

    /// Reads one header block. `None` means the stream ended before it began.
    fn read_headers(&mut self) -> Result<Option<usize>, CodecError> {
        let mut content_length: Option<usize> = None;
        let mut started = false;
        loop {
            let mut line = String::new();
            if self.read.read_line(&mut line)? == 0 {
                if started {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed while reading frame headers",
                    )
                    .into());
                }
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                if started {
                    break;
                }
                // Blank lines between frames are tolerated.
                continue;
            }
            started = true;

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(CodecError::InvalidHeader {
                    line: trimmed.to_owned(),
                });
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value.trim().parse().map_err(|_| CodecError::InvalidHeader {
                    line: trimmed.to_owned(),
                })?;
                content_length = Some(length);
            }
        }

        content_length
            .map(Some)
            .ok_or(CodecError::MissingContentLength)
    }
}

impl<R: Read + Send> ValueReader for ContentLengthReader<R> {
    fn next_value(&mut self) -> Result<Option<Value>, CodecError> {
        let Some(length) = self.read_headers()? else {
            return Ok(None);
        };
        let payload = self.read_payload(length)?;
        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

/// Writes header-framed JSON payloads.
pub struct ContentLengthWriter<W: Write> {
    write: W,
}

impl<W: Write> ContentLengthWriter<W> {
    /// Wraps `write`.
    pub fn new(write: W) -> Self {
        Self { write }
    }
}

impl<W: Write + Send> ValueWriter for ContentLengthWriter<W> {
    fn write_value(&mut self, value: &Value) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(value)?;
        let mut frame = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        frame.extend_from_slice(&payload);
        self.write.write_all(&frame)?;
        self.write.flush()?;
        Ok(())
    }
}
