//! Concatenated JSON values with no extra framing.

use std::io::{BufReader, Read, Write};

use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer, Value};

use super::{CodecError, ValueReader, ValueWriter};

/// Lazily decodes whitespace-separated JSON values.
///
/// Decoding never reads past the end of an object or array, so a value is
/// returned as soon as its closing bracket arrives.
pub struct JsonStreamReader<R: Read> {
    values: StreamDeserializer<'static, IoRead<BufReader<R>>, Value>,
}

impl<R: Read> JsonStreamReader<R> {
    /// Wraps `read` in a buffered streaming decoder.
    pub fn new(read: R) -> Self {
        Self {
            values: Deserializer::from_reader(BufReader::new(read)).into_iter(),
        }
    }
}

impl<R: Read + Send> ValueReader for JsonStreamReader<R> {
    fn next_value(&mut self) -> Result<Option<Value>, CodecError> {
        self.values.next().transpose().map_err(CodecError::from)
    }
}

/// Writes each value as compact JSON followed by a newline.
pub struct JsonStreamWriter<W: Write> {
    write: W,
}

impl<W: Write> JsonStreamWriter<W> {
    /// Wraps `write`.
    pub fn new(write: W) -> Self {
        Self { write }
    }
}

impl<W: Write + Send> ValueWriter for JsonStreamWriter<W> {
    fn write_value(&mut self, value: &Value) -> Result<(), CodecError> {
        let mut frame = serde_json::to_vec(value)?;
        frame.push(b'\n');
        self.write.write_all(&frame)?;
        self.write.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn reader(input: &str) -> JsonStreamReader<Cursor<Vec<u8>>> {
        JsonStreamReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[rstest]
    fn decodes_back_to_back_objects_without_separators() {
        let mut values = reader(r#"{"id":1}{"id":2} [3]"#);

        assert_eq!(values.next_value().expect("first"), Some(json!({"id": 1})));
        assert_eq!(values.next_value().expect("second"), Some(json!({"id": 2})));
        assert_eq!(values.next_value().expect("third"), Some(json!([3])));
        assert_eq!(values.next_value().expect("end"), None);
    }

    #[rstest]
    #[case::empty("")]
    #[case::whitespace(" \n\t ")]
    fn clean_end_of_stream_yields_none(#[case] input: &str) {
        assert_eq!(reader(input).next_value().expect("clean end"), None);
    }

    #[rstest]
    fn truncated_value_is_a_disconnect() {
        let error = reader(r#"{"id":"#).next_value().expect_err("truncated");
        assert!(error.is_disconnect());
    }

    #[rstest]
    fn malformed_value_is_not_a_disconnect() {
        let error = reader("{]").next_value().expect_err("malformed");
        assert!(matches!(error, CodecError::Json(_)));
        assert!(!error.is_disconnect());
    }

    #[rstest]
    fn writer_emits_one_line_per_value() {
        let mut writer = JsonStreamWriter::new(Vec::new());
        writer.write_value(&json!({"a": 1})).expect("first");
        writer.write_value(&json!("b")).expect("second");

        assert_eq!(String::from_utf8(writer.write).expect("utf8"), "{\"a\":1}\n\"b\"\n");
    }
}
