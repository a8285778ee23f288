//! Wire framing selection for JSON-RPC byte streams.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How JSON values are delimited on a connection.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WireFraming {
    /// Back-to-back JSON values, one per line when written by this runtime.
    #[default]
    JsonStream,
    /// `Content-Length` header framing as used by the Language Server Protocol.
    ContentLength,
}

/// Errors encountered while parsing a [`WireFraming`] from text.
pub type WireFramingParseError = strum::ParseError;
