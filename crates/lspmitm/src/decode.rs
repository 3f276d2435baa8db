//! Frame payload decoding: charset resolution, transcoding to UTF-8, and
//! JSON parsing.

use serde_json::Value;
use thiserror::Error;

use crate::frame::{Frame, Header};
use crate::header_value::ContentType;

/// A frame payload parsed as a JSON document.
#[derive(Debug, Clone)]
pub struct Message {
    /// Inherited from the originating frame.
    pub timestamp_ms: i64,
    /// Size of the originating frame in bytes, headers included.
    pub size: usize,
    pub contents: Value,
}

/// Why a frame payload could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown character encoding `{label}`")]
    UnknownEncoding { label: String },
    #[error("payload is not valid under the declared `{label}` encoding")]
    InvalidBytes { label: String },
    #[error("payload is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON root must be an object or array")]
    NonContainerRoot,
}

/// Resolves the declared payload encoding from the frame headers.
///
/// The first `Content-Type` header whose value parses decides; an
/// unparseable value falls back to the UTF-8 default, and a parsed value
/// without a `charset` parameter lets later `Content-Type` headers speak.
fn declared_encoding(headers: &[Header]) -> Option<String> {
    for header in headers {
        if !header.is("Content-Type") {
            continue;
        }
        let Ok(content_type) = ContentType::parse(&header.value) else {
            break;
        };
        if let Some(charset) = content_type.charset() {
            return Some(charset.to_string());
        }
    }
    None
}

/// Decodes a frame payload into a [`Message`].
///
/// The payload is interpreted under the charset declared by `Content-Type`
/// (UTF-8 when absent or unparseable), normalised to UTF-8, and parsed as
/// JSON. Per the JSON-RPC 2.0 grammar the root must be an object or array.
pub fn decode_frame(frame: &Frame) -> Result<Message, DecodeError> {
    let label = declared_encoding(&frame.headers).unwrap_or_else(|| "UTF-8".to_string());

    let text: std::borrow::Cow<'_, str> = if label.eq_ignore_ascii_case("utf-8") {
        std::str::from_utf8(&frame.payload)
            .map_err(|_| DecodeError::InvalidBytes {
                label: label.clone(),
            })?
            .into()
    } else {
        let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) else {
            return Err(DecodeError::UnknownEncoding { label });
        };
        let (decoded, _, had_errors) = encoding.decode(&frame.payload);
        if had_errors {
            return Err(DecodeError::InvalidBytes { label });
        }
        decoded
    };

    let contents: Value =
        serde_json::from_str(&text).map_err(|source| DecodeError::Json { source })?;

    if !contents.is_object() && !contents.is_array() {
        return Err(DecodeError::NonContainerRoot);
    }

    Ok(Message {
        timestamp_ms: frame.timestamp_ms,
        size: frame.size(),
        contents,
    })
}
