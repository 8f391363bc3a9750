//! Body capture and codec helpers
//!
//! Captured bodies are stored either as the full decoded payload or as a
//! truncation sentinel plus the true size. Decompression is strictly
//! best-effort: the client already received the original bytes, so any
//! decoder error returns the input unchanged.

use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZlibDecoder};
use serde_json::Value;
use tokio::io::AsyncReadExt;

/// Result of bounding a captured body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedBody {
    pub body: Option<String>,
    pub truncated: bool,
    /// Byte length of the raw payload, even when truncated.
    pub size: i64,
}

/// Bound a raw payload to `max_size` bytes. Oversized payloads are replaced
/// by a sentinel recording the true size; undecodable bytes come back as
/// best-effort UTF-8.
pub fn process_body(raw: &[u8], max_size: i64) -> ProcessedBody {
    let size = raw.len() as i64;
    if size == 0 {
        return ProcessedBody {
            body: None,
            truncated: false,
            size: 0,
        };
    }
    if size > max_size {
        return ProcessedBody {
            body: Some(format!(
                "[Body truncated: {size} exceeds limit of {max_size}]"
            )),
            truncated: true,
            size,
        };
    }
    ProcessedBody {
        body: Some(String::from_utf8_lossy(raw).into_owned()),
        truncated: false,
        size,
    }
}

/// Serialize a parsed object and bound it like [`process_body`].
pub fn process_json_body(value: &Value, max_size: i64) -> ProcessedBody {
    process_body(safe_json_stringify(value).as_bytes(), max_size)
}

/// Decompress a response body per its `Content-Encoding`. Unknown encodings
/// and decoder failures return the original buffer unchanged.
pub async fn decompress(raw: &[u8], content_encoding: Option<&str>) -> Vec<u8> {
    let encoding = content_encoding
        .unwrap_or("")
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let decoded = match encoding.as_str() {
        "gzip" | "x-gzip" => {
            let mut decoder = GzipDecoder::new(raw);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).await.map(|_| out)
        }
        "br" => {
            let mut decoder = BrotliDecoder::new(raw);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).await.map(|_| out)
        }
        "deflate" => {
            let mut decoder = ZlibDecoder::new(raw);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).await.map(|_| out)
        }
        _ => return raw.to_vec(),
    };

    match decoded {
        Ok(out) => out,
        Err(e) => {
            tracing::debug!("decompression failed ({encoding}): {e}");
            raw.to_vec()
        }
    }
}

/// JSON-encode, falling back to `"{}"` on error.
pub fn safe_json_stringify<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// JSON-parse, returning `None` on error.
pub fn safe_json_parse(raw: &[u8]) -> Option<Value> {
    serde_json::from_slice(raw).ok()
}

/// Content types never parsed for AI content.
const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
];

pub fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    essence.starts_with("image/")
        || essence.starts_with("video/")
        || essence.starts_with("audio/")
        || BINARY_CONTENT_TYPES.contains(&essence.as_str())
}
