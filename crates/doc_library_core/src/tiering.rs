//! crates/doc_library_core/src/tiering.rs
//!
//! Size estimation and placement rules for document payloads.
//!
//! Small files live inline in the record's `content` field as a `data:` payload;
//! anything above the small-file threshold is decoded and pushed to blob storage,
//! and the record keeps the bucket's public URL instead.

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{CoreError, CoreResult};

const DATA_SCHEME: &str = "data:";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Where a payload ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inline,
    Blob,
}

/// A `data:` payload decoded back into raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// True for a freshly encoded payload, false for a URL or any other reference.
pub fn is_inline_payload(value: &str) -> bool {
    value.starts_with(DATA_SCHEME)
}

/// Approximates the decoded byte length of a base64 payload without decoding it.
///
/// Everything up to the first comma is dropped, then the size is
/// `floor(len * 0.75)` minus the trailing `=` padding.
pub fn estimate_encoded_size(payload: &str) -> u64 {
    if payload.is_empty() {
        return 0;
    }
    let body = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let padding = body.bytes().rev().take_while(|b| *b == b'=').count() as u64;
    (body.len() as u64 * 3 / 4).saturating_sub(padding)
}

/// Rejects payloads above `max_file_size`.
pub fn check_file_size(size: u64, max_file_size: u64) -> CoreResult<()> {
    if size > max_file_size {
        return Err(CoreError::FileTooLarge {
            size,
            limit: max_file_size,
        });
    }
    Ok(())
}

pub fn placement_for(size: u64, small_file_threshold: u64) -> Placement {
    if size > small_file_threshold {
        Placement::Blob
    } else {
        Placement::Inline
    }
}

/// Replaces every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9.\-]").expect("static pattern compiles"));
    unsafe_chars.replace_all(name, "_").into_owned()
}

/// `<unix-ms>_<sanitized-name>`
pub fn storage_path(timestamp_ms: i64, file_name: &str) -> String {
    format!("{}_{}", timestamp_ms, sanitize_file_name(file_name))
}

/// The object path inside the bucket: the last URL segment without its query string.
pub fn blob_path_from_url(url: &str) -> &str {
    let last = url.rsplit('/').next().unwrap_or(url);
    last.split('?').next().unwrap_or(last)
}

/// Decodes `data:<mime>;base64,<body>` into bytes and its MIME type.
pub fn decode_data_url(payload: &str) -> CoreResult<DecodedPayload> {
    let rest = payload
        .strip_prefix(DATA_SCHEME)
        .ok_or_else(|| CoreError::InvalidPayload("missing data: prefix".to_string()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| CoreError::InvalidPayload("missing ',' separator".to_string()))?;
    let media = header
        .strip_suffix(";base64")
        .ok_or_else(|| CoreError::InvalidPayload("payload is not base64 encoded".to_string()))?;

    let content_type = match media.split(';').next() {
        Some(mime) if !mime.is_empty() => mime.to_string(),
        _ => FALLBACK_CONTENT_TYPE.to_string(),
    };
    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| CoreError::InvalidPayload(e.to_string()))?;

    Ok(DecodedPayload {
        content_type,
        bytes,
    })
}
