//! Shared key generation and validation for storage backends.
//!
//! Key format: `{prefix}/{uuid}-{fingerprint}{ext}`. The fingerprint is the
//! first 16 hex chars of the content SHA-256; it is kept for future
//! deduplication and does not make keys content-addressed on its own, the
//! random part keeps every store call unique.
//!
//! Segments starting with `.` are reserved for in-flight temporary files of
//! the local backend and are rejected in caller-supplied keys.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Prefix used when the caller does not group its media.
pub const DEFAULT_PREFIX: &str = "media";

const MAX_KEY_LEN: usize = 1024;
const FINGERPRINT_LEN: usize = 16;

/// Generate a fresh storage key for `data` under `prefix`.
pub fn generate_storage_key(prefix: &str, data: &[u8], content_type: &str) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!(
        "{}/{}-{}{}",
        prefix.trim_matches('/'),
        Uuid::new_v4().simple(),
        &digest[..FINGERPRINT_LEN],
        extension_for(content_type)
    )
}

/// File extension for a MIME type, `.bin` when unknown.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        "image/heic" => ".heic",
        "video/mp4" => ".mp4",
        "audio/ogg" => ".ogg",
        "text/plain" => ".txt",
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        _ => ".bin",
    }
}

/// Reject keys that could escape a backend root or collide with temp files.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::InvalidKey(format!(
            "Storage key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.starts_with('/') || key.contains('\\') || key.chars().any(char::is_control) {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "Storage key has an invalid segment: {:?}",
                segment
            )));
        }
    }
    Ok(())
}

/// Same rules as keys; prefixes group keys into directories.
pub fn validate_prefix(prefix: &str) -> StorageResult<()> {
    validate_key(prefix.trim_end_matches('/'))
}

/// MIME types must look like `type/subtype`. Parameters are allowed.
pub fn validate_content_type(content_type: &str) -> StorageResult<()> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, sub))
            if !kind.is_empty()
                && !sub.is_empty()
                && !essence.chars().any(|c| c.is_whitespace() || c.is_control()) =>
        {
            Ok(())
        }
        _ => Err(StorageError::InvalidInput(format!(
            "Invalid MIME type: {:?}",
            content_type
        ))),
    }
}
