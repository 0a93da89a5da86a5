//! Stored media descriptors.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StorageBackend;

/// Backend-specific reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageLocation {
    Filesystem { path: PathBuf },
    Object { bucket: String, key: String },
}

impl Display for StorageLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageLocation::Filesystem { path } => write!(f, "{}", path.display()),
            StorageLocation::Object { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// One fully stored artifact.
///
/// `backend` is the backend that actually holds the bytes, which differs from
/// the configured preference when the write fell back to local storage. Reads
/// always go to this backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub key: String,
    pub backend: StorageBackend,
    pub size_bytes: u64,
    pub mime_type: String,
    pub location: StorageLocation,
    pub created_at: DateTime<Utc>,
    /// Set when the preferred backend failed and local storage took the write.
    #[serde(default)]
    pub fell_back: bool,
}
