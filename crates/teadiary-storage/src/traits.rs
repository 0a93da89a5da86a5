//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::asset::StorageLocation;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Key used by health checks. Never written.
pub const HEALTH_PROBE_KEY: &str = "health/probe";

/// Message shown to chat users whenever storage fails, whatever the cause.
pub const USER_RETRY_MESSAGE: &str = "Could not save the file right now. Please try again later.";

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    NotFound(String),

    /// Network errors, timeouts and 5xx responses. Worth retrying.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Authentication, permission, missing bucket or malformed responses.
    #[error("Storage request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    /// Whether the same request may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    /// Backend faults, as opposed to caller mistakes or a missing object.
    /// Only these trigger the router's local fallback.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StorageError::Transient(_)
                | StorageError::Rejected(_)
                | StorageError::IoError(_)
                | StorageError::TaskFailed(_)
        )
    }

    /// Short, stable label for logs and health output.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::InvalidKey(_) => "invalid_key",
            StorageError::InvalidInput(_) => "invalid_input",
            StorageError::NotFound(_) => "not_found",
            StorageError::Transient(_) => "transient",
            StorageError::Rejected(_) => "rejected",
            StorageError::IoError(_) => "io",
            StorageError::ConfigError(_) => "config",
            StorageError::TaskFailed(_) => "task_failed",
        }
    }

    pub fn user_message(&self) -> &'static str {
        USER_RETRY_MESSAGE
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Both backends (S3-compatible object storage, local filesystem) implement
/// this trait so the router can treat them uniformly. Keys are validated by
/// every backend before any I/O happens.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key` and return where it landed.
    ///
    /// Readers never observe a partially written object: either the previous
    /// state or the complete new content is visible under `key`.
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> StorageResult<StorageLocation>;

    /// Read an object by its key
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Temporary direct-access URL, when the backend supports one.
    async fn presigned_url(&self, key: &str, expires_in: Duration)
        -> StorageResult<Option<String>>;

    /// Cheap reachability check used by the health command.
    async fn check(&self) -> StorageResult<()> {
        self.exists(HEALTH_PROBE_KEY).await.map(|_| ())
    }

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
