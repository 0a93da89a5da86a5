//! Tea Diary Storage Library
//!
//! Media storage for the diary bot: the [`Storage`] trait, a local filesystem
//! backend, an S3-compatible object storage backend and the [`StorageRouter`]
//! that picks a primary backend from configuration and falls back to local
//! storage when object storage fails.
//!
//! # Storage key format
//!
//! All backends share one key layout: `{prefix}/{uuid}-{fingerprint}{ext}`,
//! where the fingerprint is the first 16 hex chars of the content SHA-256.
//! Keys must not contain `..`, hidden segments, backslashes or a leading `/`.
//! Key generation and validation live in the `keys` module.

pub mod asset;
pub mod factory;
pub mod keys;
pub mod local;
pub mod retry;
pub mod router;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use asset::{MediaAsset, StorageLocation};
pub use factory::{create_local_storage, create_remote_storage};
pub use local::LocalStorage;
pub use retry::RetryPolicy;
pub use router::{BackendStatus, StorageHealth, StorageRouter};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use teadiary_core::StorageBackend;
pub use traits::{Storage, StorageError, StorageResult};
