//! Tea Diary Core Library
//!
//! This crate provides the process-wide configuration snapshot, configuration
//! errors, the storage backend discriminator and credential redaction helpers
//! shared by the storage, diagnostics and CLI crates.

pub mod config;
pub mod error;
pub mod redact;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AdminSet, ConfigSnapshot, DatabaseSettings, Environment, S3Settings, Secret};
pub use error::{ConfigError, ConfigResult};
pub use redact::{mask_secrets, redact_dsn};
pub use storage_types::StorageBackend;
