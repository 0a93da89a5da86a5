//! Configuration errors
//!
//! Raised once, while the configuration snapshot is resolved at startup. A
//! process that hits one of these must not start serving.

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_ENV has unsupported value '{0}' (expected production or development)")]
    InvalidEnvironment(String),

    #[error("MEDIA_BACKEND has unsupported value '{0}' (expected local or s3)")]
    InvalidMediaBackend(String),

    #[error("{name} must be a valid number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{name} is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        reason: &'static str,
    },
}
