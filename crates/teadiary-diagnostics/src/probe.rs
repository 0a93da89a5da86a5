use async_trait::async_trait;
use thiserror::Error;

/// Database probe errors. Messages must not carry connection strings.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("database unreachable: {0}")]
    Unreachable(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl ProbeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Unreachable(_) => "unreachable",
            ProbeError::Query(_) => "query",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStatus {
    /// Database name, or the driver name when the server does not report one.
    pub database: String,
    /// Row count of `tastings`; `None` when the table is missing.
    pub tastings: Option<i64>,
}

/// Reachability check used by the health command.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn check(&self) -> Result<DatabaseStatus, ProbeError>;
}
