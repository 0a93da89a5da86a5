//! `DatabaseProbe` backed by an sqlx `Any` pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use teadiary_core::{redact_dsn, DatabaseSettings};
use teadiary_diagnostics::{DatabaseProbe, DatabaseStatus, ProbeError};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqlProbe {
    pool: Result<AnyPool, String>,
    driver: String,
}

impl SqlProbe {
    /// Prepare a lazy single-connection pool. Nothing is opened until the
    /// first check, so a bad DSN only shows up as a failed health line.
    pub fn new(settings: &DatabaseSettings) -> Self {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(settings.dsn())
            .map_err(|e| redact_dsn(&e.to_string()));

        SqlProbe {
            pool,
            driver: settings.driver().to_string(),
        }
    }

    fn is_postgres(&self) -> bool {
        self.driver.starts_with("postgres")
    }
}

#[async_trait]
impl DatabaseProbe for SqlProbe {
    async fn check(&self) -> Result<DatabaseStatus, ProbeError> {
        let pool = self
            .pool
            .as_ref()
            .map_err(|e| ProbeError::Unreachable(e.clone()))?;

        sqlx::query("select 1")
            .execute(pool)
            .await
            .map_err(|e| ProbeError::Unreachable(redact_dsn(&e.to_string())))?;

        let database = if self.is_postgres() {
            sqlx::query_scalar::<_, String>("select current_database()::text")
                .fetch_one(pool)
                .await
                .map_err(|e| ProbeError::Query(redact_dsn(&e.to_string())))?
        } else {
            self.driver.clone()
        };

        let tastings = match sqlx::query_scalar::<_, i64>("select count(*) from tastings")
            .fetch_one(pool)
            .await
        {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::debug!(error = %redact_dsn(&e.to_string()), "Could not count tastings");
                None
            }
        };

        Ok(DatabaseStatus { database, tastings })
    }
}
