//! Configuration module
//!
//! The process-wide configuration is resolved exactly once at startup into an
//! immutable [`ConfigSnapshot`]. Components receive it by reference (usually an
//! `Arc<ConfigSnapshot>`) and never read environment variables themselves.

use std::collections::BTreeSet;
use std::env;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::redact::{dsn_password, mask_secrets, redact_dsn};
use crate::storage_types::StorageBackend;

const DEFAULT_MEDIA_DIR: &str = "/app/media";
const DEFAULT_SQLITE_DSN: &str = "sqlite:///app/tastings.db";
const DEFAULT_TIMEZONE: &str = "Europe/Amsterdam";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_SSLMODE: &str = "disable";
const S3_MAX_ATTEMPTS: u32 = 3;
const S3_TIMEOUT_SECS: u64 = 20;

/// A string that must never show up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Secret(***)")
    }
}

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Parse `APP_ENV`. A missing value means production so that a bare
    /// deployment starts fail-closed.
    pub fn parse(raw: Option<&str>) -> ConfigResult<Self> {
        match raw.map(|s| s.trim().to_lowercase()) {
            None => Ok(Environment::Production),
            Some(value) => match value.as_str() {
                "" | "production" | "prod" => Ok(Environment::Production),
                "development" | "dev" | "local" | "test" => Ok(Environment::Development),
                _ => Err(ConfigError::InvalidEnvironment(value)),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Object storage settings. Bucket, access key and secret key are required
/// together; endpoint and region are optional.
#[derive(Clone, Debug, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub access_key: Option<Secret>,
    pub secret_key: Option<Secret>,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl S3Settings {
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the required variables that are not set.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bucket.is_none() {
            missing.push("S3_BUCKET");
        }
        if self.access_key.is_none() {
            missing.push("S3_ACCESS_KEY");
        }
        if self.secret_key.is_none() {
            missing.push("S3_SECRET_KEY");
        }
        missing
    }

    pub fn region_or_default(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_S3_REGION)
    }

    /// Credentials to scrub from any backend error text.
    pub fn secrets(&self) -> Vec<String> {
        [&self.access_key, &self.secret_key]
            .into_iter()
            .flatten()
            .map(|s| s.expose().to_string())
            .collect()
    }
}

/// Telegram user ids allowed to run administrator diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdminSet(BTreeSet<i64>);

impl AdminSet {
    /// Parse an id list separated by commas, spaces or semicolons. Tokens that
    /// are not integers are returned separately so the caller can warn.
    pub fn parse(raw: &str) -> (Self, Vec<String>) {
        let mut ids = BTreeSet::new();
        let mut rejected = Vec::new();

        for token in raw
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            match token.parse::<i64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => rejected.push(token.to_string()),
            }
        }

        (AdminSet(ids), rejected)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<i64> for AdminSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        AdminSet(iter.into_iter().collect())
    }
}

/// Database connection parameters.
#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    dsn: Secret,
    secrets: Vec<Secret>,
}

impl DatabaseSettings {
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        let dsn = dsn.into();
        let mut secrets = Vec::new();
        match Url::parse(&dsn).ok().and_then(|url| url.password().map(str::to_string)) {
            Some(password) => secrets.push(Secret::new(password)),
            None => {
                if let Some(password) = dsn_password(&dsn) {
                    secrets.push(Secret::new(password));
                }
            }
        }
        DatabaseSettings {
            dsn: Secret::new(dsn),
            secrets,
        }
    }

    fn postgres(
        host: &str,
        port: u16,
        dbname: &str,
        user: &str,
        password: &str,
        sslmode: &str,
    ) -> ConfigResult<Self> {
        let mut url = Url::parse(&format!("postgresql://{}:{}/{}", host, port, dbname))
            .map_err(|_| ConfigError::OutOfRange {
                name: "POSTGRESQL_HOST",
                reason: "does not form a valid connection URL",
            })?;
        url.set_username(user)
            .and_then(|_| url.set_password(Some(password)))
            .map_err(|_| ConfigError::OutOfRange {
                name: "POSTGRESQL_USER",
                reason: "cannot be encoded in a connection URL",
            })?;
        url.query_pairs_mut().append_pair("sslmode", sslmode);

        let mut settings = DatabaseSettings::from_dsn(url.to_string());
        settings.secrets.push(Secret::new(password));
        Ok(settings)
    }

    /// Raw connection string, credentials included. Only the database
    /// driver may see this.
    pub fn dsn(&self) -> &str {
        self.dsn.expose()
    }

    /// Driver name, e.g. `postgresql` or `sqlite`.
    pub fn driver(&self) -> &str {
        match self.dsn.expose().split_once(':') {
            Some((scheme, _)) if !scheme.contains('=') => scheme,
            _ => "postgresql",
        }
    }

    /// Connection string safe to show to an operator.
    pub fn redacted(&self) -> String {
        let secrets: Vec<&str> = self.secrets.iter().map(Secret::expose).collect();
        mask_secrets(&redact_dsn(self.dsn.expose()), &secrets)
    }
}

/// Immutable process-wide configuration.
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    pub environment: Environment,
    pub media_backend: StorageBackend,
    pub media_dir: PathBuf,
    pub s3: S3Settings,
    pub admins: AdminSet,
    pub database: DatabaseSettings,
    pub timezone: String,
}

fn truthy(value: Option<String>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1" | "true" | "t" | "yes" | "y")
    )
}

impl ConfigSnapshot {
    /// Load from the process environment. `.env` is only consulted outside
    /// production, and never when `DOTENV_DISABLED` is truthy.
    pub fn from_env() -> ConfigResult<Self> {
        let production = Environment::parse(env::var("APP_ENV").ok().as_deref())
            .map(|e| e.is_production())
            .unwrap_or(false);
        if !production && !truthy(env::var("DOTENV_DISABLED").ok()) {
            dotenvy::dotenv().ok();
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve the snapshot from an arbitrary variable lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = Environment::parse(get("APP_ENV").as_deref())?;

        let media_backend = match get("MEDIA_BACKEND") {
            None => StorageBackend::Local,
            Some(raw) => raw
                .parse::<StorageBackend>()
                .map_err(|_| ConfigError::InvalidMediaBackend(raw.clone()))?,
        };

        let media_dir = match lookup("MEDIA_DIR") {
            None => PathBuf::from(DEFAULT_MEDIA_DIR),
            Some(raw) if raw.trim().is_empty() => return Err(ConfigError::Empty("MEDIA_DIR")),
            Some(raw) => PathBuf::from(raw.trim()),
        };

        let max_attempts = match get("S3_MAX_ATTEMPTS") {
            None => S3_MAX_ATTEMPTS,
            Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError::InvalidNumber {
                name: "S3_MAX_ATTEMPTS",
                value: raw.clone(),
            })?,
        };
        if max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                name: "S3_MAX_ATTEMPTS",
                reason: "at least one attempt is required",
            });
        }

        let timeout_secs = match get("S3_TIMEOUT_SECS") {
            None => S3_TIMEOUT_SECS,
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: "S3_TIMEOUT_SECS",
                value: raw.clone(),
            })?,
        };
        if timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                name: "S3_TIMEOUT_SECS",
                reason: "must be greater than zero",
            });
        }

        let s3 = S3Settings {
            endpoint: get("S3_ENDPOINT_URL"),
            region: get("S3_REGION"),
            bucket: get("S3_BUCKET"),
            access_key: get("S3_ACCESS_KEY").map(Secret::new),
            secret_key: get("S3_SECRET_KEY").map(Secret::new),
            max_attempts,
            timeout: Duration::from_secs(timeout_secs),
        };

        let (admins, rejected) = AdminSet::parse(&lookup("ADMINS").unwrap_or_default());
        if !rejected.is_empty() {
            tracing::warn!(
                rejected = rejected.len(),
                "Ignoring non-numeric entries in ADMINS"
            );
        }
        tracing::info!(admins = admins.len(), "Admins configured");

        let database = Self::database_from(&get)?;

        Ok(ConfigSnapshot {
            environment,
            media_backend,
            media_dir,
            s3,
            admins,
            database,
            timezone: get("TZ").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        })
    }

    fn database_from<G>(get: &G) -> ConfigResult<DatabaseSettings>
    where
        G: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = get("DATABASE_URL") {
            return Ok(DatabaseSettings::from_dsn(dsn));
        }

        let host = get("POSTGRESQL_HOST");
        let dbname = get("POSTGRESQL_DBNAME");
        let user = get("POSTGRESQL_USER");
        let password = get("POSTGRESQL_PASSWORD");

        match (host, dbname, user, password) {
            (Some(host), Some(dbname), Some(user), Some(password)) => {
                let port = match get("POSTGRESQL_PORT") {
                    None => DEFAULT_POSTGRES_PORT,
                    Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
                        name: "POSTGRESQL_PORT",
                        value: raw.clone(),
                    })?,
                };
                let sslmode =
                    get("POSTGRESQL_SSLMODE").unwrap_or_else(|| DEFAULT_SSLMODE.to_string());
                DatabaseSettings::postgres(&host, port, &dbname, &user, &password, &sslmode)
            }
            _ => Ok(DatabaseSettings::from_dsn(DEFAULT_SQLITE_DSN)),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// True when object storage is both selected and fully configured.
    pub fn wants_object_storage(&self) -> bool {
        self.media_backend == StorageBackend::S3 && self.s3.is_complete()
    }
}
