use crate::asset::StorageLocation;
use crate::keys::validate_key;
use crate::retry::{with_backoff, RetryPolicy};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;
use teadiary_core::{mask_secrets, S3Settings};

/// Direction of a failed call, which decides what a 404 means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Read,
    Write,
}

/// S3-compatible object storage implementation
///
/// The client's own retry loop is disabled; retries, backoff and the overall
/// deadline come from [`RetryPolicy`].
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    bucket: String,
    policy: RetryPolicy,
    secrets: Arc<[String]>,
}

impl S3Storage {
    /// Build a client from complete settings.
    ///
    /// A custom endpoint (MinIO, DigitalOcean Spaces, ...) switches to
    /// path-style addressing; plain `http://` endpoints are allowed.
    pub fn new(settings: &S3Settings) -> StorageResult<Self> {
        let missing = settings.missing_fields();
        if !missing.is_empty() {
            return Err(StorageError::ConfigError(format!(
                "Object storage settings incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        let secrets: Arc<[String]> = settings.secrets().into();
        let bucket = settings.bucket.clone().unwrap_or_default();
        let policy = RetryPolicy::from_settings(settings);

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket.clone())
            .with_region(settings.region_or_default())
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .with_client_options(ClientOptions::new().with_timeout(settings.timeout));

        if let Some(key) = &settings.access_key {
            builder = builder.with_access_key_id(key.expose());
        }
        if let Some(secret) = &settings.secret_key {
            builder = builder.with_secret_access_key(secret.expose());
        }
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(mask_secrets(&e.to_string(), &secrets)))?;
        let store = Arc::new(store);

        tracing::info!(
            bucket = %bucket,
            region = %settings.region_or_default(),
            endpoint = settings.endpoint.as_deref().unwrap_or("aws"),
            max_attempts = policy.max_attempts,
            "Object storage client configured"
        );

        Ok(S3Storage {
            store: store.clone(),
            signer: Some(store),
            bucket,
            policy,
            secrets,
        })
    }

    /// Wrap an existing object store, e.g. an in-memory one. Presigned URLs
    /// are unavailable on such a backend.
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        S3Storage {
            store,
            signer: None,
            bucket: bucket.into(),
            policy,
            secrets: Arc::from(Vec::new()),
        }
    }

    /// Values to mask from every error message this backend produces.
    pub fn with_secrets(mut self, secrets: Vec<String>) -> Self {
        self.secrets = secrets.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn scrub(&self, err: StorageError) -> StorageError {
        if self.secrets.is_empty() {
            return err;
        }
        let mask = |m: String| mask_secrets(&m, &self.secrets);
        match err {
            StorageError::Transient(m) => StorageError::Transient(mask(m)),
            StorageError::Rejected(m) => StorageError::Rejected(mask(m)),
            StorageError::ConfigError(m) => StorageError::ConfigError(mask(m)),
            other => other,
        }
    }
}

/// Map an object store error onto the retry taxonomy.
pub(crate) fn classify_error(err: ObjectStoreError, op: Op, key: &str) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } if op == Op::Read => {
            StorageError::NotFound(key.to_string())
        }
        // On writes a 404 means the bucket itself is missing.
        ObjectStoreError::NotFound { .. } => StorageError::Rejected(err.to_string()),
        ObjectStoreError::PermissionDenied { .. }
        | ObjectStoreError::Unauthenticated { .. }
        | ObjectStoreError::Precondition { .. }
        | ObjectStoreError::AlreadyExists { .. }
        | ObjectStoreError::InvalidPath { .. }
        | ObjectStoreError::NotSupported { .. }
        | ObjectStoreError::NotImplemented { .. }
        | ObjectStoreError::UnknownConfigurationKey { .. } => {
            StorageError::Rejected(err.to_string())
        }
        other => {
            let message = other.to_string();
            match http_status_hint(&message) {
                Some(status) if (400..500).contains(&status) && status != 408 && status != 429 => {
                    StorageError::Rejected(message)
                }
                _ => StorageError::Transient(message),
            }
        }
    }
}

/// First three-digit number following the word "status" in an error message.
fn http_status_hint(message: &str) -> Option<u16> {
    let lower = message.to_ascii_lowercase();
    lower.match_indices("status").find_map(|(idx, _)| {
        let rest = lower[idx + "status".len()..].trim_start();
        let rest = rest.strip_prefix("code").unwrap_or(rest);
        let digits: String = rest
            .trim_start_matches(|c: char| c == ':' || c == '=' || c.is_whitespace())
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if digits.len() == 3 {
            digits.parse().ok()
        } else {
            None
        }
    })
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<StorageLocation> {
        validate_key(storage_key)?;

        let size = data.len() as u64;
        let location = Path::from(storage_key);
        let start = std::time::Instant::now();

        let result = with_backoff(&self.policy, "s3.put", || {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            let options = PutOptions {
                attributes,
                ..Default::default()
            };
            let payload = PutPayload::from(data.clone());
            let location = &location;
            async move {
                self.store
                    .put_opts(location, payload, options)
                    .await
                    .map_err(|e| self.scrub(classify_error(e, Op::Write, storage_key)))
            }
        })
        .await;

        if let Err(e) = &result {
            tracing::error!(
                error = %e,
                error_kind = e.kind(),
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
        }
        result?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(StorageLocation::Object {
            bucket: self.bucket.clone(),
            key: storage_key.to_string(),
        })
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
        validate_key(storage_key)?;

        let location = Path::from(storage_key);
        let start = std::time::Instant::now();

        let bytes = with_backoff(&self.policy, "s3.get", || {
            let location = &location;
            async move {
                let result = self
                    .store
                    .get(location)
                    .await
                    .map_err(|e| self.scrub(classify_error(e, Op::Read, storage_key)))?;
                result
                    .bytes()
                    .await
                    .map_err(|e| self.scrub(classify_error(e, Op::Read, storage_key)))
            }
        })
        .await?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes)
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;

        let location = Path::from(storage_key);
        let head = with_backoff(&self.policy, "s3.head", || {
            let location = &location;
            async move {
                match self.store.head(location).await {
                    Ok(_) => Ok(true),
                    Err(ObjectStoreError::NotFound { .. }) => Ok(false),
                    Err(e) => Err(self.scrub(classify_error(e, Op::Read, storage_key))),
                }
            }
        });
        head.await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;

        let location = Path::from(storage_key);
        let start = std::time::Instant::now();

        with_backoff(&self.policy, "s3.delete", || {
            let location = &location;
            async move {
                match self.store.delete(location).await {
                    Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
                    Err(e) => Err(self.scrub(classify_error(e, Op::Write, storage_key))),
                }
            }
        })
        .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        validate_key(storage_key)?;

        let Some(signer) = &self.signer else {
            return Ok(None);
        };

        let location = Path::from(storage_key);
        let url = signer
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|e| self.scrub(classify_error(e, Op::Read, storage_key)))?;

        Ok(Some(url.to_string()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
