//! Backend selection and one-way fallback.
//!
//! The router owns a primary backend picked once from configuration and a
//! local reserve that always exists. A store that fails on a remote primary is
//! retried exactly once on the reserve; a failing local primary is final.
//! Reads, removals and presigned URLs follow the backend recorded on the asset.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use teadiary_core::ConfigSnapshot;

use crate::asset::MediaAsset;
use crate::factory::{create_local_storage, create_remote_storage};
use crate::keys::{generate_storage_key, validate_content_type, validate_prefix, DEFAULT_PREFIX};
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// Reachability of one backend, as shown by the health command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Disabled,
    Ok,
    Error(&'static str),
}

impl Display for BackendStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackendStatus::Disabled => write!(f, "disabled"),
            BackendStatus::Ok => write!(f, "ok"),
            BackendStatus::Error(kind) => write!(f, "error:{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHealth {
    pub primary: StorageBackend,
    pub remote: BackendStatus,
    pub local: BackendStatus,
}

#[derive(Clone)]
pub struct StorageRouter {
    primary: Arc<dyn Storage>,
    local: Arc<dyn Storage>,
    remote: Option<Arc<dyn Storage>>,
}

impl StorageRouter {
    /// Build backends from configuration. Object storage becomes primary only
    /// when it is selected and fully configured.
    pub async fn from_config(config: &ConfigSnapshot) -> StorageResult<Self> {
        let local = create_local_storage(config).await?;
        let remote = create_remote_storage(config).await?;

        let primary = match (&remote, config.media_backend) {
            (Some(remote), StorageBackend::S3) => remote.clone(),
            _ => local.clone(),
        };

        tracing::info!(
            selected = %config.media_backend,
            primary = %primary.backend_type(),
            remote_reads = remote.is_some(),
            media_dir = %config.media_dir.display(),
            "Storage router initialized"
        );

        Ok(StorageRouter {
            primary,
            local,
            remote,
        })
    }

    /// Router over explicit backends. A remote primary also serves reads of
    /// remote assets.
    pub fn new(primary: Arc<dyn Storage>, local: Arc<dyn Storage>) -> Self {
        let remote = (primary.backend_type() == StorageBackend::S3).then(|| primary.clone());
        StorageRouter {
            primary,
            local,
            remote,
        }
    }

    /// Remote backend used only for reads, e.g. after switching back to local.
    pub fn with_remote(mut self, remote: Arc<dyn Storage>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn primary_backend(&self) -> StorageBackend {
        self.primary.backend_type()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Store under the default `media` prefix.
    pub async fn store(&self, content: Bytes, mime_type: &str) -> StorageResult<MediaAsset> {
        self.store_under(DEFAULT_PREFIX, content, mime_type).await
    }

    /// Store `content` under a fresh key below `prefix`.
    ///
    /// The backend calls run on their own task: if the caller stops waiting,
    /// the write still runs to completion or to its retry budget and the
    /// result is dropped.
    pub async fn store_under(
        &self,
        prefix: &str,
        content: Bytes,
        mime_type: &str,
    ) -> StorageResult<MediaAsset> {
        validate_prefix(prefix)?;
        validate_content_type(mime_type)?;

        let router = self.clone();
        let prefix = prefix.to_string();
        let mime_type = mime_type.to_string();

        tokio::spawn(async move { router.store_detached(&prefix, content, &mime_type).await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Storage task did not complete");
                StorageError::TaskFailed(e.to_string())
            })?
    }

    async fn store_detached(
        &self,
        prefix: &str,
        content: Bytes,
        mime_type: &str,
    ) -> StorageResult<MediaAsset> {
        let key = generate_storage_key(prefix, &content, mime_type);
        let size_bytes = content.len() as u64;
        let primary = self.primary.backend_type();

        let (backend, location, fell_back) =
            match self.primary.put(&key, content.clone(), mime_type).await {
                Ok(location) => (primary, location, false),
                Err(e) if e.is_storage_failure() && primary != StorageBackend::Local => {
                    tracing::warn!(
                        error = %e,
                        error_kind = e.kind(),
                        key = %key,
                        primary = %primary,
                        size_bytes,
                        "Primary storage failed, falling back to local storage"
                    );
                    match self.local.put(&key, content, mime_type).await {
                        Ok(location) => (StorageBackend::Local, location, true),
                        Err(local_err) => {
                            tracing::error!(
                                error = %local_err,
                                error_kind = local_err.kind(),
                                primary_error_kind = e.kind(),
                                key = %key,
                                "Local fallback failed, media not stored"
                            );
                            return Err(local_err);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        error_kind = e.kind(),
                        key = %key,
                        primary = %primary,
                        "Storage failed, media not stored"
                    );
                    return Err(e);
                }
            };

        Ok(MediaAsset {
            key,
            backend,
            size_bytes,
            mime_type: mime_type.to_string(),
            location,
            created_at: Utc::now(),
            fell_back,
        })
    }

    /// Backend that holds assets recorded with `backend`.
    fn backend_for(&self, backend: StorageBackend) -> StorageResult<&Arc<dyn Storage>> {
        match backend {
            StorageBackend::Local if self.primary.backend_type() == StorageBackend::Local => {
                Ok(&self.primary)
            }
            StorageBackend::Local => Ok(&self.local),
            StorageBackend::S3 => self.remote.as_ref().ok_or_else(|| {
                StorageError::ConfigError(
                    "Asset is stored in object storage but object storage is not configured"
                        .to_string(),
                )
            }),
        }
    }

    pub async fn retrieve(&self, asset: &MediaAsset) -> StorageResult<Bytes> {
        self.backend_for(asset.backend)?.get(&asset.key).await
    }

    /// Delete the asset's bytes. Removing an already removed asset succeeds.
    pub async fn remove(&self, asset: &MediaAsset) -> StorageResult<()> {
        self.backend_for(asset.backend)?.delete(&asset.key).await
    }

    pub async fn presigned_url(
        &self,
        asset: &MediaAsset,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        self.backend_for(asset.backend)?
            .presigned_url(&asset.key, expires_in)
            .await
    }

    pub async fn health(&self) -> StorageHealth {
        let remote = match &self.remote {
            None => BackendStatus::Disabled,
            Some(remote) => status_of(remote.as_ref()).await,
        };
        let local = match self.backend_for(StorageBackend::Local) {
            Ok(local) => status_of(local.as_ref()).await,
            Err(e) => BackendStatus::Error(e.kind()),
        };

        StorageHealth {
            primary: self.primary_backend(),
            remote,
            local,
        }
    }
}

async fn status_of(storage: &dyn Storage) -> BackendStatus {
    match storage.check().await {
        Ok(()) => BackendStatus::Ok,
        Err(e) => {
            tracing::warn!(
                backend = %storage.backend_type(),
                error_kind = e.kind(),
                "Storage health check failed"
            );
            BackendStatus::Error(e.kind())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::StorageLocation;
    use crate::local::LocalStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// In-process backend with optional fault injection.
    struct FakeStorage {
        backend: StorageBackend,
        failure: Option<fn() -> StorageError>,
        delay: Duration,
        objects: Mutex<HashMap<String, Bytes>>,
        puts: AtomicUsize,
    }

    impl FakeStorage {
        fn new(backend: StorageBackend) -> Arc<Self> {
            Arc::new(FakeStorage {
                backend,
                failure: None,
                delay: Duration::ZERO,
                objects: Mutex::new(HashMap::new()),
                puts: AtomicUsize::new(0),
            })
        }

        fn failing(backend: StorageBackend, failure: fn() -> StorageError) -> Arc<Self> {
            Arc::new(FakeStorage {
                backend,
                failure: Some(failure),
                delay: Duration::ZERO,
                objects: Mutex::new(HashMap::new()),
                puts: AtomicUsize::new(0),
            })
        }

        fn slow(backend: StorageBackend, delay: Duration) -> Arc<Self> {
            Arc::new(FakeStorage {
                backend,
                failure: None,
                delay,
                objects: Mutex::new(HashMap::new()),
                puts: AtomicUsize::new(0),
            })
        }

        fn fail(&self) -> StorageResult<()> {
            match self.failure {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        fn stored(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Storage for FakeStorage {
        async fn put(
            &self,
            key: &str,
            data: Bytes,
            _content_type: &str,
        ) -> StorageResult<StorageLocation> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.fail()?;
            self.objects.lock().unwrap().insert(key.to_string(), data);
            Ok(StorageLocation::Object {
                bucket: "fake".into(),
                key: key.to_string(),
            })
        }

        async fn get(&self, key: &str) -> StorageResult<Bytes> {
            self.fail()?;
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        async fn exists(&self, key: &str) -> StorageResult<bool> {
            self.fail()?;
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.fail()?;
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn presigned_url(
            &self,
            key: &str,
            _expires_in: Duration,
        ) -> StorageResult<Option<String>> {
            Ok(Some(format!("https://fake/{}", key)))
        }

        fn backend_type(&self) -> StorageBackend {
            self.backend
        }
    }

    fn transient() -> StorageError {
        StorageError::Transient("503 Service Unavailable".into())
    }

    fn rejected() -> StorageError {
        StorageError::Rejected("403 AccessDenied".into())
    }

    fn disk_full() -> StorageError {
        StorageError::IoError(std::io::Error::other("No space left on device"))
    }

    fn temp_files_under(dir: &Path) -> Vec<String> {
        let mut found = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&current) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.to_string_lossy().ends_with(".tmp") {
                    found.push(path.to_string_lossy().into_owned());
                }
            }
        }
        found
    }

    async fn local_router(dir: &Path) -> StorageRouter {
        let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir).await.unwrap());
        StorageRouter::new(local.clone(), local)
    }

    #[tokio::test]
    async fn test_round_trip_local() {
        let dir = tempdir().unwrap();
        let router = local_router(dir.path()).await;

        for payload in [&b""[..], b"a", b"\x00\x01\x02 tea leaves \xff"] {
            let asset = router
                .store(Bytes::copy_from_slice(payload), "image/jpeg")
                .await
                .unwrap();
            assert_eq!(asset.backend, StorageBackend::Local);
            assert_eq!(asset.size_bytes, payload.len() as u64);
            assert!(!asset.fell_back);
            assert_eq!(router.retrieve(&asset).await.unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn test_store_under_prefix() {
        let dir = tempdir().unwrap();
        let router = local_router(dir.path()).await;

        let asset = router
            .store_under("tastings/42/7", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        assert!(asset.key.starts_with("tastings/42/7/"));
        assert!(asset.key.ends_with(".png"));
        assert!(dir.path().join(&asset.key).is_file());
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn test_round_trip_object_storage() {
        use crate::retry::RetryPolicy;
        use crate::s3::S3Storage;
        use object_store::memory::InMemory;

        let dir = tempdir().unwrap();
        let remote: Arc<dyn Storage> = Arc::new(S3Storage::with_store(
            Arc::new(InMemory::new()),
            "photos",
            RetryPolicy::default(),
        ));
        let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let router = StorageRouter::new(remote, local);

        let asset = router
            .store(Bytes::from_static(b"remote bytes"), "image/webp")
            .await
            .unwrap();

        assert_eq!(asset.backend, StorageBackend::S3);
        assert!(matches!(
            asset.location,
            StorageLocation::Object { ref bucket, .. } if bucket == "photos"
        ));
        assert_eq!(router.retrieve(&asset).await.unwrap(), "remote bytes");
        assert!(temp_files_under(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let dir = tempdir().unwrap();
        let remote = FakeStorage::failing(StorageBackend::S3, transient);
        let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let router = StorageRouter::new(remote.clone(), local);

        let asset = router
            .store(Bytes::from_static(b"photo"), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(asset.backend, StorageBackend::Local);
        assert!(asset.fell_back);
        assert!(matches!(asset.location, StorageLocation::Filesystem { .. }));
        assert_eq!(remote.puts.load(Ordering::SeqCst), 1);
        assert_eq!(router.retrieve(&asset).await.unwrap(), "photo");
    }

    #[tokio::test]
    async fn test_rejected_remote_also_falls_back() {
        let remote = FakeStorage::failing(StorageBackend::S3, rejected);
        let local = FakeStorage::new(StorageBackend::Local);
        let router = StorageRouter::new(remote, local.clone());

        let asset = router
            .store(Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();
        assert_eq!(asset.backend, StorageBackend::Local);
        assert_eq!(local.stored(), 1);
    }

    #[tokio::test]
    async fn test_both_backends_fail() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("media-root");
        let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(&root).await.unwrap());
        let router = StorageRouter::new(FakeStorage::failing(StorageBackend::S3, transient), local);

        // Replace the local root with a plain file so every local write fails.
        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, b"not a directory").unwrap();

        let result = router.store(Bytes::from_static(b"photo"), "image/jpeg").await;

        let err = result.unwrap_err();
        assert!(err.is_storage_failure(), "unexpected error: {err:?}");
        assert_eq!(err.user_message(), crate::traits::USER_RETRY_MESSAGE);
        assert!(temp_files_under(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_local_primary_failure_has_no_fallback() {
        let primary = FakeStorage::failing(StorageBackend::Local, disk_full);
        let reserve = FakeStorage::new(StorageBackend::Local);
        let router = StorageRouter::new(primary.clone(), reserve.clone());

        let result = router.store(Bytes::from_static(b"x"), "image/jpeg").await;

        assert!(matches!(result, Err(StorageError::IoError(_))));
        assert_eq!(primary.puts.load(Ordering::SeqCst), 1);
        assert_eq!(reserve.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_caller_errors_never_reach_backends() {
        let primary = FakeStorage::new(StorageBackend::S3);
        let local = FakeStorage::new(StorageBackend::Local);
        let router = StorageRouter::new(primary.clone(), local.clone());

        let result = router.store(Bytes::from_static(b"x"), "jpeg").await;
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));

        let result = router
            .store_under("../outside", Bytes::from_static(b"x"), "image/jpeg")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        assert_eq!(primary.puts.load(Ordering::SeqCst), 0);
        assert_eq!(local.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_stores_keep_payloads_apart() {
        let dir = tempdir().unwrap();
        let router = local_router(dir.path()).await;

        let payloads: Vec<Bytes> = (0..32u32)
            .map(|i| Bytes::from(format!("payload-{i}-").repeat(512)))
            .collect();

        let assets = futures::future::join_all(
            payloads
                .iter()
                .cloned()
                .map(|p| router.store(p, "application/octet-stream")),
        )
        .await;

        for (asset, payload) in assets.into_iter().zip(&payloads) {
            let asset = asset.unwrap();
            assert_eq!(&router.retrieve(&asset).await.unwrap(), payload);
        }
        assert!(temp_files_under(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_follows_recorded_backend() {
        let remote = FakeStorage::new(StorageBackend::S3);
        let local = FakeStorage::new(StorageBackend::Local);
        let router = StorageRouter::new(remote.clone(), local.clone());

        local
            .objects
            .lock()
            .unwrap()
            .insert("media/a.jpg".into(), Bytes::from_static(b"local copy"));
        remote
            .objects
            .lock()
            .unwrap()
            .insert("media/a.jpg".into(), Bytes::from_static(b"remote copy"));

        let mut asset = router
            .store(Bytes::from_static(b"new"), "image/jpeg")
            .await
            .unwrap();
        asset.key = "media/a.jpg".into();

        asset.backend = StorageBackend::Local;
        assert_eq!(router.retrieve(&asset).await.unwrap(), "local copy");

        asset.backend = StorageBackend::S3;
        assert_eq!(router.retrieve(&asset).await.unwrap(), "remote copy");

        router.remove(&asset).await.unwrap();
        assert!(matches!(
            router.retrieve(&asset).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_asset_without_remote_backend() {
        let dir = tempdir().unwrap();
        let router = local_router(dir.path()).await;

        let mut asset = router
            .store(Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        asset.backend = StorageBackend::S3;

        assert!(matches!(
            router.retrieve(&asset).await,
            Err(StorageError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_only_remote_after_switch() {
        let dir = tempdir().unwrap();
        let remote = FakeStorage::new(StorageBackend::S3);
        remote
            .objects
            .lock()
            .unwrap()
            .insert("media/old.jpg".into(), Bytes::from_static(b"old"));

        let router = local_router(dir.path()).await.with_remote(remote.clone());
        assert_eq!(router.primary_backend(), StorageBackend::Local);

        let fresh = router
            .store(Bytes::from_static(b"new"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(fresh.backend, StorageBackend::Local);
        assert_eq!(remote.puts.load(Ordering::SeqCst), 0);

        let old = MediaAsset {
            key: "media/old.jpg".into(),
            backend: StorageBackend::S3,
            size_bytes: 3,
            mime_type: "image/jpeg".into(),
            location: StorageLocation::Object {
                bucket: "fake".into(),
                key: "media/old.jpg".into(),
            },
            created_at: Utc::now(),
            fell_back: false,
        };
        assert_eq!(router.retrieve(&old).await.unwrap(), "old");
        assert_eq!(
            router
                .presigned_url(&old, Duration::from_secs(60))
                .await
                .unwrap()
                .as_deref(),
            Some("https://fake/media/old.jpg")
        );
        assert_eq!(
            router
                .presigned_url(&fresh, Duration::from_secs(60))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_health_reports_each_backend() {
        let dir = tempdir().unwrap();
        let router = local_router(dir.path()).await;
        let health = router.health().await;
        assert_eq!(health.primary, StorageBackend::Local);
        assert_eq!(health.remote.to_string(), "disabled");
        assert_eq!(health.local.to_string(), "ok");

        let router = router.with_remote(FakeStorage::failing(StorageBackend::S3, transient));
        let health = router.health().await;
        assert_eq!(health.remote.to_string(), "error:transient");

        let router = router.with_remote(FakeStorage::new(StorageBackend::S3));
        assert_eq!(router.health().await.remote, BackendStatus::Ok);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_abort_write() {
        let remote = FakeStorage::slow(StorageBackend::S3, Duration::from_millis(100));
        let local = FakeStorage::new(StorageBackend::Local);
        let router = StorageRouter::new(remote.clone(), local);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            router.store(Bytes::from_static(b"late"), "image/jpeg"),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(remote.stored(), 1);
    }

    #[tokio::test]
    async fn test_from_config_selection() {
        let dir = tempdir().unwrap();
        let media_dir = dir.path().join("media").to_str().unwrap().to_string();
        let media_dir = media_dir.as_str();

        let build = |vars: Vec<(&str, &str)>| {
            let map: HashMap<String, String> = vars
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            ConfigSnapshot::from_lookup(|k| map.get(k).cloned()).unwrap()
        };

        let cfg = build(vec![("MEDIA_DIR", media_dir), ("MEDIA_BACKEND", "local")]);
        let router = StorageRouter::from_config(&cfg).await.unwrap();
        assert_eq!(router.primary_backend(), StorageBackend::Local);
        assert!(!router.has_remote());

        let cfg = build(vec![
            ("MEDIA_DIR", media_dir),
            ("MEDIA_BACKEND", "s3"),
            ("S3_BUCKET", "photos"),
        ]);
        let router = StorageRouter::from_config(&cfg).await.unwrap();
        assert_eq!(router.primary_backend(), StorageBackend::Local);

        #[cfg(feature = "storage-s3")]
        {
            let complete = vec![
                ("MEDIA_DIR", media_dir),
                ("S3_ENDPOINT_URL", "http://localhost:9000"),
                ("S3_BUCKET", "photos"),
                ("S3_ACCESS_KEY", "AKIDEXAMPLE"),
                ("S3_SECRET_KEY", "secret"),
            ];

            let mut selected = complete.clone();
            selected.push(("MEDIA_BACKEND", "s3"));
            let router = StorageRouter::from_config(&build(selected)).await.unwrap();
            assert_eq!(router.primary_backend(), StorageBackend::S3);

            let mut switched = complete;
            switched.push(("MEDIA_BACKEND", "local"));
            let router = StorageRouter::from_config(&build(switched)).await.unwrap();
            assert_eq!(router.primary_backend(), StorageBackend::Local);
            assert!(router.has_remote());
        }
    }
}
