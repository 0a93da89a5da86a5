use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageResult};
use std::sync::Arc;
use teadiary_core::ConfigSnapshot;

/// Create the local backend rooted at `MEDIA_DIR`. It always exists: it is
/// either the primary or the reserve.
pub async fn create_local_storage(config: &ConfigSnapshot) -> StorageResult<Arc<dyn Storage>> {
    let storage = LocalStorage::new(config.media_dir.clone()).await?;
    Ok(Arc::new(storage))
}

/// Create the object storage client, if one can be built.
///
/// - `s3` selected and complete: built, and a build failure is fatal.
/// - `s3` selected but incomplete: `None`, the router runs local-only.
/// - `local` selected but S3 complete: built for reading assets stored before
///   the switch; a build failure only disables those reads.
pub async fn create_remote_storage(
    config: &ConfigSnapshot,
) -> StorageResult<Option<Arc<dyn Storage>>> {
    let selected = config.media_backend == StorageBackend::S3;

    if !config.s3.is_complete() {
        if selected {
            tracing::warn!(
                missing = %config.s3.missing_fields().join(","),
                "MEDIA_BACKEND=s3 but object storage is not fully configured, using local storage"
            );
        }
        return Ok(None);
    }

    #[cfg(feature = "storage-s3")]
    {
        match S3Storage::new(&config.s3) {
            Ok(storage) => Ok(Some(Arc::new(storage))),
            Err(e) if selected => Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Object storage client unavailable, stored remote assets cannot be read"
                );
                Ok(None)
            }
        }
    }

    #[cfg(not(feature = "storage-s3"))]
    {
        tracing::warn!("Object storage configured but the storage-s3 feature is not enabled");
        Ok(None)
    }
}
