//! Blob store abstraction and backends for Shelf.
//!
//! This crate provides:
//! - The `ObjectStore` trait: atomic single-object puts, deletes, and
//!   cursor-paged listings
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{
    delete_if_exists, Cursor, ListedPage, ObjectEntry, ObjectMeta, ObjectStore,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

use shelf_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            region,
            prefix,
            endpoint,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                region,
                prefix,
                endpoint.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("objects"),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put("covers/1.jpg", Bytes::from_static(b"img"))
            .await
            .unwrap();
        assert!(store.exists("covers/1.jpg").await.unwrap());
        assert_eq!(store.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn from_config_rejects_partial_s3_credentials() {
        let config = StorageConfig::S3 {
            bucket: "shelf".to_string(),
            region: "us-east-1".to_string(),
            prefix: String::new(),
            endpoint: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
