//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{Cursor, ListedPage, ObjectEntry, ObjectMeta, ObjectStore, MAX_PAGE_SIZE};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// S3-compatible object store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// `force_path_style` selects path-style URLs (`endpoint/bucket/key`),
    /// required by MinIO and most S3-compatible stores; AWS S3 proper wants
    /// virtual-hosted style (false).
    pub async fn new(
        bucket: &str,
        region: &str,
        prefix: &str,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let region = aws_config::Region::new(region.to_string());

        let mut builder = if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "shelf-config");
            aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(credentials)
        } else {
            // No explicit credentials: resolve the ambient chain (env, profile,
            // IMDS) once at startup.
            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&sdk_config)
        };

        if let Some(endpoint_url) = &endpoint {
            // Accept bare host:port endpoints like "minio:9000".
            let lower = endpoint_url.to_ascii_lowercase();
            let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint_url.clone()
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        let normalized_prefix = match prefix.trim_matches('/') {
            "" => None,
            p => Some(p.to_string()),
        };

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
        })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn strip_prefix(&self, full_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => {
                let prefix_with_slash = format!("{prefix}/");
                full_key
                    .strip_prefix(&prefix_with_slash)
                    .unwrap_or(full_key)
                    .to_string()
            }
            None => full_key.to_string(),
        }
    }

    /// Convert an SDK error to StorageError, mapping 404 to NotFound.
    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
            if service_err.raw().status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        StorageError::S3(Box::new(err))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
                    if service_err.raw().status().as_u16() == 404 {
                        return Ok(false);
                    }
                }
                Err(StorageError::S3(Box::new(err)))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let last_modified = output
            .last_modified()
            .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok());

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0) as u64,
            last_modified,
            content_type: output.content_type().map(|s| s.to_string()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();

        Ok(bytes)
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let full_key = self.full_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(data.into())
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);

        // S3 delete_object succeeds on missing keys; head first so callers
        // see NotFound like they do on the filesystem backend.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> StorageResult<ListedPage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let full_prefix = self.full_key(prefix);

        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .max_keys(limit as i32);

        if let Some(cursor) = &cursor {
            let token = std::str::from_utf8(cursor.as_bytes())
                .map_err(|_| StorageError::InvalidCursor("cursor is not UTF-8".to_string()))?;
            request = request.continuation_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, prefix))?;

        let mut objects = Vec::with_capacity(output.contents().len());
        for obj in output.contents() {
            let Some(obj_key) = obj.key() else { continue };
            objects.push(ObjectEntry {
                key: self.strip_prefix(obj_key),
                size: obj.size().unwrap_or(0) as u64,
                last_modified: obj
                    .last_modified()
                    .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok()),
            });
        }

        let next_cursor = if output.is_truncated() == Some(true) {
            output
                .next_continuation_token()
                .map(|t| Cursor::new(t.as_bytes().to_vec()))
                .transpose()?
        } else {
            None
        };

        Ok(ListedPage {
            objects,
            next_cursor,
        })
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let check = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.full_key(""))
            .max_keys(1)
            .send();

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StorageError::S3(Box::new(e))),
            Err(_) => Err(StorageError::Config(format!(
                "s3 health check timed out after {HEALTH_CHECK_TIMEOUT:?}"
            ))),
        }
    }
}
