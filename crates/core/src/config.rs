//! Application configuration.
//!
//! Loaded by the server binary from a TOML file plus `SHELF_`-prefixed
//! environment variables; every field has a serde default so a minimal config
//! only needs to name the storage backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable per-request tracing spans.
    #[serde(default = "default_true")]
    pub enable_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_tracing: true,
        }
    }
}

/// Blob store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Filesystem {
        /// Root directory for stored objects.
        path: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        /// Key prefix inside the bucket, e.g. "shelf/".
        #[serde(default)]
        prefix: String,
        /// Custom endpoint for S3-compatible stores (MinIO, R2).
        #[serde(default)]
        endpoint: Option<String>,
        /// Static credentials; falls back to the default provider chain.
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
        /// Path-style addressing, required by most S3-compatible stores.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/objects"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Days a soft-deleted entity is retained before it becomes purgeable.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Entities claimed per sweep batch.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u32,
    /// Cap on batches per sweep; bounds a single sweep's runtime.
    #[serde(default = "default_max_gc_iterations")]
    pub max_gc_iterations: u32,
    /// Seconds between automatic sweeps; 0 disables the scheduler.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            batch_size: default_gc_batch_size(),
            max_gc_iterations: default_max_gc_iterations(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Seconds a computed storage summary stays fresh.
    #[serde(default = "default_quota_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Objects fetched per listing page while summing usage.
    #[serde(default = "default_quota_page_size")]
    pub page_size: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_quota_cache_ttl_secs(),
            page_size: default_quota_page_size(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/shelf.db")
}

fn default_retention_days() -> i64 {
    crate::RETENTION_DAYS
}

fn default_gc_batch_size() -> u32 {
    50
}

fn default_max_gc_iterations() -> u32 {
    100
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_quota_cache_ttl_secs() -> u64 {
    300
}

fn default_quota_page_size() -> u32 {
    1000
}

impl AppConfig {
    /// Validate cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.gc.batch_size == 0 {
            return Err(Error::Config("gc.batch_size must be positive".into()));
        }
        if self.gc.max_gc_iterations == 0 {
            return Err(Error::Config("gc.max_gc_iterations must be positive".into()));
        }
        if self.gc.retention_days < 0 {
            return Err(Error::Config("gc.retention_days must not be negative".into()));
        }
        if self.quota.page_size == 0 {
            return Err(Error::Config("quota.page_size must be positive".into()));
        }
        if let StorageConfig::S3 {
            bucket,
            access_key_id,
            secret_access_key,
            ..
        } = &self.storage
        {
            if bucket.is_empty() {
                return Err(Error::Config("storage.bucket must not be empty".into()));
            }
            if access_key_id.is_some() != secret_access_key.is_some() {
                return Err(Error::Config(
                    "storage.access_key_id and storage.secret_access_key must be set together"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// Configuration for integration tests: filesystem storage and SQLite
    /// under a caller-provided temp directory, immediate retention so sweeps
    /// act without waiting out the retention window.
    pub fn for_testing(data_dir: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                enable_tracing: false,
            },
            storage: StorageConfig::Filesystem {
                path: data_dir.join("objects"),
            },
            metadata: MetadataConfig {
                db_path: data_dir.join("shelf.db"),
            },
            gc: GcConfig {
                retention_days: 0,
                batch_size: 10,
                max_gc_iterations: 10,
                sweep_interval_secs: 0,
            },
            quota: QuotaConfig {
                cache_ttl_secs: 300,
                page_size: 100,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut cfg = AppConfig::default();
        cfg.gc.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_half_configured_s3_credentials() {
        let mut cfg = AppConfig::default();
        cfg.storage = StorageConfig::S3 {
            bucket: "shelf".into(),
            region: "us-east-1".into(),
            prefix: String::new(),
            endpoint: None,
            access_key_id: Some("AKIA...".into()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [storage]
            backend = "filesystem"
            path = "/var/lib/shelf/objects"
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.quota.cache_ttl_secs, 300);
    }
}
