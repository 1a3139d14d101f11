//! Storage usage accounting.
//!
//! Usage is computed by walking the blob store listing and classifying each
//! key by its category prefix; the metadata store is only consulted for the
//! configured ceiling. The result is cached with a TTL because a full listing
//! walk is O(objects) and the admin dashboard polls it.
//!
//! The cached figure may lag uploads by up to the TTL, so the capacity check
//! is advisory rather than exact. That is the accepted trade-off: the hard
//! invariant is the ceiling setting itself, not the instant it trips.

use crate::error::{ApiError, ApiResult};
use serde::Serialize;
use shelf_core::config::QuotaConfig;
use shelf_core::keys;
use shelf_metadata::repos::STORAGE_LIMIT_BYTES;
use shelf_metadata::MetadataStore;
use shelf_storage::ObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Per-category usage totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryUsage {
    pub bytes: u64,
    pub objects: u64,
}

/// A point-in-time storage usage summary.
#[derive(Debug, Clone, Serialize)]
pub struct StorageSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub computed_at: OffsetDateTime,
    pub used_bytes: u64,
    pub object_count: u64,
    pub by_category: BTreeMap<&'static str, CategoryUsage>,
    pub limit_bytes: Option<u64>,
}

struct CacheEntry {
    summary: StorageSummary,
    computed: Instant,
}

/// Computes and caches storage usage; owns the ceiling setting.
pub struct QuotaAccountant {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    ttl: Duration,
    page_size: usize,
    cache: RwLock<Option<CacheEntry>>,
}

impl QuotaAccountant {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &QuotaConfig,
    ) -> Self {
        Self {
            storage,
            metadata,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            page_size: config.page_size as usize,
            cache: RwLock::new(None),
        }
    }

    /// Current usage summary, recomputed when the cache has expired.
    pub async fn summary(&self) -> ApiResult<StorageSummary> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.computed.elapsed() < self.ttl {
                    return Ok(entry.summary.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another request may have recomputed while we waited for the lock.
        if let Some(entry) = cache.as_ref() {
            if entry.computed.elapsed() < self.ttl {
                return Ok(entry.summary.clone());
            }
        }

        let summary = self.scan().await?;
        *cache = Some(CacheEntry {
            summary: summary.clone(),
            computed: Instant::now(),
        });
        Ok(summary)
    }

    /// Drop the cached summary so the next read recomputes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// The configured storage ceiling, if any.
    pub async fn limit_bytes(&self) -> ApiResult<Option<u64>> {
        let raw = self.metadata.get_setting(STORAGE_LIMIT_BYTES).await?;
        match raw {
            None => Ok(None),
            Some(value) => match value.parse::<u64>() {
                Ok(0) => Ok(None),
                Ok(n) => Ok(Some(n)),
                Err(_) => {
                    tracing::warn!(%value, "unparseable storage limit setting, treating as unset");
                    Ok(None)
                }
            },
        }
    }

    /// Persist a new ceiling (`None` clears it) and invalidate the cache so
    /// the next summary reflects it immediately.
    pub async fn set_limit(&self, limit: Option<u64>, now: OffsetDateTime) -> ApiResult<()> {
        match limit {
            Some(n) => {
                self.metadata
                    .set_setting(STORAGE_LIMIT_BYTES, &n.to_string(), now)
                    .await?;
            }
            None => {
                self.metadata.delete_setting(STORAGE_LIMIT_BYTES).await?;
            }
        }
        self.invalidate().await;
        Ok(())
    }

    /// Reject an upload that would push usage past the ceiling.
    pub async fn check_capacity(&self, incoming_bytes: u64) -> ApiResult<()> {
        let summary = self.summary().await?;
        let Some(limit) = summary.limit_bytes else {
            return Ok(());
        };
        if summary.used_bytes.saturating_add(incoming_bytes) > limit {
            return Err(ApiError::InsufficientStorage(format!(
                "upload of {incoming_bytes} bytes would exceed the {limit} byte storage limit \
                 ({} bytes in use)",
                summary.used_bytes
            )));
        }
        Ok(())
    }

    async fn scan(&self) -> ApiResult<StorageSummary> {
        let started = Instant::now();
        let mut used_bytes: u64 = 0;
        let mut object_count: u64 = 0;
        let mut by_category: BTreeMap<&'static str, CategoryUsage> = BTreeMap::new();

        let mut cursor = None;
        loop {
            let page = self.storage.list_page("", cursor, self.page_size).await?;
            for object in &page.objects {
                used_bytes += object.size;
                object_count += 1;
                let entry = by_category
                    .entry(keys::classify(&object.key).as_str())
                    .or_default();
                entry.bytes += object.size;
                entry.objects += 1;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let limit_bytes = self.limit_bytes().await?;
        tracing::debug!(
            object_count,
            used_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recomputed storage summary"
        );
        Ok(StorageSummary {
            computed_at: OffsetDateTime::now_utc(),
            used_bytes,
            object_count,
            by_category,
            limit_bytes,
        })
    }
}
