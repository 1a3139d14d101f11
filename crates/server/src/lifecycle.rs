//! Dual-store write ordering helpers.
//!
//! Uploads stage the blob first, then commit the metadata row; replacements
//! reclaim the superseded blob only after the row points at the new one. The
//! two cleanup paths below are best-effort on purpose: a leaked blob is
//! invisible to readers (no row references it) and gets mopped up against the
//! object listing later, while a failed request must still return its real
//! error rather than a cleanup error.

use shelf_core::config::GcConfig;
use shelf_storage::{delete_if_exists, ObjectStore};
use time::{Duration, OffsetDateTime};

/// When a soft-deleted entity becomes purgeable.
pub fn retention_deadline(now: OffsetDateTime, config: &GcConfig) -> OffsetDateTime {
    now + Duration::days(config.retention_days)
}

/// Remove a staged blob after the metadata commit failed.
pub async fn discard_staged(storage: &dyn ObjectStore, key: &str) {
    match delete_if_exists(storage, key).await {
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to discard staged blob after rollback");
        }
    }
}

/// Remove a blob superseded by a replacement, once the row no longer
/// references it.
pub async fn reclaim_replaced(storage: &dyn ObjectStore, key: &str) {
    match delete_if_exists(storage, key).await {
        Ok(true) => tracing::debug!(key, "reclaimed replaced blob"),
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to reclaim replaced blob");
        }
    }
}
