//! Garbage collection: explicit purges and the scheduled sweep.
//!
//! A purge runs in a fixed order: claim the row with a compare-and-swap
//! (`deleted` -> `purging`), collect its blob keys, delete its metadata rows,
//! then delete the blobs best-effort. Rows go first so a crash can only leave
//! orphan blobs, never metadata pointing at missing blobs. Blob deletions
//! that fail are logged and left for a later reconciliation against the
//! object listing.

use crate::error::ApiResult;
use serde::Serialize;
use shelf_core::config::GcConfig;
use shelf_metadata::models::PurgedRows;
use shelf_metadata::MetadataStore;
use shelf_storage::{delete_if_exists, ObjectStore};
use time::OffsetDateTime;

/// Outcome of purging a single entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub rows: PurgedRows,
    pub blobs_deleted: u64,
    /// Blobs already absent when the purge tried to delete them.
    pub blobs_already_gone: u64,
    pub blob_errors: u64,
}

/// Counters for one sweep, returned to the caller and logged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepStats {
    pub books_purged: u64,
    pub comics_purged: u64,
    /// Claims lost to a concurrent sweeper or a last-moment restore.
    pub claims_lost: u64,
    pub blobs_deleted: u64,
    pub blobs_already_gone: u64,
    pub blob_errors: u64,
}

impl SweepStats {
    fn absorb(&mut self, report: &PurgeReport) {
        self.blobs_deleted += report.blobs_deleted;
        self.blobs_already_gone += report.blobs_already_gone;
        self.blob_errors += report.blob_errors;
    }
}

/// Purge one book. Returns None when the compare-and-swap claim fails, i.e.
/// the book was not `deleted` or a concurrent purge won the race.
pub async fn purge_book(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    id: i64,
    now: OffsetDateTime,
) -> ApiResult<Option<PurgeReport>> {
    if !metadata.claim_book_for_purge(id, now).await? {
        return Ok(None);
    }
    let keys = metadata.collect_book_blob_keys(id).await?;
    let rows = metadata.purge_book_rows(id).await?;
    let mut report = PurgeReport {
        rows,
        ..PurgeReport::default()
    };
    delete_blobs(storage, "book", id, &keys, &mut report).await;
    tracing::info!(
        book_id = id,
        chapters = report.rows.chapters,
        blobs = keys.len(),
        "purged book"
    );
    Ok(Some(report))
}

/// Purge one comic; see [`purge_book`].
pub async fn purge_comic(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    id: i64,
    now: OffsetDateTime,
) -> ApiResult<Option<PurgeReport>> {
    if !metadata.claim_comic_for_purge(id, now).await? {
        return Ok(None);
    }
    let keys = metadata.collect_comic_blob_keys(id).await?;
    let rows = metadata.purge_comic_rows(id).await?;
    let mut report = PurgeReport {
        rows,
        ..PurgeReport::default()
    };
    delete_blobs(storage, "comic", id, &keys, &mut report).await;
    tracing::info!(
        comic_id = id,
        pages = report.rows.pages,
        blobs = keys.len(),
        "purged comic"
    );
    Ok(Some(report))
}

/// Purge all expired soft-deleted books and comics.
///
/// Batched and iteration-capped so a single sweep cannot run unbounded; the
/// remainder is picked up by the next scheduled sweep.
pub async fn sweep_expired(
    metadata: &dyn MetadataStore,
    storage: &dyn ObjectStore,
    config: &GcConfig,
) -> ApiResult<SweepStats> {
    let now = OffsetDateTime::now_utc();
    let mut stats = SweepStats::default();

    for _ in 0..config.max_gc_iterations {
        let ids = metadata.expired_deleted_books(now, config.batch_size).await?;
        if ids.is_empty() {
            break;
        }
        for id in ids {
            match purge_book(metadata, storage, id, now).await? {
                Some(report) => {
                    stats.books_purged += 1;
                    stats.absorb(&report);
                }
                None => stats.claims_lost += 1,
            }
        }
    }

    for _ in 0..config.max_gc_iterations {
        let ids = metadata
            .expired_deleted_comics(now, config.batch_size)
            .await?;
        if ids.is_empty() {
            break;
        }
        for id in ids {
            match purge_comic(metadata, storage, id, now).await? {
                Some(report) => {
                    stats.comics_purged += 1;
                    stats.absorb(&report);
                }
                None => stats.claims_lost += 1,
            }
        }
    }

    Ok(stats)
}

async fn delete_blobs(
    storage: &dyn ObjectStore,
    owner_kind: &str,
    owner_id: i64,
    keys: &[String],
    report: &mut PurgeReport,
) {
    for key in keys {
        match delete_if_exists(storage, key).await {
            Ok(true) => report.blobs_deleted += 1,
            Ok(false) => report.blobs_already_gone += 1,
            Err(e) => {
                report.blob_errors += 1;
                tracing::warn!(owner_kind, owner_id, key, error = %e, "blob delete failed during purge");
            }
        }
    }
}
