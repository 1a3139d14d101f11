//! Comic repository.

use crate::error::MetadataResult;
use crate::models::{ComicRow, PurgedRows};
use crate::repos::books::SourceUpload;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Fields for a new comic.
#[derive(Debug, Clone)]
pub struct NewComic {
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
}

/// Repository for comic operations. Lifecycle methods mirror `BookRepo`.
#[async_trait]
pub trait ComicRepo: Send + Sync {
    /// Insert a new comic and return the stored row.
    async fn create_comic(&self, comic: &NewComic, now: OffsetDateTime) -> MetadataResult<ComicRow>;

    /// Get a comic by id, regardless of status.
    async fn get_comic(&self, id: i64) -> MetadataResult<Option<ComicRow>>;

    /// Public listing: `normal` comics, newest first.
    async fn list_public_comics(&self) -> MetadataResult<Vec<ComicRow>>;

    /// Owner/admin listing: everything except `purging`.
    async fn list_admin_comics(&self, created_by: Option<i64>) -> MetadataResult<Vec<ComicRow>>;

    /// Update title/description.
    async fn update_comic(
        &self,
        id: i64,
        title: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Point the comic at a newly staged source blob, returning the previous
    /// source key.
    async fn set_comic_source(
        &self,
        id: i64,
        upload: &SourceUpload,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Option<String>>>;

    /// Set the cover only if none is set yet. Returns true if the cover was
    /// taken. Page-1 uploads use this to opportunistically become the cover.
    async fn set_comic_cover_if_unset(
        &self,
        id: i64,
        key: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// `normal` or `unlisted` -> `deleted`, stamping `delete_at`.
    async fn soft_delete_comic(
        &self,
        id: i64,
        delete_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// `normal` -> `unlisted`.
    async fn unlist_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// `deleted` or `unlisted` -> `normal`, clearing `delete_at`.
    async fn restore_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Compare-and-swap claim for the sweep: `deleted` -> `purging`.
    async fn claim_comic_for_purge(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Ids of `deleted` comics whose retention deadline has passed.
    async fn expired_deleted_comics(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<i64>>;

    /// All blob keys owned by a comic: source and page images.
    async fn collect_comic_blob_keys(&self, id: i64) -> MetadataResult<Vec<String>>;

    /// Delete the comic and its page rows in one transaction, pages first.
    async fn purge_comic_rows(&self, id: i64) -> MetadataResult<PurgedRows>;

    /// Recount pages from rows and store the result. Returns the new count,
    /// or None if the comic is missing.
    async fn finalize_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<Option<i64>>;
}
