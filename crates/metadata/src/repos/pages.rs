//! Comic page repository.

use crate::error::MetadataResult;
use crate::models::ComicPageRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Fields for an upserted comic page.
#[derive(Debug, Clone)]
pub struct PageUpload {
    pub image_key: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub content_type: String,
}

/// Repository for comic page operations.
#[async_trait]
pub trait ComicPageRepo: Send + Sync {
    /// Get one page.
    async fn get_page(&self, comic_id: i64, page_index: i64)
        -> MetadataResult<Option<ComicPageRow>>;

    /// Pages of a comic, ordered by index.
    async fn list_pages(&self, comic_id: i64) -> MetadataResult<Vec<ComicPageRow>>;

    /// Insert or replace a page. Returns the previous image key when the
    /// replaced row pointed at a different blob, so the caller can reclaim it.
    async fn upsert_page(
        &self,
        comic_id: i64,
        page_index: i64,
        upload: &PageUpload,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<String>>;

    /// Delete a page row, returning its image key for reclamation.
    /// None: page did not exist.
    async fn delete_page(&self, comic_id: i64, page_index: i64) -> MetadataResult<Option<String>>;
}
