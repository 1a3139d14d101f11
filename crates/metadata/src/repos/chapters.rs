//! Chapter repository.

use crate::error::MetadataResult;
use crate::models::ChapterRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for chapter operations.
#[async_trait]
pub trait ChapterRepo: Send + Sync {
    /// Insert a chapter awaiting content, appended at the end of the book's
    /// sort order.
    async fn create_chapter(
        &self,
        book_id: i64,
        title: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<ChapterRow>;

    /// Get a chapter by id.
    async fn get_chapter(&self, id: i64) -> MetadataResult<Option<ChapterRow>>;

    /// Chapters of a book, ordered by sort_order.
    async fn list_chapters(&self, book_id: i64) -> MetadataResult<Vec<ChapterRow>>;

    /// Point the chapter at a newly staged content blob, returning the
    /// previous content key (inner None: chapter had no content yet).
    /// Outer None: chapter missing.
    async fn set_chapter_content(
        &self,
        id: i64,
        content_key: &str,
        word_count: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Option<String>>>;

    /// Rename a chapter.
    async fn rename_chapter(&self, id: i64, title: &str, now: OffsetDateTime)
        -> MetadataResult<bool>;

    /// Delete the chapter row (and its stats), returning the content key the
    /// caller must reclaim. Outer None: chapter missing.
    async fn delete_chapter(&self, id: i64) -> MetadataResult<Option<Option<String>>>;

    /// Swap sort_order between two chapters of the same book, atomically.
    /// Returns false if either chapter is missing or belongs elsewhere.
    async fn swap_chapter_order(&self, book_id: i64, a: i64, b: i64) -> MetadataResult<bool>;

    /// Bump the chapter's view counter.
    async fn record_chapter_view(
        &self,
        id: i64,
        book_id: i64,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;
}
