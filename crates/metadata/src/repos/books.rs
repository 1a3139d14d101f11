//! Book repository.

use crate::error::MetadataResult;
use crate::models::{BookRow, BookSummaryRow, PurgedRows};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Fields for a new book. Everything else starts null or `normal`.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
}

/// Source file metadata recorded after a successful blob write.
#[derive(Debug, Clone)]
pub struct SourceUpload {
    pub key: String,
    pub name: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub uploaded_at: OffsetDateTime,
}

/// Repository for book operations.
///
/// Lifecycle transitions are conditional single-row updates: they return
/// `false` when the row was not in the expected source state, which callers
/// map to a conflict rather than retrying.
#[async_trait]
pub trait BookRepo: Send + Sync {
    /// Insert a new book and return the stored row.
    async fn create_book(&self, book: &NewBook, now: OffsetDateTime) -> MetadataResult<BookRow>;

    /// Get a book by id, regardless of status.
    async fn get_book(&self, id: i64) -> MetadataResult<Option<BookRow>>;

    /// Public listing: `normal` books with chapter aggregates, newest first.
    async fn list_public_books(&self) -> MetadataResult<Vec<BookSummaryRow>>;

    /// Owner/admin listing: everything except `purging`. When `created_by`
    /// is Some, only that owner's books.
    async fn list_admin_books(&self, created_by: Option<i64>) -> MetadataResult<Vec<BookRow>>;

    /// Update title/author/description. Returns false if the book is missing.
    async fn update_book(
        &self,
        id: i64,
        title: &str,
        author: Option<&str>,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Point the book at a newly staged source blob, returning the previous
    /// source key so the caller can reclaim it. Returns None if the book is
    /// missing.
    async fn set_book_source(
        &self,
        id: i64,
        upload: &SourceUpload,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Option<String>>>;

    /// Backfill source counts. The outer Option means "field not provided,
    /// keep current value"; the inner None clears the column.
    async fn set_book_source_counts(
        &self,
        id: i64,
        chapter_count: Option<Option<i64>>,
        word_count: Option<Option<i64>>,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Point the book at a newly staged cover blob, returning the previous
    /// cover key.
    async fn set_book_cover(
        &self,
        id: i64,
        key: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Option<String>>>;

    /// Soft-delete: `normal` or `unlisted` -> `deleted`, stamping `delete_at`.
    /// Returns false if the book was not in a live state.
    async fn soft_delete_book(
        &self,
        id: i64,
        delete_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// `normal` -> `unlisted`.
    async fn unlist_book(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// `deleted` or `unlisted` -> `normal`, clearing `delete_at`.
    async fn restore_book(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Compare-and-swap claim for the sweep: `deleted` -> `purging`.
    /// Zero rows affected means another sweeper (or a restore) won the race.
    async fn claim_book_for_purge(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Ids of `deleted` books whose retention deadline has passed.
    async fn expired_deleted_books(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<i64>>;

    /// All blob keys owned by a book: source, cover, chapter texts.
    /// Collected before the rows go away.
    async fn collect_book_blob_keys(&self, id: i64) -> MetadataResult<Vec<String>>;

    /// Delete the book and its dependent rows in one transaction,
    /// children first.
    async fn purge_book_rows(&self, id: i64) -> MetadataResult<PurgedRows>;

    /// Replace the book's tag set.
    async fn set_book_tags(&self, id: i64, tags: &[String]) -> MetadataResult<()>;

    /// Tags in insertion order.
    async fn get_book_tags(&self, id: i64) -> MetadataResult<Vec<String>>;

    /// Bump the book's view counter.
    async fn record_book_view(&self, id: i64, now: OffsetDateTime) -> MetadataResult<()>;
}
