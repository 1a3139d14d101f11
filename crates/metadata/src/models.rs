//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// Book record.
///
/// `status` holds a `shelf_core::LifecycleState` string; `delete_at` is
/// non-null exactly while the status is `deleted`. All `source_*` fields are
/// null until a source file has been uploaded; `content` lives in the blob
/// store under `source_key`.
#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
    pub delete_at: Option<OffsetDateTime>,
    pub cover_key: Option<String>,
    pub source_key: Option<String>,
    pub source_name: Option<String>,
    pub source_type: Option<String>,
    pub source_size: Option<i64>,
    pub source_uploaded_at: Option<OffsetDateTime>,
    pub source_chapter_count: Option<i64>,
    pub source_word_count: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Book row joined with chapter aggregates, for the public listing.
#[derive(Debug, Clone, FromRow)]
pub struct BookSummaryRow {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_key: Option<String>,
    pub chapter_count: i64,
    pub total_words: i64,
    pub updated_at: OffsetDateTime,
}

/// Chapter record.
///
/// `content_key` is None while the chapter is awaiting content; the blob at
/// that key exists whenever the column is non-null.
#[derive(Debug, Clone, FromRow)]
pub struct ChapterRow {
    pub id: i64,
    pub book_id: i64,
    pub title: String,
    pub content_key: Option<String>,
    pub word_count: i64,
    pub sort_order: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Comic record. Shares the book lifecycle; `page_count` is the finalized
/// count, refreshed from `comic_pages` rows on demand.
#[derive(Debug, Clone, FromRow)]
pub struct ComicRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
    pub delete_at: Option<OffsetDateTime>,
    pub cover_key: Option<String>,
    pub page_count: i64,
    pub source_key: Option<String>,
    pub source_name: Option<String>,
    pub source_type: Option<String>,
    pub source_size: Option<i64>,
    pub source_uploaded_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Comic page record, keyed by (comic_id, page_index).
#[derive(Debug, Clone, FromRow)]
pub struct ComicPageRow {
    pub comic_id: i64,
    pub page_index: i64,
    pub image_key: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row counts removed by a purge, for sweep logging.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PurgedRows {
    pub chapters: u64,
    pub tags: u64,
    pub stats: u64,
    pub pages: u64,
}
