//! Metadata store trait and SQLite implementation.

use crate::error::MetadataResult;
use crate::repos::{BookRepo, ChapterRepo, ComicPageRepo, ComicRepo, SettingsRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    BookRepo + ChapterRepo + ComicRepo + ComicPageRepo + SettingsRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(db = %path.display(), "sqlite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        tracing::debug!("applying schema migrations");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT,
    description TEXT,
    created_by INTEGER,
    status TEXT NOT NULL DEFAULT 'normal',
    delete_at TEXT,
    cover_key TEXT,
    source_key TEXT,
    source_name TEXT,
    source_type TEXT,
    source_size INTEGER,
    source_uploaded_at TEXT,
    source_chapter_count INTEGER,
    source_word_count INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_status ON books(status);
CREATE INDEX IF NOT EXISTS idx_books_delete_at ON books(delete_at) WHERE delete_at IS NOT NULL;

CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id INTEGER NOT NULL REFERENCES books(id),
    title TEXT NOT NULL,
    content_key TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id, sort_order);

CREATE TABLE IF NOT EXISTS book_tags (
    book_id INTEGER NOT NULL REFERENCES books(id),
    position INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (book_id, tag)
);

CREATE TABLE IF NOT EXISTS book_stats (
    book_id INTEGER PRIMARY KEY,
    view_count INTEGER NOT NULL DEFAULT 0,
    last_viewed_at TEXT
);

CREATE TABLE IF NOT EXISTS chapter_stats (
    chapter_id INTEGER PRIMARY KEY,
    book_id INTEGER NOT NULL,
    view_count INTEGER NOT NULL DEFAULT 0,
    last_viewed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_chapter_stats_book ON chapter_stats(book_id);

CREATE TABLE IF NOT EXISTS comics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    created_by INTEGER,
    status TEXT NOT NULL DEFAULT 'normal',
    delete_at TEXT,
    cover_key TEXT,
    page_count INTEGER NOT NULL DEFAULT 0,
    source_key TEXT,
    source_name TEXT,
    source_type TEXT,
    source_size INTEGER,
    source_uploaded_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comics_status ON comics(status);
CREATE INDEX IF NOT EXISTS idx_comics_delete_at ON comics(delete_at) WHERE delete_at IS NOT NULL;

CREATE TABLE IF NOT EXISTS comic_pages (
    comic_id INTEGER NOT NULL REFERENCES comics(id),
    page_index INTEGER NOT NULL,
    image_key TEXT NOT NULL,
    width INTEGER,
    height INTEGER,
    size_bytes INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (comic_id, page_index)
);

CREATE TABLE IF NOT EXISTS site_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::books::{NewBook, SourceUpload};
    use crate::repos::comics::NewComic;
    use crate::repos::pages::PageUpload;
    use time::OffsetDateTime;

    #[async_trait]
    impl BookRepo for SqliteStore {
        async fn create_book(&self, book: &NewBook, now: OffsetDateTime) -> MetadataResult<BookRow> {
            let row = sqlx::query_as::<_, BookRow>(
                r#"
                INSERT INTO books (title, author, description, created_by, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, 'normal', ?, ?)
                RETURNING *
                "#,
            )
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.description)
            .bind(book.created_by)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_book(&self, id: i64) -> MetadataResult<Option<BookRow>> {
            let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_public_books(&self) -> MetadataResult<Vec<BookSummaryRow>> {
            let rows = sqlx::query_as::<_, BookSummaryRow>(
                r#"
                SELECT b.id, b.title, b.author, b.description, b.cover_key,
                       COUNT(c.id) AS chapter_count,
                       COALESCE(SUM(c.word_count), 0) AS total_words,
                       b.updated_at
                FROM books b
                LEFT JOIN chapters c ON c.book_id = b.id
                WHERE b.status = 'normal'
                GROUP BY b.id
                ORDER BY b.updated_at DESC, b.id DESC
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_admin_books(&self, created_by: Option<i64>) -> MetadataResult<Vec<BookRow>> {
            let rows = match created_by {
                Some(owner) => {
                    sqlx::query_as::<_, BookRow>(
                        "SELECT * FROM books WHERE status != 'purging' AND created_by = ? \
                         ORDER BY updated_at DESC, id DESC",
                    )
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, BookRow>(
                        "SELECT * FROM books WHERE status != 'purging' \
                         ORDER BY updated_at DESC, id DESC",
                    )
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn update_book(
            &self,
            id: i64,
            title: &str,
            author: Option<&str>,
            description: Option<&str>,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE books SET title = ?, author = ?, description = ?, updated_at = ? WHERE id = ?",
            )
            .bind(title)
            .bind(author)
            .bind(description)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn set_book_source(
            &self,
            id: i64,
            upload: &SourceUpload,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Option<String>>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<Option<String>> =
                sqlx::query_scalar("SELECT source_key FROM books WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(old_key) = old else {
                return Ok(None);
            };

            sqlx::query(
                r#"
                UPDATE books
                SET source_key = ?, source_name = ?, source_type = ?, source_size = ?,
                    source_uploaded_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&upload.key)
            .bind(&upload.name)
            .bind(&upload.content_type)
            .bind(upload.size)
            .bind(upload.uploaded_at)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(old_key))
        }

        async fn set_book_source_counts(
            &self,
            id: i64,
            chapter_count: Option<Option<i64>>,
            word_count: Option<Option<i64>>,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            // Only explicitly provided fields are written; absent fields keep
            // their current value.
            let mut sql = String::from("UPDATE books SET updated_at = ?");
            if chapter_count.is_some() {
                sql.push_str(", source_chapter_count = ?");
            }
            if word_count.is_some() {
                sql.push_str(", source_word_count = ?");
            }
            sql.push_str(" WHERE id = ?");

            let mut query = sqlx::query(&sql).bind(now);
            if let Some(value) = chapter_count {
                query = query.bind(value);
            }
            if let Some(value) = word_count {
                query = query.bind(value);
            }
            let result = query.bind(id).execute(&self.pool).await?;
            Ok(result.rows_affected() == 1)
        }

        async fn set_book_cover(
            &self,
            id: i64,
            key: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Option<String>>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<Option<String>> =
                sqlx::query_scalar("SELECT cover_key FROM books WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(old_key) = old else {
                return Ok(None);
            };

            sqlx::query("UPDATE books SET cover_key = ?, updated_at = ? WHERE id = ?")
                .bind(key)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(old_key))
        }

        async fn soft_delete_book(
            &self,
            id: i64,
            delete_at: OffsetDateTime,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE books SET status = 'deleted', delete_at = ?, updated_at = ? \
                 WHERE id = ? AND status IN ('normal', 'unlisted')",
            )
            .bind(delete_at)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn unlist_book(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE books SET status = 'unlisted', updated_at = ? \
                 WHERE id = ? AND status = 'normal'",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn restore_book(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE books SET status = 'normal', delete_at = NULL, updated_at = ? \
                 WHERE id = ? AND status IN ('deleted', 'unlisted')",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn claim_book_for_purge(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            // The sweep's compare-and-swap: only one claimant can move the row
            // out of 'deleted'. Zero rows affected is a benign race.
            let result = sqlx::query(
                "UPDATE books SET status = 'purging', updated_at = ? \
                 WHERE id = ? AND status = 'deleted'",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn expired_deleted_books(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<i64>> {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM books \
                 WHERE status = 'deleted' AND delete_at IS NOT NULL AND delete_at < ? \
                 ORDER BY delete_at LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }

        async fn collect_book_blob_keys(&self, id: i64) -> MetadataResult<Vec<String>> {
            let mut keys = Vec::new();

            let row: Option<(Option<String>, Option<String>)> =
                sqlx::query_as("SELECT source_key, cover_key FROM books WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((source_key, cover_key)) = row {
                keys.extend(source_key);
                keys.extend(cover_key);
            }

            let chapter_keys = sqlx::query_scalar::<_, String>(
                "SELECT content_key FROM chapters WHERE book_id = ? AND content_key IS NOT NULL",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
            keys.extend(chapter_keys);

            Ok(keys)
        }

        async fn purge_book_rows(&self, id: i64) -> MetadataResult<PurgedRows> {
            // Children before parent, one transaction: a crash mid-purge never
            // leaves orphaned child rows pointing at a vanished book.
            let mut tx = self.pool.begin().await?;

            let chapter_stats = sqlx::query("DELETE FROM chapter_stats WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let book_stats = sqlx::query("DELETE FROM book_stats WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let tags = sqlx::query("DELETE FROM book_tags WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let chapters = sqlx::query("DELETE FROM chapters WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM books WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(PurgedRows {
                chapters,
                tags,
                stats: chapter_stats + book_stats,
                pages: 0,
            })
        }

        async fn set_book_tags(&self, id: i64, tags: &[String]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM book_tags WHERE book_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for (position, tag) in tags.iter().enumerate() {
                sqlx::query("INSERT INTO book_tags (book_id, position, tag) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(position as i64)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_book_tags(&self, id: i64) -> MetadataResult<Vec<String>> {
            let tags = sqlx::query_scalar::<_, String>(
                "SELECT tag FROM book_tags WHERE book_id = ? ORDER BY position",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
            Ok(tags)
        }

        async fn record_book_view(&self, id: i64, now: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO book_stats (book_id, view_count, last_viewed_at) VALUES (?, 1, ?) \
                 ON CONFLICT(book_id) DO UPDATE SET \
                 view_count = view_count + 1, last_viewed_at = excluded.last_viewed_at",
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ChapterRepo for SqliteStore {
        async fn create_chapter(
            &self,
            book_id: i64,
            title: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<ChapterRow> {
            let mut tx = self.pool.begin().await?;

            let next_order: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM chapters WHERE book_id = ?",
            )
            .bind(book_id)
            .fetch_one(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, ChapterRow>(
                r#"
                INSERT INTO chapters (book_id, title, sort_order, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(book_id)
            .bind(title)
            .bind(next_order)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }

        async fn get_chapter(&self, id: i64) -> MetadataResult<Option<ChapterRow>> {
            let row = sqlx::query_as::<_, ChapterRow>("SELECT * FROM chapters WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_chapters(&self, book_id: i64) -> MetadataResult<Vec<ChapterRow>> {
            let rows = sqlx::query_as::<_, ChapterRow>(
                "SELECT * FROM chapters WHERE book_id = ? ORDER BY sort_order",
            )
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn set_chapter_content(
            &self,
            id: i64,
            content_key: &str,
            word_count: i64,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Option<String>>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<Option<String>> =
                sqlx::query_scalar("SELECT content_key FROM chapters WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(old_key) = old else {
                return Ok(None);
            };

            sqlx::query(
                "UPDATE chapters SET content_key = ?, word_count = ?, updated_at = ? WHERE id = ?",
            )
            .bind(content_key)
            .bind(word_count)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(old_key))
        }

        async fn rename_chapter(
            &self,
            id: i64,
            title: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query("UPDATE chapters SET title = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn delete_chapter(&self, id: i64) -> MetadataResult<Option<Option<String>>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<Option<String>> =
                sqlx::query_scalar("SELECT content_key FROM chapters WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(content_key) = old else {
                return Ok(None);
            };

            sqlx::query("DELETE FROM chapter_stats WHERE chapter_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chapters WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(content_key))
        }

        async fn swap_chapter_order(&self, book_id: i64, a: i64, b: i64) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let order_a: Option<i64> =
                sqlx::query_scalar("SELECT sort_order FROM chapters WHERE id = ? AND book_id = ?")
                    .bind(a)
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let order_b: Option<i64> =
                sqlx::query_scalar("SELECT sort_order FROM chapters WHERE id = ? AND book_id = ?")
                    .bind(b)
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let (Some(order_a), Some(order_b)) = (order_a, order_b) else {
                return Ok(false);
            };

            sqlx::query("UPDATE chapters SET sort_order = ? WHERE id = ?")
                .bind(order_b)
                .bind(a)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE chapters SET sort_order = ? WHERE id = ?")
                .bind(order_a)
                .bind(b)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(true)
        }

        async fn record_chapter_view(
            &self,
            id: i64,
            book_id: i64,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO chapter_stats (chapter_id, book_id, view_count, last_viewed_at) \
                 VALUES (?, ?, 1, ?) \
                 ON CONFLICT(chapter_id) DO UPDATE SET \
                 view_count = view_count + 1, last_viewed_at = excluded.last_viewed_at",
            )
            .bind(id)
            .bind(book_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ComicRepo for SqliteStore {
        async fn create_comic(
            &self,
            comic: &NewComic,
            now: OffsetDateTime,
        ) -> MetadataResult<ComicRow> {
            let row = sqlx::query_as::<_, ComicRow>(
                r#"
                INSERT INTO comics (title, description, created_by, status, created_at, updated_at)
                VALUES (?, ?, ?, 'normal', ?, ?)
                RETURNING *
                "#,
            )
            .bind(&comic.title)
            .bind(&comic.description)
            .bind(comic.created_by)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_comic(&self, id: i64) -> MetadataResult<Option<ComicRow>> {
            let row = sqlx::query_as::<_, ComicRow>("SELECT * FROM comics WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_public_comics(&self) -> MetadataResult<Vec<ComicRow>> {
            let rows = sqlx::query_as::<_, ComicRow>(
                "SELECT * FROM comics WHERE status = 'normal' ORDER BY updated_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_admin_comics(&self, created_by: Option<i64>) -> MetadataResult<Vec<ComicRow>> {
            let rows = match created_by {
                Some(owner) => {
                    sqlx::query_as::<_, ComicRow>(
                        "SELECT * FROM comics WHERE status != 'purging' AND created_by = ? \
                         ORDER BY updated_at DESC, id DESC",
                    )
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, ComicRow>(
                        "SELECT * FROM comics WHERE status != 'purging' \
                         ORDER BY updated_at DESC, id DESC",
                    )
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn update_comic(
            &self,
            id: i64,
            title: &str,
            description: Option<&str>,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET title = ?, description = ?, updated_at = ? WHERE id = ?",
            )
            .bind(title)
            .bind(description)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn set_comic_source(
            &self,
            id: i64,
            upload: &SourceUpload,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Option<String>>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<Option<String>> =
                sqlx::query_scalar("SELECT source_key FROM comics WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(old_key) = old else {
                return Ok(None);
            };

            sqlx::query(
                r#"
                UPDATE comics
                SET source_key = ?, source_name = ?, source_type = ?, source_size = ?,
                    source_uploaded_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&upload.key)
            .bind(&upload.name)
            .bind(&upload.content_type)
            .bind(upload.size)
            .bind(upload.uploaded_at)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(old_key))
        }

        async fn set_comic_cover_if_unset(
            &self,
            id: i64,
            key: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET cover_key = ?, updated_at = ? \
                 WHERE id = ? AND cover_key IS NULL",
            )
            .bind(key)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn soft_delete_comic(
            &self,
            id: i64,
            delete_at: OffsetDateTime,
            now: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET status = 'deleted', delete_at = ?, updated_at = ? \
                 WHERE id = ? AND status IN ('normal', 'unlisted')",
            )
            .bind(delete_at)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn unlist_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET status = 'unlisted', updated_at = ? \
                 WHERE id = ? AND status = 'normal'",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn restore_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET status = 'normal', delete_at = NULL, updated_at = ? \
                 WHERE id = ? AND status IN ('deleted', 'unlisted')",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn claim_comic_for_purge(&self, id: i64, now: OffsetDateTime) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE comics SET status = 'purging', updated_at = ? \
                 WHERE id = ? AND status = 'deleted'",
            )
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn expired_deleted_comics(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<i64>> {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM comics \
                 WHERE status = 'deleted' AND delete_at IS NOT NULL AND delete_at < ? \
                 ORDER BY delete_at LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(ids)
        }

        async fn collect_comic_blob_keys(&self, id: i64) -> MetadataResult<Vec<String>> {
            let mut keys = Vec::new();

            let row: Option<(Option<String>, Option<String>)> =
                sqlx::query_as("SELECT source_key, cover_key FROM comics WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((source_key, cover_key)) = row {
                keys.extend(source_key);
                keys.extend(cover_key);
            }

            let page_keys = sqlx::query_scalar::<_, String>(
                "SELECT image_key FROM comic_pages WHERE comic_id = ?",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
            // The cover may be one of the page blobs; dedupe so the sweep
            // doesn't report a spurious missing-blob on the second delete.
            for key in page_keys {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }

            Ok(keys)
        }

        async fn purge_comic_rows(&self, id: i64) -> MetadataResult<PurgedRows> {
            let mut tx = self.pool.begin().await?;

            let pages = sqlx::query("DELETE FROM comic_pages WHERE comic_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM comics WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(PurgedRows {
                pages,
                ..Default::default()
            })
        }

        async fn finalize_comic(&self, id: i64, now: OffsetDateTime) -> MetadataResult<Option<i64>> {
            let count: Option<i64> = sqlx::query_scalar(
                "UPDATE comics \
                 SET page_count = (SELECT COUNT(*) FROM comic_pages WHERE comic_id = ?), \
                     updated_at = ? \
                 WHERE id = ? \
                 RETURNING page_count",
            )
            .bind(id)
            .bind(now)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl ComicPageRepo for SqliteStore {
        async fn get_page(
            &self,
            comic_id: i64,
            page_index: i64,
        ) -> MetadataResult<Option<ComicPageRow>> {
            let row = sqlx::query_as::<_, ComicPageRow>(
                "SELECT * FROM comic_pages WHERE comic_id = ? AND page_index = ?",
            )
            .bind(comic_id)
            .bind(page_index)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_pages(&self, comic_id: i64) -> MetadataResult<Vec<ComicPageRow>> {
            let rows = sqlx::query_as::<_, ComicPageRow>(
                "SELECT * FROM comic_pages WHERE comic_id = ? ORDER BY page_index",
            )
            .bind(comic_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn upsert_page(
            &self,
            comic_id: i64,
            page_index: i64,
            upload: &PageUpload,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<String>> {
            let mut tx = self.pool.begin().await?;

            let old: Option<String> = sqlx::query_scalar(
                "SELECT image_key FROM comic_pages WHERE comic_id = ? AND page_index = ?",
            )
            .bind(comic_id)
            .bind(page_index)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO comic_pages
                    (comic_id, page_index, image_key, width, height, size_bytes, content_type,
                     created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(comic_id, page_index) DO UPDATE SET
                    image_key = excluded.image_key,
                    width = excluded.width,
                    height = excluded.height,
                    size_bytes = excluded.size_bytes,
                    content_type = excluded.content_type,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(comic_id)
            .bind(page_index)
            .bind(&upload.image_key)
            .bind(upload.width)
            .bind(upload.height)
            .bind(upload.size_bytes)
            .bind(&upload.content_type)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            // A re-upload with the same extension reuses the key; only a
            // genuinely different old blob needs reclaiming.
            Ok(old.filter(|k| k != &upload.image_key))
        }

        async fn delete_page(
            &self,
            comic_id: i64,
            page_index: i64,
        ) -> MetadataResult<Option<String>> {
            let key: Option<String> = sqlx::query_scalar(
                "DELETE FROM comic_pages WHERE comic_id = ? AND page_index = ? \
                 RETURNING image_key",
            )
            .bind(comic_id)
            .bind(page_index)
            .fetch_optional(&self.pool)
            .await?;
            Ok(key)
        }
    }

    #[async_trait]
    impl SettingsRepo for SqliteStore {
        async fn get_setting(&self, key: &str) -> MetadataResult<Option<String>> {
            let value =
                sqlx::query_scalar::<_, String>("SELECT value FROM site_settings WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(value)
        }

        async fn set_setting(
            &self,
            key: &str,
            value: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO site_settings (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET \
                 value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_setting(&self, key: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM site_settings WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() == 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::books::{NewBook, SourceUpload};
    use crate::repos::comics::NewComic;
    use crate::repos::pages::PageUpload;
    use time::OffsetDateTime;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("shelf.db")).await.unwrap();
        (dir, store)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sample_book() -> NewBook {
        NewBook {
            title: "Dune".to_string(),
            author: Some("Frank Herbert".to_string()),
            description: None,
            created_by: Some(1),
        }
    }

    #[tokio::test]
    async fn create_and_get_book() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        assert_eq!(book.status, "normal");
        assert!(book.delete_at.is_none());
        assert!(book.source_key.is_none());

        let fetched = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Dune");
    }

    #[tokio::test]
    async fn lifecycle_transitions_are_conditional() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        // unlist only from normal
        assert!(store.unlist_book(book.id, now()).await.unwrap());
        assert!(!store.unlist_book(book.id, now()).await.unwrap());

        // soft delete from unlisted
        assert!(store.soft_delete_book(book.id, now(), now()).await.unwrap());
        // already deleted: rejected
        assert!(!store.soft_delete_book(book.id, now(), now()).await.unwrap());

        // restore clears delete_at
        assert!(store.restore_book(book.id, now()).await.unwrap());
        let restored = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(restored.status, "normal");
        assert!(restored.delete_at.is_none());
    }

    #[tokio::test]
    async fn purge_claim_requires_deleted_state() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        assert!(!store.claim_book_for_purge(book.id, now()).await.unwrap());

        store.soft_delete_book(book.id, now(), now()).await.unwrap();
        assert!(store.claim_book_for_purge(book.id, now()).await.unwrap());
        // second claim loses the race
        assert!(!store.claim_book_for_purge(book.id, now()).await.unwrap());

        // purging is terminal: restore must fail
        assert!(!store.restore_book(book.id, now()).await.unwrap());
    }

    #[tokio::test]
    async fn expired_deleted_respects_deadline() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        let future = now() + time::Duration::days(30);
        store
            .soft_delete_book(book.id, future, now())
            .await
            .unwrap();
        assert!(store.expired_deleted_books(now(), 10).await.unwrap().is_empty());

        let past = now() - time::Duration::days(1);
        let book2 = store.create_book(&sample_book(), now()).await.unwrap();
        store.soft_delete_book(book2.id, past, now()).await.unwrap();
        assert_eq!(
            store.expired_deleted_books(now(), 10).await.unwrap(),
            vec![book2.id]
        );
    }

    #[tokio::test]
    async fn collect_blob_keys_and_purge_rows() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        store
            .set_book_source(
                book.id,
                &SourceUpload {
                    key: format!("sources/books/{}/1000-dune.epub", book.id),
                    name: "dune.epub".to_string(),
                    content_type: Some("application/epub+zip".to_string()),
                    size: 100,
                    uploaded_at: now(),
                },
                now(),
            )
            .await
            .unwrap();
        store
            .set_book_cover(book.id, &format!("covers/{}.jpg", book.id), now())
            .await
            .unwrap();
        let ch = store.create_chapter(book.id, "One", now()).await.unwrap();
        store
            .set_chapter_content(
                ch.id,
                &format!("novels/books/{}/chapters/{}.txt", book.id, ch.id),
                42,
                now(),
            )
            .await
            .unwrap();
        store
            .set_book_tags(book.id, &["sci-fi".to_string()])
            .await
            .unwrap();
        store.record_book_view(book.id, now()).await.unwrap();
        store.record_chapter_view(ch.id, book.id, now()).await.unwrap();

        let keys = store.collect_book_blob_keys(book.id).await.unwrap();
        assert_eq!(keys.len(), 3);

        let purged = store.purge_book_rows(book.id).await.unwrap();
        assert_eq!(purged.chapters, 1);
        assert_eq!(purged.tags, 1);
        assert_eq!(purged.stats, 2);
        assert!(store.get_book(book.id).await.unwrap().is_none());
        assert!(store.get_chapter(ch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn source_replace_returns_old_key() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        let first = SourceUpload {
            key: "sources/books/1/1000-a.epub".to_string(),
            name: "a.epub".to_string(),
            content_type: None,
            size: 10,
            uploaded_at: now(),
        };
        let old = store.set_book_source(book.id, &first, now()).await.unwrap();
        assert_eq!(old, Some(None));

        let second = SourceUpload {
            key: "sources/books/1/2000-b.epub".to_string(),
            ..first.clone()
        };
        let old = store.set_book_source(book.id, &second, now()).await.unwrap();
        assert_eq!(old, Some(Some(first.key)));

        // missing book
        assert_eq!(store.set_book_source(9999, &second, now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn source_counts_only_touch_provided_fields() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        store
            .set_book_source_counts(book.id, Some(Some(12)), Some(Some(90_000)), now())
            .await
            .unwrap();
        let b = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(b.source_chapter_count, Some(12));
        assert_eq!(b.source_word_count, Some(90_000));

        // absent chapter_count keeps its value; explicit null clears words
        store
            .set_book_source_counts(book.id, None, Some(None), now())
            .await
            .unwrap();
        let b = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(b.source_chapter_count, Some(12));
        assert_eq!(b.source_word_count, None);
    }

    #[tokio::test]
    async fn chapters_append_and_swap() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        let c1 = store.create_chapter(book.id, "One", now()).await.unwrap();
        let c2 = store.create_chapter(book.id, "Two", now()).await.unwrap();
        assert!(c1.sort_order < c2.sort_order);
        assert!(c1.content_key.is_none());

        assert!(store.swap_chapter_order(book.id, c1.id, c2.id).await.unwrap());
        let listed = store.list_chapters(book.id).await.unwrap();
        assert_eq!(listed[0].id, c2.id);

        // chapter from another book can't be swapped in
        let other = store.create_book(&sample_book(), now()).await.unwrap();
        let c3 = store.create_chapter(other.id, "X", now()).await.unwrap();
        assert!(!store.swap_chapter_order(book.id, c1.id, c3.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_chapter_returns_content_key() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();
        let ch = store.create_chapter(book.id, "One", now()).await.unwrap();

        // no content yet
        assert_eq!(store.delete_chapter(ch.id).await.unwrap(), Some(None));
        assert_eq!(store.delete_chapter(ch.id).await.unwrap(), None);

        let ch = store.create_chapter(book.id, "Two", now()).await.unwrap();
        store
            .set_chapter_content(ch.id, "novels/books/1/chapters/2.txt", 5, now())
            .await
            .unwrap();
        assert_eq!(
            store.delete_chapter(ch.id).await.unwrap(),
            Some(Some("novels/books/1/chapters/2.txt".to_string()))
        );
    }

    #[tokio::test]
    async fn public_listing_excludes_hidden_and_aggregates() {
        let (_dir, store) = test_store().await;
        let visible = store.create_book(&sample_book(), now()).await.unwrap();
        let hidden = store.create_book(&sample_book(), now()).await.unwrap();
        store.unlist_book(hidden.id, now()).await.unwrap();

        let ch = store.create_chapter(visible.id, "One", now()).await.unwrap();
        store
            .set_chapter_content(ch.id, "novels/books/1/chapters/1.txt", 250, now())
            .await
            .unwrap();

        let listed = store.list_public_books().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, visible.id);
        assert_eq!(listed[0].chapter_count, 1);
        assert_eq!(listed[0].total_words, 250);

        // owner listing still shows the unlisted book
        let admin = store.list_admin_books(None).await.unwrap();
        assert_eq!(admin.len(), 2);
    }

    #[tokio::test]
    async fn page_upsert_and_cover_if_unset() {
        let (_dir, store) = test_store().await;
        let comic = store
            .create_comic(
                &NewComic {
                    title: "Akira".to_string(),
                    description: None,
                    created_by: Some(1),
                },
                now(),
            )
            .await
            .unwrap();

        let upload = PageUpload {
            image_key: format!("comics/{}/pages/0001.jpg", comic.id),
            width: None,
            height: None,
            size_bytes: 1000,
            content_type: "image/jpeg".to_string(),
        };
        let old = store.upsert_page(comic.id, 1, &upload, now()).await.unwrap();
        assert!(old.is_none());

        // same key again: nothing to reclaim
        let old = store.upsert_page(comic.id, 1, &upload, now()).await.unwrap();
        assert!(old.is_none());

        // different extension: old key comes back for reclamation
        let png = PageUpload {
            image_key: format!("comics/{}/pages/0001.png", comic.id),
            content_type: "image/png".to_string(),
            ..upload.clone()
        };
        let old = store.upsert_page(comic.id, 1, &png, now()).await.unwrap();
        assert_eq!(old, Some(upload.image_key.clone()));

        // cover claimed once
        assert!(store
            .set_comic_cover_if_unset(comic.id, &png.image_key, now())
            .await
            .unwrap());
        assert!(!store
            .set_comic_cover_if_unset(comic.id, "other", now())
            .await
            .unwrap());

        let count = store.finalize_comic(comic.id, now()).await.unwrap();
        assert_eq!(count, Some(1));

        assert_eq!(
            store.delete_page(comic.id, 1).await.unwrap(),
            Some(png.image_key)
        );
        assert_eq!(store.delete_page(comic.id, 1).await.unwrap(), None);
        assert_eq!(store.finalize_comic(comic.id, now()).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn comic_blob_keys_dedupe_cover() {
        let (_dir, store) = test_store().await;
        let comic = store
            .create_comic(
                &NewComic {
                    title: "Akira".to_string(),
                    description: None,
                    created_by: None,
                },
                now(),
            )
            .await
            .unwrap();

        let key = format!("comics/{}/pages/0001.jpg", comic.id);
        store
            .upsert_page(
                comic.id,
                1,
                &PageUpload {
                    image_key: key.clone(),
                    width: None,
                    height: None,
                    size_bytes: 10,
                    content_type: "image/jpeg".to_string(),
                },
                now(),
            )
            .await
            .unwrap();
        store
            .set_comic_cover_if_unset(comic.id, &key, now())
            .await
            .unwrap();

        let keys = store.collect_comic_blob_keys(comic.id).await.unwrap();
        assert_eq!(keys, vec![key]);
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let (_dir, store) = test_store().await;

        assert!(store.get_setting("storage_limit_bytes").await.unwrap().is_none());
        store
            .set_setting("storage_limit_bytes", "1048576", now())
            .await
            .unwrap();
        assert_eq!(
            store.get_setting("storage_limit_bytes").await.unwrap().as_deref(),
            Some("1048576")
        );
        store
            .set_setting("storage_limit_bytes", "2097152", now())
            .await
            .unwrap();
        assert_eq!(
            store.get_setting("storage_limit_bytes").await.unwrap().as_deref(),
            Some("2097152")
        );
        assert!(store.delete_setting("storage_limit_bytes").await.unwrap());
        assert!(!store.delete_setting("storage_limit_bytes").await.unwrap());
    }

    #[tokio::test]
    async fn tags_replace_preserving_order() {
        let (_dir, store) = test_store().await;
        let book = store.create_book(&sample_book(), now()).await.unwrap();

        store
            .set_book_tags(book.id, &["zeta".to_string(), "alpha".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get_book_tags(book.id).await.unwrap(), vec!["zeta", "alpha"]);

        store.set_book_tags(book.id, &["one".to_string()]).await.unwrap();
        assert_eq!(store.get_book_tags(book.id).await.unwrap(), vec!["one"]);
    }
}
