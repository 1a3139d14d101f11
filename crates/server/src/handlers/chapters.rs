//! Chapter endpoints, addressed by chapter id.
//!
//! Authorization always goes through the owning book: the chapter row names
//! its book, and edit rights on the book are edit rights on its chapters.

use crate::error::{ApiError, ApiResult};
use crate::guard::Actor;
use crate::handlers::common::{ensure_live, load_editable_book, word_count};
use crate::lifecycle::reclaim_replaced;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shelf_core::{keys, validate};
use shelf_metadata::models::ChapterRow;
use time::OffsetDateTime;

/// Admin view of a chapter.
#[derive(Debug, Serialize)]
pub struct ChapterDto {
    pub id: i64,
    pub book_id: i64,
    pub title: String,
    pub content_key: Option<String>,
    pub word_count: i64,
    pub sort_order: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ChapterRow> for ChapterDto {
    fn from(row: ChapterRow) -> Self {
        Self {
            id: row.id,
            book_id: row.book_id,
            title: row.title,
            content_key: row.content_key,
            word_count: row.word_count,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateChapterRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    /// The sibling chapter to trade places with.
    pub with: i64,
}

async fn load_editable_chapter(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> ApiResult<ChapterRow> {
    let chapter = state
        .metadata
        .get_chapter(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("chapter {id}")))?;
    let (_, status) = load_editable_book(state, actor, chapter.book_id).await?;
    ensure_live("book", status)?;
    Ok(chapter)
}

pub async fn update_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateChapterRequest>,
) -> ApiResult<Json<ChapterDto>> {
    let chapter = load_editable_chapter(&state, &actor, id).await?;
    if req.title.is_none() && req.content.is_none() {
        return Err(ApiError::BadRequest(
            "at least one of title or content is required".into(),
        ));
    }
    let now = OffsetDateTime::now_utc();

    if let Some(title) = &req.title {
        let title = validate::title(title)?;
        if !state.metadata.rename_chapter(id, &title, now).await? {
            return Err(ApiError::NotFound(format!("chapter {id}")));
        }
    }

    if let Some(content) = &req.content {
        validate::chapter_content(content)?;
        let words = word_count(content);
        let size = content.len() as u64;
        state.quota.check_capacity(size).await?;

        // Chapter content keys are deterministic, so the put overwrites the
        // previous text in place and commit order alone keeps the row and
        // blob consistent.
        let key = keys::chapter_text_key(chapter.book_id, id);
        state
            .storage
            .put(&key, Bytes::from(content.clone()))
            .await?;
        match state.metadata.set_chapter_content(id, &key, words, now).await? {
            None => return Err(ApiError::NotFound(format!("chapter {id}"))),
            Some(previous) => {
                if let Some(old_key) = previous {
                    if old_key != key {
                        reclaim_replaced(state.storage.as_ref(), &old_key).await;
                    }
                }
            }
        }
        state.quota.invalidate().await;
        tracing::info!(chapter_id = id, book_id = chapter.book_id, words, "stored chapter content");
    }

    let row = state
        .metadata
        .get_chapter(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("chapter {id}")))?;
    Ok(Json(ChapterDto::from(row)))
}

pub async fn delete_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let chapter = load_editable_chapter(&state, &actor, id).await?;
    match state.metadata.delete_chapter(id).await? {
        None => Err(ApiError::NotFound(format!("chapter {id}"))),
        Some(content_key) => {
            if let Some(key) = content_key {
                reclaim_replaced(state.storage.as_ref(), &key).await;
                state.quota.invalidate().await;
            }
            tracing::info!(chapter_id = id, book_id = chapter.book_id, "deleted chapter");
            Ok(Json(serde_json::json!({ "deleted": true })))
        }
    }
}

pub async fn swap_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<SwapRequest>,
) -> ApiResult<Json<Vec<ChapterDto>>> {
    let chapter = load_editable_chapter(&state, &actor, id).await?;
    if req.with == id {
        return Err(ApiError::BadRequest("cannot swap a chapter with itself".into()));
    }
    let swapped = state
        .metadata
        .swap_chapter_order(chapter.book_id, id, req.with)
        .await?;
    if !swapped {
        return Err(ApiError::NotFound(format!(
            "chapter {} is not a sibling of chapter {id}",
            req.with
        )));
    }
    let rows = state.metadata.list_chapters(chapter.book_id).await?;
    Ok(Json(rows.into_iter().map(ChapterDto::from).collect()))
}
