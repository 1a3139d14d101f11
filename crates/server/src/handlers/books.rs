//! Book endpoints: public reads plus the admin lifecycle and upload surface.

use crate::error::{ApiError, ApiResult};
use crate::gc;
use crate::guard::Actor;
use crate::handlers::chapters::ChapterDto;
use crate::handlers::common::{
    check_upload_size, content_type, declared_file_size, double_option, ensure_live,
    load_book, load_editable_book, load_visible_book, mime_for_key, require_editor,
    require_image_content_type, require_super_admin, required_file_name,
};
use crate::lifecycle::{discard_staged, reclaim_replaced, retention_deadline};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shelf_core::{keys, validate, MAX_COVER_BYTES, MAX_SOURCE_BYTES};
use shelf_metadata::models::{BookRow, BookSummaryRow};
use shelf_metadata::repos::{NewBook, SourceUpload};
use std::sync::Arc;
use time::OffsetDateTime;

/// Public listing entry. Blob keys stay internal; the cover is reachable
/// through its own endpoint.
#[derive(Debug, Serialize)]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub has_cover: bool,
    pub chapter_count: i64,
    pub total_words: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<BookSummaryRow> for BookSummary {
    fn from(row: BookSummaryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            has_cover: row.cover_key.is_some(),
            chapter_count: row.chapter_count,
            total_words: row.total_words,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterListItem {
    pub id: i64,
    pub title: String,
    pub word_count: i64,
    pub sort_order: i64,
    pub has_content: bool,
}

#[derive(Debug, Serialize)]
pub struct BookDetail {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub has_cover: bool,
    pub tags: Vec<String>,
    pub chapters: Vec<ChapterListItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Admin view of a book, blob keys included.
#[derive(Debug, Serialize)]
pub struct AdminBook {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub delete_at: Option<OffsetDateTime>,
    pub cover_key: Option<String>,
    pub source_key: Option<String>,
    pub source_name: Option<String>,
    pub source_type: Option<String>,
    pub source_size: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub source_uploaded_at: Option<OffsetDateTime>,
    pub source_chapter_count: Option<i64>,
    pub source_word_count: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<BookRow> for AdminBook {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            created_by: row.created_by,
            status: row.status,
            delete_at: row.delete_at,
            cover_key: row.cover_key,
            source_key: row.source_key,
            source_name: row.source_name,
            source_type: row.source_type,
            source_size: row.source_size,
            source_uploaded_at: row.source_uploaded_at,
            source_chapter_count: row.source_chapter_count,
            source_word_count: row.source_word_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BookFields {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Unlist,
    Restore,
    Purge,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: LifecycleAction,
}

#[derive(Debug, Deserialize)]
pub struct SourceMetaRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub chapter_count: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub word_count: Option<Option<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct TagsRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChapterRequest {
    pub title: String,
}

fn validated_fields(req: &BookFields) -> ApiResult<(String, Option<String>, Option<String>)> {
    let title = validate::title(&req.title)?;
    let author = match &req.author {
        Some(a) => validate::author(a)?,
        None => None,
    };
    let description = match &req.description {
        Some(d) => validate::description(d)?,
        None => None,
    };
    Ok((title, author, description))
}

// ---- Public endpoints ----

pub async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Vec<BookSummary>>> {
    let rows = state.metadata.list_public_books().await?;
    Ok(Json(rows.into_iter().map(BookSummary::from).collect()))
}

pub async fn get_book(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BookDetail>> {
    let (row, _) = load_visible_book(&state, &actor, id).await?;
    let tags = state.metadata.get_book_tags(id).await?;
    let chapters = state.metadata.list_chapters(id).await?;

    let metadata = Arc::clone(&state.metadata);
    tokio::spawn(async move {
        if let Err(e) = metadata.record_book_view(id, OffsetDateTime::now_utc()).await {
            tracing::debug!(book_id = id, error = %e, "failed to record book view");
        }
    });

    Ok(Json(BookDetail {
        id: row.id,
        title: row.title,
        author: row.author,
        description: row.description,
        status: row.status,
        has_cover: row.cover_key.is_some(),
        tags,
        chapters: chapters
            .into_iter()
            .map(|c| ChapterListItem {
                id: c.id,
                title: c.title,
                word_count: c.word_count,
                sort_order: c.sort_order,
                has_content: c.content_key.is_some(),
            })
            .collect(),
        updated_at: row.updated_at,
    }))
}

pub async fn get_cover(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (row, _) = load_visible_book(&state, &actor, id).await?;
    let key = row
        .cover_key
        .ok_or_else(|| ApiError::NotFound(format!("book {id} has no cover")))?;
    let data = state.storage.get(&key).await?;
    Ok(([(header::CONTENT_TYPE, mime_for_key(&key))], data))
}

#[derive(Debug, Serialize)]
pub struct ChapterContent {
    pub id: i64,
    pub book_id: i64,
    pub title: String,
    pub word_count: i64,
    pub content: String,
}

pub async fn get_chapter_content(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, chapter_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ChapterContent>> {
    let _ = load_visible_book(&state, &actor, id).await?;
    let chapter = state
        .metadata
        .get_chapter(chapter_id)
        .await?
        .filter(|c| c.book_id == id)
        .ok_or_else(|| ApiError::NotFound(format!("chapter {chapter_id}")))?;
    let key = chapter
        .content_key
        .ok_or_else(|| ApiError::NotFound(format!("chapter {chapter_id} has no content")))?;
    let data = state.storage.get(&key).await?;
    let content = String::from_utf8(data.to_vec())
        .map_err(|_| ApiError::Internal(format!("chapter blob {key} is not valid UTF-8")))?;

    let metadata = Arc::clone(&state.metadata);
    tokio::spawn(async move {
        let now = OffsetDateTime::now_utc();
        if let Err(e) = metadata.record_chapter_view(chapter_id, id, now).await {
            tracing::debug!(chapter_id, error = %e, "failed to record chapter view");
        }
    });

    Ok(Json(ChapterContent {
        id: chapter.id,
        book_id: chapter.book_id,
        title: chapter.title,
        word_count: chapter.word_count,
        content,
    }))
}

// ---- Admin endpoints ----

pub async fn admin_list_books(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<AdminBook>>> {
    require_editor(&actor)?;
    let created_by = if actor.is_privileged() {
        None
    } else {
        Some(actor.user_id.ok_or_else(|| {
            ApiError::Forbidden("editor identity required for owner listing".into())
        })?)
    };
    let rows = state.metadata.list_admin_books(created_by).await?;
    Ok(Json(rows.into_iter().map(AdminBook::from).collect()))
}

pub async fn create_book(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<BookFields>,
) -> ApiResult<impl IntoResponse> {
    require_editor(&actor)?;
    let (title, author, description) = validated_fields(&req)?;
    let book = NewBook {
        title,
        author,
        description,
        created_by: actor.user_id,
    };
    let row = state
        .metadata
        .create_book(&book, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(book_id = row.id, "created book");
    Ok((StatusCode::CREATED, Json(AdminBook::from(row))))
}

pub async fn update_book(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<BookFields>,
) -> ApiResult<Json<AdminBook>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;
    let (title, author, description) = validated_fields(&req)?;
    let updated = state
        .metadata
        .update_book(
            id,
            &title,
            author.as_deref(),
            description.as_deref(),
            OffsetDateTime::now_utc(),
        )
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("book {id}")));
    }
    let (row, _) = load_book(&state, id).await?;
    Ok(Json(AdminBook::from(row)))
}

pub async fn delete_book(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AdminBook>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    let now = OffsetDateTime::now_utc();
    let delete_at = retention_deadline(now, &state.config.gc);
    if !state.metadata.soft_delete_book(id, delete_at, now).await? {
        return Err(ApiError::Conflict(format!(
            "cannot delete book in state {status}"
        )));
    }
    tracing::info!(book_id = id, %delete_at, "soft-deleted book");
    let (row, _) = load_book(&state, id).await?;
    Ok(Json(AdminBook::from(row)))
}

pub async fn book_action(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<axum::response::Response> {
    let now = OffsetDateTime::now_utc();
    match req.action {
        LifecycleAction::Unlist => {
            let (_, status) = load_editable_book(&state, &actor, id).await?;
            if !state.metadata.unlist_book(id, now).await? {
                return Err(ApiError::Conflict(format!(
                    "cannot unlist book in state {status}"
                )));
            }
            let (row, _) = load_book(&state, id).await?;
            Ok(Json(AdminBook::from(row)).into_response())
        }
        LifecycleAction::Restore => {
            let (_, status) = load_editable_book(&state, &actor, id).await?;
            if !state.metadata.restore_book(id, now).await? {
                return Err(ApiError::Conflict(format!(
                    "cannot restore book in state {status}"
                )));
            }
            let (row, _) = load_book(&state, id).await?;
            Ok(Json(AdminBook::from(row)).into_response())
        }
        LifecycleAction::Purge => {
            require_super_admin(&actor)?;
            let _ = load_book(&state, id).await?;
            let report = gc::purge_book(state.metadata.as_ref(), state.storage.as_ref(), id, now)
                .await?
                .ok_or_else(|| {
                    ApiError::Conflict(format!("book {id} is not in the deleted state"))
                })?;
            state.quota.invalidate().await;
            Ok(Json(report).into_response())
        }
    }
}

pub async fn upload_source(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AdminBook>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;

    let file_name = required_file_name(&headers)?;
    let declared = declared_file_size(&headers)?;
    let size = body.len() as u64;
    check_upload_size("source file", declared, size, MAX_SOURCE_BYTES)?;
    state.quota.check_capacity(size).await?;

    let now = OffsetDateTime::now_utc();
    let key = keys::book_source_key(id, &file_name, now);
    state.storage.put(&key, body).await?;

    let upload = SourceUpload {
        key: key.clone(),
        name: file_name,
        content_type: content_type(&headers),
        size: size as i64,
        uploaded_at: now,
    };
    match state.metadata.set_book_source(id, &upload, now).await? {
        None => {
            discard_staged(state.storage.as_ref(), &key).await;
            return Err(ApiError::NotFound(format!("book {id}")));
        }
        Some(previous) => {
            if let Some(old_key) = previous {
                if old_key != key {
                    reclaim_replaced(state.storage.as_ref(), &old_key).await;
                }
            }
        }
    }
    state.quota.invalidate().await;
    tracing::info!(book_id = id, key, size, "stored book source");

    let (row, _) = load_book(&state, id).await?;
    Ok(Json(AdminBook::from(row)))
}

pub async fn update_source_meta(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<SourceMetaRequest>,
) -> ApiResult<Json<AdminBook>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;
    if let Some(Some(n)) = req.chapter_count {
        validate::non_negative_count("chapter_count", n)?;
    }
    if let Some(Some(n)) = req.word_count {
        validate::non_negative_count("word_count", n)?;
    }
    let updated = state
        .metadata
        .set_book_source_counts(id, req.chapter_count, req.word_count, OffsetDateTime::now_utc())
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("book {id}")));
    }
    let (row, _) = load_book(&state, id).await?;
    Ok(Json(AdminBook::from(row)))
}

pub async fn upload_cover(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AdminBook>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;

    let ct = require_image_content_type(&headers)?;
    let declared = declared_file_size(&headers)?;
    let size = body.len() as u64;
    check_upload_size("cover image", declared, size, MAX_COVER_BYTES)?;
    state.quota.check_capacity(size).await?;

    let orig_name = headers
        .get(crate::handlers::common::FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ext = keys::guess_image_ext(&ct, orig_name);
    let now = OffsetDateTime::now_utc();
    let key = keys::cover_key(id, ext);
    state.storage.put(&key, body).await?;

    match state.metadata.set_book_cover(id, &key, now).await? {
        None => {
            discard_staged(state.storage.as_ref(), &key).await;
            return Err(ApiError::NotFound(format!("book {id}")));
        }
        Some(previous) => {
            // The key embeds the extension, so a same-format re-upload
            // overwrites in place and there is nothing to reclaim.
            if let Some(old_key) = previous {
                if old_key != key {
                    reclaim_replaced(state.storage.as_ref(), &old_key).await;
                }
            }
        }
    }
    state.quota.invalidate().await;

    let (row, _) = load_book(&state, id).await?;
    Ok(Json(AdminBook::from(row)))
}

pub async fn set_tags(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<TagsRequest>,
) -> ApiResult<Json<TagsResponse>> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;
    let tags = validate::tags(&req.tags)?;
    state.metadata.set_book_tags(id, &tags).await?;
    Ok(Json(TagsResponse { tags }))
}

pub async fn create_chapter(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<CreateChapterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_, status) = load_editable_book(&state, &actor, id).await?;
    ensure_live("book", status)?;
    let title = validate::title(&req.title)?;
    let row = state
        .metadata
        .create_chapter(id, &title, OffsetDateTime::now_utc())
        .await?;
    Ok((StatusCode::CREATED, Json(ChapterDto::from(row))))
}
