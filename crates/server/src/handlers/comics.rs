//! Comic endpoints: public reads plus the admin lifecycle, page uploads and
//! finalization.

use crate::error::{ApiError, ApiResult};
use crate::gc;
use crate::guard::Actor;
use crate::handlers::common::{
    check_upload_size, content_type, declared_file_size, ensure_live, load_comic,
    load_editable_comic, load_visible_comic, require_editor, require_image_content_type,
    require_super_admin, required_file_name, FILE_NAME_HEADER,
};
use crate::handlers::books::{ActionRequest, LifecycleAction};
use crate::lifecycle::{discard_staged, reclaim_replaced, retention_deadline};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shelf_core::{keys, validate, MAX_PAGE_BYTES, MAX_SOURCE_BYTES};
use shelf_metadata::models::{ComicPageRow, ComicRow};
use shelf_metadata::repos::{NewComic, PageUpload, SourceUpload};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct PageItem {
    pub page_index: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub size_bytes: i64,
    pub content_type: String,
}

impl From<ComicPageRow> for PageItem {
    fn from(row: ComicPageRow) -> Self {
        Self {
            page_index: row.page_index,
            width: row.width,
            height: row.height,
            size_bytes: row.size_bytes,
            content_type: row.content_type,
        }
    }
}

/// Public listing entry / detail header.
#[derive(Debug, Serialize)]
pub struct ComicSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub has_cover: bool,
    pub page_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ComicRow> for ComicSummary {
    fn from(row: ComicRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            has_cover: row.cover_key.is_some(),
            page_count: row.page_count,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ComicDetail {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub has_cover: bool,
    pub page_count: i64,
    pub pages: Vec<PageItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Admin view of a comic, blob keys included.
#[derive(Debug, Serialize)]
pub struct AdminComic {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub delete_at: Option<OffsetDateTime>,
    pub cover_key: Option<String>,
    pub page_count: i64,
    pub source_key: Option<String>,
    pub source_name: Option<String>,
    pub source_type: Option<String>,
    pub source_size: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub source_uploaded_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ComicRow> for AdminComic {
    fn from(row: ComicRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            created_by: row.created_by,
            status: row.status,
            delete_at: row.delete_at,
            cover_key: row.cover_key,
            page_count: row.page_count,
            source_key: row.source_key,
            source_name: row.source_name,
            source_type: row.source_type,
            source_size: row.source_size,
            source_uploaded_at: row.source_uploaded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ComicFields {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn validated_fields(req: &ComicFields) -> ApiResult<(String, Option<String>)> {
    let title = validate::title(&req.title)?;
    let description = match &req.description {
        Some(d) => validate::description(d)?,
        None => None,
    };
    Ok((title, description))
}

fn optional_i64_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
}

// ---- Public endpoints ----

pub async fn list_comics(State(state): State<AppState>) -> ApiResult<Json<Vec<ComicSummary>>> {
    let rows = state.metadata.list_public_comics().await?;
    Ok(Json(rows.into_iter().map(ComicSummary::from).collect()))
}

pub async fn get_comic(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ComicDetail>> {
    let (row, _) = load_visible_comic(&state, &actor, id).await?;
    let pages = state.metadata.list_pages(id).await?;
    Ok(Json(ComicDetail {
        id: row.id,
        title: row.title,
        description: row.description,
        status: row.status,
        has_cover: row.cover_key.is_some(),
        page_count: row.page_count,
        pages: pages.into_iter().map(PageItem::from).collect(),
        updated_at: row.updated_at,
    }))
}

pub async fn get_page_image(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, page)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let _ = load_visible_comic(&state, &actor, id).await?;
    let row = state
        .metadata
        .get_page(id, page)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("comic {id} page {page}")))?;
    let data = state.storage.get(&row.image_key).await?;
    Ok(([(header::CONTENT_TYPE, row.content_type)], data))
}

// ---- Admin endpoints ----

pub async fn admin_list_comics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<AdminComic>>> {
    require_editor(&actor)?;
    let created_by = if actor.is_privileged() {
        None
    } else {
        Some(actor.user_id.ok_or_else(|| {
            ApiError::Forbidden("editor identity required for owner listing".into())
        })?)
    };
    let rows = state.metadata.list_admin_comics(created_by).await?;
    Ok(Json(rows.into_iter().map(AdminComic::from).collect()))
}

pub async fn create_comic(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ComicFields>,
) -> ApiResult<impl IntoResponse> {
    require_editor(&actor)?;
    let (title, description) = validated_fields(&req)?;
    let comic = NewComic {
        title,
        description,
        created_by: actor.user_id,
    };
    let row = state
        .metadata
        .create_comic(&comic, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(comic_id = row.id, "created comic");
    Ok((StatusCode::CREATED, Json(AdminComic::from(row))))
}

pub async fn update_comic(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<ComicFields>,
) -> ApiResult<Json<AdminComic>> {
    let (_, status) = load_editable_comic(&state, &actor, id).await?;
    ensure_live("comic", status)?;
    let (title, description) = validated_fields(&req)?;
    let updated = state
        .metadata
        .update_comic(id, &title, description.as_deref(), OffsetDateTime::now_utc())
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("comic {id}")));
    }
    let (row, _) = load_comic(&state, id).await?;
    Ok(Json(AdminComic::from(row)))
}

pub async fn delete_comic(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AdminComic>> {
    let (_, status) = load_editable_comic(&state, &actor, id).await?;
    let now = OffsetDateTime::now_utc();
    let delete_at = retention_deadline(now, &state.config.gc);
    if !state.metadata.soft_delete_comic(id, delete_at, now).await? {
        return Err(ApiError::Conflict(format!(
            "cannot delete comic in state {status}"
        )));
    }
    tracing::info!(comic_id = id, %delete_at, "soft-deleted comic");
    let (row, _) = load_comic(&state, id).await?;
    Ok(Json(AdminComic::from(row)))
}

pub async fn comic_action(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<ActionRequest>,
) -> ApiResult<axum::response::Response> {
    let now = OffsetDateTime::now_utc();
    match req.action {
        LifecycleAction::Unlist => {
            let (_, status) = load_editable_comic(&state, &actor, id).await?;
            if !state.metadata.unlist_comic(id, now).await? {
                return Err(ApiError::Conflict(format!(
                    "cannot unlist comic in state {status}"
                )));
            }
            let (row, _) = load_comic(&state, id).await?;
            Ok(Json(AdminComic::from(row)).into_response())
        }
        LifecycleAction::Restore => {
            let (_, status) = load_editable_comic(&state, &actor, id).await?;
            if !state.metadata.restore_comic(id, now).await? {
                return Err(ApiError::Conflict(format!(
                    "cannot restore comic in state {status}"
                )));
            }
            let (row, _) = load_comic(&state, id).await?;
            Ok(Json(AdminComic::from(row)).into_response())
        }
        LifecycleAction::Purge => {
            require_super_admin(&actor)?;
            let _ = load_comic(&state, id).await?;
            let report = gc::purge_comic(state.metadata.as_ref(), state.storage.as_ref(), id, now)
                .await?
                .ok_or_else(|| {
                    ApiError::Conflict(format!("comic {id} is not in the deleted state"))
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
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AdminComic>> {
    let (_, status) = load_editable_comic(&state, &actor, id).await?;
    ensure_live("comic", status)?;

    let file_name = required_file_name(&headers)?;
    let declared = declared_file_size(&headers)?;
    let size = body.len() as u64;
    check_upload_size("source file", declared, size, MAX_SOURCE_BYTES)?;
    state.quota.check_capacity(size).await?;

    let now = OffsetDateTime::now_utc();
    let key = keys::comic_source_key(id, &file_name, now);
    state.storage.put(&key, body).await?;

    let upload = SourceUpload {
        key: key.clone(),
        name: file_name,
        content_type: content_type(&headers),
        size: size as i64,
        uploaded_at: now,
    };
    match state.metadata.set_comic_source(id, &upload, now).await? {
        None => {
            discard_staged(state.storage.as_ref(), &key).await;
            return Err(ApiError::NotFound(format!("comic {id}")));
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
    tracing::info!(comic_id = id, key, size, "stored comic source");

    let (row, _) = load_comic(&state, id).await?;
    Ok(Json(AdminComic::from(row)))
}

pub async fn upload_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, page)): Path<(i64, i64)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<PageItem>> {
    validate::page_index(page)?;
    let (comic, status) = load_editable_comic(&state, &actor, id).await?;
    ensure_live("comic", status)?;

    let ct = require_image_content_type(&headers)?;
    let declared = declared_file_size(&headers)?;
    let size = body.len() as u64;
    check_upload_size("page image", declared, size, MAX_PAGE_BYTES)?;
    state.quota.check_capacity(size).await?;

    let orig_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let ext = keys::guess_image_ext(&ct, orig_name);
    let now = OffsetDateTime::now_utc();
    let key = keys::comic_page_key(id, page, ext);
    state.storage.put(&key, body).await?;

    let upload = PageUpload {
        image_key: key.clone(),
        width: optional_i64_header(&headers, "x-image-width"),
        height: optional_i64_header(&headers, "x-image-height"),
        size_bytes: size as i64,
        content_type: ct,
    };
    if let Some(old_key) = state.metadata.upsert_page(id, page, &upload, now).await? {
        // Never reclaim a blob the comic's cover still points at.
        if comic.cover_key.as_deref() != Some(old_key.as_str()) {
            reclaim_replaced(state.storage.as_ref(), &old_key).await;
        }
    }

    // The first page doubles as the cover until one is set explicitly.
    if page == 1 && state.metadata.set_comic_cover_if_unset(id, &key, now).await? {
        tracing::debug!(comic_id = id, key, "page 1 became the comic cover");
    }
    state.quota.invalidate().await;

    let row = state
        .metadata
        .get_page(id, page)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("comic {id} page {page} vanished after upsert")))?;
    Ok(Json(PageItem::from(row)))
}

pub async fn delete_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, page)): Path<(i64, i64)>,
) -> ApiResult<Json<serde_json::Value>> {
    let (comic, status) = load_editable_comic(&state, &actor, id).await?;
    ensure_live("comic", status)?;
    match state.metadata.delete_page(id, page).await? {
        None => Err(ApiError::NotFound(format!("comic {id} page {page}"))),
        Some(image_key) => {
            if comic.cover_key.as_deref() != Some(image_key.as_str()) {
                reclaim_replaced(state.storage.as_ref(), &image_key).await;
                state.quota.invalidate().await;
            }
            tracing::info!(comic_id = id, page, "deleted comic page");
            Ok(Json(serde_json::json!({ "deleted": true })))
        }
    }
}

pub async fn finalize(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let (_, status) = load_editable_comic(&state, &actor, id).await?;
    ensure_live("comic", status)?;
    let page_count = state
        .metadata
        .finalize_comic(id, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("comic {id}")))?;
    tracing::info!(comic_id = id, page_count, "finalized comic");
    Ok(Json(serde_json::json!({ "page_count": page_count })))
}
