//! Storage administration: usage summary, ceiling, raw object listing, and
//! the manual GC trigger.

use crate::error::{ApiError, ApiResult};
use crate::gc;
use crate::guard::Actor;
use crate::handlers::common::{require_admin, require_super_admin};
use crate::quota::StorageSummary;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use shelf_core::keys::{classify_object, ObjectClass};
use shelf_core::validate;
use shelf_storage::{Cursor, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use time::OffsetDateTime;

pub async fn get_summary(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<StorageSummary>> {
    require_admin(&actor)?;
    Ok(Json(state.quota.summary().await?))
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    /// Null or zero clears the ceiling.
    #[serde(default)]
    pub limit_bytes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SetLimitResponse {
    pub limit_bytes: Option<u64>,
}

pub async fn set_limit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<SetLimitRequest>,
) -> ApiResult<Json<SetLimitResponse>> {
    require_super_admin(&actor)?;
    let limit = validate::storage_limit(req.limit_bytes)?;
    state
        .quota
        .set_limit(limit, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(limit_bytes = ?limit, "updated storage limit");
    Ok(Json(SetLimitResponse { limit_bytes: limit }))
}

#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    pub class: ObjectClass,
}

#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    pub objects: Vec<ListedObject>,
    pub next_cursor: Option<String>,
}

/// Raw blob store listing with per-object classification. This is the
/// reconciliation surface: anything classified `other`, or owned by an id
/// with no metadata row, is an orphan candidate.
pub async fn list_objects(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListObjectsQuery>,
) -> ApiResult<Json<ListObjectsResponse>> {
    require_admin(&actor)?;
    let cursor = match &query.cursor {
        Some(s) => Some(Cursor::from_base64(s)?),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be positive".into()));
    }

    let page = state
        .storage
        .list_page(&query.prefix, cursor, limit)
        .await?;
    Ok(Json(ListObjectsResponse {
        objects: page
            .objects
            .into_iter()
            .map(|entry| ListedObject {
                class: classify_object(&entry.key),
                key: entry.key,
                size: entry.size,
                last_modified: entry.last_modified,
            })
            .collect(),
        next_cursor: page.next_cursor.map(|c| c.to_base64()),
    }))
}

pub async fn run_sweep(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<gc::SweepStats>> {
    require_admin(&actor)?;
    let stats = gc::sweep_expired(
        state.metadata.as_ref(),
        state.storage.as_ref(),
        &state.config.gc,
    )
    .await?;
    if stats.books_purged > 0 || stats.comics_purged > 0 {
        state.quota.invalidate().await;
    }
    tracing::info!(
        books = stats.books_purged,
        comics = stats.comics_purged,
        claims_lost = stats.claims_lost,
        "manual sweep finished"
    );
    Ok(Json(stats))
}
