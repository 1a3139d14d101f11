//! Site font endpoints: public list and serve, super-admin management.
//!
//! Font blobs live under `fonts/` and the installed list is a JSON array in
//! the settings table. Upload stages the blob first and registers the name
//! second; delete unregisters first and reclaims the blob best-effort, so the
//! list never names a missing blob.

use crate::error::{ApiError, ApiResult};
use crate::guard::Actor;
use crate::handlers::common::{check_upload_size, declared_file_size, require_super_admin};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use bytes::Bytes;
use serde::Serialize;
use shelf_core::{keys, validate, MAX_FONT_BYTES};
use shelf_metadata::repos::CUSTOM_FONTS;
use shelf_storage::delete_if_exists;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct FontList {
    pub fonts: Vec<String>,
}

/// The installed-font list from settings. Unparseable state is treated as
/// empty rather than failing every font request.
async fn installed_fonts(state: &AppState) -> ApiResult<Vec<String>> {
    match state.metadata.get_setting(CUSTOM_FONTS).await? {
        None => Ok(Vec::new()),
        Some(value) => match serde_json::from_str(&value) {
            Ok(fonts) => Ok(fonts),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable font list setting, treating as empty");
                Ok(Vec::new())
            }
        },
    }
}

async fn save_fonts(state: &AppState, fonts: &[String], now: OffsetDateTime) -> ApiResult<()> {
    let value = serde_json::to_string(fonts)
        .map_err(|e| ApiError::Internal(format!("serialize font list: {e}")))?;
    state.metadata.set_setting(CUSTOM_FONTS, &value, now).await?;
    Ok(())
}

/// `GET /api/fonts`
pub async fn list_fonts(State(state): State<AppState>) -> ApiResult<Json<FontList>> {
    let fonts = installed_fonts(&state).await?;
    Ok(Json(FontList { fonts }))
}

/// `GET /api/fonts/{name}`
pub async fn get_font(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let name = validate::font_file_name(&name)?;
    let data = state.storage.get(&keys::font_key(&name)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "font/woff2"),
            // Font files are content-addressed by name in practice; let
            // clients cache them hard.
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

/// `PUT /api/admin/fonts/{name}`
pub async fn upload_font(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> ApiResult<Json<FontList>> {
    require_super_admin(&actor)?;
    let name = validate::font_file_name(&keys::sanitize_filename(&name, 120))?;

    let declared = declared_file_size(&headers)?;
    let size = body.len() as u64;
    check_upload_size("font", declared, size, MAX_FONT_BYTES)?;
    state.quota.check_capacity(size).await?;

    // Deterministic key: re-uploading a font replaces its bytes in place, so
    // there is never a superseded blob to reclaim.
    state.storage.put(&keys::font_key(&name), body).await?;

    let mut fonts = installed_fonts(&state).await?;
    if !fonts.iter().any(|f| f == &name) {
        fonts.push(name);
        save_fonts(&state, &fonts, OffsetDateTime::now_utc()).await?;
    }
    state.quota.invalidate().await;

    Ok(Json(FontList { fonts }))
}

/// `DELETE /api/admin/fonts/{name}`
pub async fn delete_font(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
) -> ApiResult<Json<FontList>> {
    require_super_admin(&actor)?;
    let name = validate::font_file_name(&name)?;
    let key = keys::font_key(&name);

    let mut fonts = installed_fonts(&state).await?;
    let registered = fonts.iter().position(|f| f == &name);
    if registered.is_none() && !state.storage.exists(&key).await? {
        return Err(ApiError::NotFound(format!("font {name}")));
    }

    // List first so readers stop seeing the name, blob second; a leaked blob
    // is invisible and shows up in the object listing.
    if let Some(idx) = registered {
        fonts.remove(idx);
        save_fonts(&state, &fonts, OffsetDateTime::now_utc()).await?;
    }
    if let Err(e) = delete_if_exists(state.storage.as_ref(), &key).await {
        tracing::warn!(key, error = %e, "failed to delete font blob");
    }
    state.quota.invalidate().await;

    Ok(Json(FontList { fonts }))
}
