//! Helpers shared across handler modules.

use crate::error::{ApiError, ApiResult};
use crate::guard::{Actor, Role};
use crate::state::AppState;
use axum::http::HeaderMap;
use serde::{Deserialize, Deserializer};
use shelf_core::LifecycleState;
use shelf_metadata::models::{BookRow, ComicRow};

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const FILE_SIZE_HEADER: &str = "x-file-size";

/// Word count used for chapter statistics. Whitespace-separated tokens;
/// intentionally naive, it only has to be consistent with itself.
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Deserializer distinguishing an absent JSON field (keep the current value)
/// from an explicit `null` (clear it). Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

pub fn require_editor(actor: &Actor) -> ApiResult<()> {
    if actor.role >= Role::Editor {
        Ok(())
    } else {
        Err(ApiError::Forbidden("editor role required".into()))
    }
}

pub fn require_admin(actor: &Actor) -> ApiResult<()> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin role required".into()))
    }
}

pub fn require_super_admin(actor: &Actor) -> ApiResult<()> {
    if actor.is_super_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("super-admin role required".into()))
    }
}

/// Parse a status column value. Anything unparseable is a data bug, not a
/// client error.
pub fn row_status(raw: &str) -> ApiResult<LifecycleState> {
    LifecycleState::parse(raw)
        .map_err(|e| ApiError::Internal(format!("corrupt status column: {e}")))
}

/// Content mutations require a live entity; lifecycle actions go through
/// their own transition checks instead.
pub fn ensure_live(kind: &str, status: LifecycleState) -> ApiResult<()> {
    match status {
        LifecycleState::Normal | LifecycleState::Unlisted => Ok(()),
        other => Err(ApiError::Conflict(format!("{kind} is {other}"))),
    }
}

pub async fn load_book(state: &AppState, id: i64) -> ApiResult<(BookRow, LifecycleState)> {
    let row = state
        .metadata
        .get_book(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("book {id}")))?;
    let status = row_status(&row.status)?;
    Ok((row, status))
}

/// Load a book the actor may see. Hidden books 404 rather than 403 so ids
/// cannot be probed.
pub async fn load_visible_book(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> ApiResult<(BookRow, LifecycleState)> {
    let (row, status) = load_book(state, id).await?;
    if !actor.can_see(status, row.created_by) {
        return Err(ApiError::NotFound(format!("book {id}")));
    }
    Ok((row, status))
}

pub async fn load_editable_book(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> ApiResult<(BookRow, LifecycleState)> {
    let (row, status) = load_visible_book(state, actor, id).await?;
    if !actor.can_edit(row.created_by) {
        return Err(ApiError::Forbidden(format!("no write access to book {id}")));
    }
    Ok((row, status))
}

pub async fn load_comic(state: &AppState, id: i64) -> ApiResult<(ComicRow, LifecycleState)> {
    let row = state
        .metadata
        .get_comic(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("comic {id}")))?;
    let status = row_status(&row.status)?;
    Ok((row, status))
}

pub async fn load_visible_comic(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> ApiResult<(ComicRow, LifecycleState)> {
    let (row, status) = load_comic(state, id).await?;
    if !actor.can_see(status, row.created_by) {
        return Err(ApiError::NotFound(format!("comic {id}")));
    }
    Ok((row, status))
}

pub async fn load_editable_comic(
    state: &AppState,
    actor: &Actor,
    id: i64,
) -> ApiResult<(ComicRow, LifecycleState)> {
    let (row, status) = load_visible_comic(state, actor, id).await?;
    if !actor.can_edit(row.created_by) {
        return Err(ApiError::Forbidden(format!("no write access to comic {id}")));
    }
    Ok((row, status))
}

/// Uploaded file name from the `x-file-name` header.
pub fn required_file_name(headers: &HeaderMap) -> ApiResult<String> {
    let value = headers
        .get(FILE_NAME_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("{FILE_NAME_HEADER} header required")))?;
    let name = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("invalid {FILE_NAME_HEADER} header")))?;
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "{FILE_NAME_HEADER} header must not be empty"
        )));
    }
    Ok(name.to_string())
}

/// Size the client claims it will send, from the `x-file-size` header.
pub fn declared_file_size(headers: &HeaderMap) -> ApiResult<Option<u64>> {
    match headers.get(FILE_SIZE_HEADER) {
        None => Ok(None),
        Some(value) => {
            let size = value
                .to_str()
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("invalid {FILE_SIZE_HEADER} header"))
                })?;
            Ok(Some(size))
        }
    }
}

/// Enforce an upload ceiling against both the declared and the actual size.
/// The declared size lets the client get a precise 413 up front; the router's
/// body limit is what actually stops an oversized stream.
pub fn check_upload_size(
    what: &str,
    declared: Option<u64>,
    actual: u64,
    max: u64,
) -> ApiResult<()> {
    if let Some(declared) = declared {
        if declared > max {
            return Err(ApiError::PayloadTooLarge(format!(
                "{what} is {declared} bytes, limit is {max}"
            )));
        }
    }
    if actual > max {
        return Err(ApiError::PayloadTooLarge(format!(
            "{what} is {actual} bytes, limit is {max}"
        )));
    }
    Ok(())
}

pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Image uploads must declare an image content type.
pub fn require_image_content_type(headers: &HeaderMap) -> ApiResult<String> {
    let ct = content_type(headers)
        .ok_or_else(|| ApiError::BadRequest("content-type header required".into()))?;
    if !ct.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "expected an image content type, got {ct}"
        )));
    }
    Ok(ct)
}

/// Response content type for a blob served straight from the store,
/// inferred from the key's extension.
pub fn mime_for_key(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        Some("bmp") => "image/bmp",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        word_count: Option<Option<i64>>,
    }

    #[test]
    fn double_option_distinguishes_absent_from_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.word_count, None);

        let cleared: Patch = serde_json::from_str(r#"{"word_count": null}"#).unwrap();
        assert_eq!(cleared.word_count, Some(None));

        let set: Patch = serde_json::from_str(r#"{"word_count": 42}"#).unwrap();
        assert_eq!(set.word_count, Some(Some(42)));
    }

    #[test]
    fn upload_size_checks_both_figures() {
        assert!(check_upload_size("cover", None, 10, 100).is_ok());
        assert!(check_upload_size("cover", Some(200), 10, 100).is_err());
        assert!(check_upload_size("cover", Some(50), 200, 100).is_err());
    }

    #[test]
    fn word_count_ignores_whitespace_runs() {
        assert_eq!(word_count("  one\n two\tthree  "), 3);
        assert_eq!(word_count(""), 0);
    }
}
