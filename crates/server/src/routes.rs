//! Router assembly.

use crate::error::ApiResult;
use crate::guard::auth_middleware;
use crate::handlers::{books, chapters, comics, fonts, storage_admin};
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use serde_json::json;
use shelf_core::MAX_SOURCE_BYTES;
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// Every `/api` route passes through the auth middleware so handlers can rely
/// on an `Actor` extension. The body limit is the outer guard for uploads;
/// per-kind ceilings are enforced again in the handlers.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Public surface.
        .route("/api/books", get(books::list_books))
        .route("/api/books/{id}", get(books::get_book))
        .route("/api/books/{id}/cover", get(books::get_cover))
        .route(
            "/api/books/{id}/chapters/{chapter_id}",
            get(books::get_chapter_content),
        )
        .route("/api/comics", get(comics::list_comics))
        .route("/api/comics/{id}", get(comics::get_comic))
        .route("/api/comics/{id}/pages/{page}", get(comics::get_page_image))
        .route("/api/fonts", get(fonts::list_fonts))
        .route("/api/fonts/{name}", get(fonts::get_font))
        // Books admin.
        .route(
            "/api/admin/books",
            get(books::admin_list_books).post(books::create_book),
        )
        .route(
            "/api/admin/books/{id}",
            put(books::update_book)
                .delete(books::delete_book)
                .post(books::book_action),
        )
        .route("/api/admin/books/{id}/source", put(books::upload_source))
        .route(
            "/api/admin/books/{id}/source-meta",
            put(books::update_source_meta),
        )
        .route("/api/admin/books/{id}/cover", put(books::upload_cover))
        .route("/api/admin/books/{id}/tags", put(books::set_tags))
        .route("/api/admin/books/{id}/chapters", post(books::create_chapter))
        .route(
            "/api/admin/chapters/{id}",
            put(chapters::update_chapter).delete(chapters::delete_chapter),
        )
        .route("/api/admin/chapters/{id}/swap", post(chapters::swap_chapter))
        // Comics admin.
        .route(
            "/api/admin/comics",
            get(comics::admin_list_comics).post(comics::create_comic),
        )
        .route(
            "/api/admin/comics/{id}",
            put(comics::update_comic)
                .delete(comics::delete_comic)
                .post(comics::comic_action),
        )
        .route("/api/admin/comics/{id}/source", put(comics::upload_source))
        .route(
            "/api/admin/comics/{id}/pages/{page}",
            put(comics::upload_page).delete(comics::delete_page),
        )
        .route("/api/admin/comics/{id}/finalize", post(comics::finalize))
        // Site fonts.
        .route(
            "/api/admin/fonts/{name}",
            put(fonts::upload_font).delete(fonts::delete_font),
        )
        // Storage admin.
        .route(
            "/api/admin/storage/summary",
            get(storage_admin::get_summary).put(storage_admin::set_limit),
        )
        .route("/api/admin/storage/objects", get(storage_admin::list_objects))
        .route("/api/admin/gc/sweep", post(storage_admin::run_sweep))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_SOURCE_BYTES as usize + 64 * 1024));

    let router = Router::new().route("/healthz", get(health)).merge(api);

    let router = if state.config.server.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.storage.health_check().await?;
    state.metadata.health_check().await?;
    Ok(Json(json!({
        "status": "ok",
        "storage_backend": state.storage.backend_name(),
    })))
}
