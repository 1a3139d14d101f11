//! Shared test harness: an in-process server over temp-dir storage and
//! SQLite, driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use shelf_core::config::AppConfig;
use shelf_server::guard::HeaderGuard;
use shelf_server::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

pub const EDITOR: (&str, i64) = ("editor", 7);
pub const OTHER_EDITOR: (&str, i64) = ("editor", 8);
pub const ADMIN: (&str, i64) = ("admin", 1);
pub const SUPER: (&str, i64) = ("superadmin", 1);

pub struct TestServer {
    pub state: AppState,
    router: axum::Router,
    _temp: tempfile::TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::for_testing(temp.path());
        let storage = shelf_storage::from_config(&config.storage).await.unwrap();
        let metadata = shelf_metadata::from_config(&config.metadata).await.unwrap();
        let state = AppState::new(config, storage, metadata, Arc::new(HeaderGuard));
        let router = create_router(state.clone());
        Self {
            state,
            router,
            _temp: temp,
        }
    }

    fn builder(
        method: &str,
        uri: &str,
        identity: Option<(&str, i64)>,
    ) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((role, user)) = identity {
            builder = builder
                .header("x-shelf-role", role)
                .header("x-shelf-user", user.to_string());
        }
        builder
    }

    async fn execute(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Send a request with an optional JSON body, returning status and parsed
    /// response body.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        identity: Option<(&str, i64)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Self::builder(method, uri, identity);
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.execute(request).await
    }

    /// Send an upload with raw bytes and extra headers.
    pub async fn upload(
        &self,
        method: &str,
        uri: &str,
        identity: Option<(&str, i64)>,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Self::builder(method, uri, identity);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).unwrap();
        self.execute(request).await
    }

    /// GET returning the raw body, for blob-serving endpoints.
    pub async fn get_raw(
        &self,
        uri: &str,
        identity: Option<(&str, i64)>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let request = Self::builder("GET", uri, identity)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    /// Create a book as the default editor and return its id.
    pub async fn create_book(&self, title: &str) -> i64 {
        let (status, body) = self
            .json(
                "POST",
                "/api/admin/books",
                Some(EDITOR),
                Some(serde_json::json!({ "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create book: {body}");
        body["id"].as_i64().unwrap()
    }

    /// Create a comic as the default editor and return its id.
    pub async fn create_comic(&self, title: &str) -> i64 {
        let (status, body) = self
            .json(
                "POST",
                "/api/admin/comics",
                Some(EDITOR),
                Some(serde_json::json!({ "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create comic: {body}");
        body["id"].as_i64().unwrap()
    }

    /// Create a chapter with content; returns the chapter id.
    pub async fn add_chapter(&self, book_id: i64, title: &str, content: &str) -> i64 {
        let (status, body) = self
            .json(
                "POST",
                &format!("/api/admin/books/{book_id}/chapters"),
                Some(EDITOR),
                Some(serde_json::json!({ "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create chapter: {body}");
        let chapter_id = body["id"].as_i64().unwrap();

        let (status, body) = self
            .json(
                "PUT",
                &format!("/api/admin/chapters/{chapter_id}"),
                Some(EDITOR),
                Some(serde_json::json!({ "content": content })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "set chapter content: {body}");
        chapter_id
    }
}

/// A tiny valid-enough JPEG payload for image upload tests.
pub fn fake_image(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(4), 0xAB);
    data
}
