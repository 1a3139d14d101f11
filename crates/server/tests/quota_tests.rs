//! Storage accounting tests: the summary cache, the ceiling, and the raw
//! object listing.

mod common;

use axum::http::StatusCode;
use bytes::Bytes;
use common::{fake_image, TestServer, ADMIN, EDITOR, SUPER};
use serde_json::json;

#[tokio::test]
async fn summary_reflects_uploads_by_category() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Accounted").await;
    server.add_chapter(book_id, "One", "ten words or so in this chapter body").await;
    server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/cover"),
            Some(EDITOR),
            &[("content-type", "image/jpeg")],
            fake_image(64),
        )
        .await;
    server
        .upload(
            "PUT",
            "/api/admin/fonts/reader.woff2",
            Some(SUPER),
            &[],
            vec![0u8; 16],
        )
        .await;

    let (status, body) = server
        .json("GET", "/api/admin/storage/summary", Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["object_count"], 3);
    assert_eq!(body["by_category"]["covers"]["objects"], 1);
    assert_eq!(body["by_category"]["covers"]["bytes"], 64);
    assert_eq!(body["by_category"]["novels"]["objects"], 1);
    assert_eq!(body["by_category"]["fonts"]["bytes"], 16);
    assert!(body["limit_bytes"].is_null());
}

#[tokio::test]
async fn summary_requires_admin() {
    let server = TestServer::spawn().await;
    let (status, _) = server
        .json("GET", "/api/admin/storage/summary", Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ceiling_rejects_uploads_and_clears_on_null() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Capped").await;

    // Only super-admins may set the ceiling.
    let (status, _) = server
        .json(
            "PUT",
            "/api/admin/storage/summary",
            Some(ADMIN),
            Some(json!({ "limit_bytes": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .json(
            "PUT",
            "/api/admin/storage/summary",
            Some(SUPER),
            Some(json!({ "limit_bytes": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["limit_bytes"], 100);

    let (status, body) = server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/source"),
            Some(EDITOR),
            &[("x-file-name", "big.epub")],
            vec![0u8; 200],
        )
        .await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE, "{body}");
    assert_eq!(body["error"]["code"], "insufficient_storage");

    // Null clears the ceiling; the upload now goes through.
    let (status, body) = server
        .json(
            "PUT",
            "/api/admin/storage/summary",
            Some(SUPER),
            Some(json!({ "limit_bytes": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["limit_bytes"].is_null());

    let (status, _) = server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/source"),
            Some(EDITOR),
            &[("x-file-name", "big.epub")],
            vec![0u8; 200],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Negative limits are rejected.
    let (status, _) = server
        .json(
            "PUT",
            "/api/admin/storage/summary",
            Some(SUPER),
            Some(json!({ "limit_bytes": -5 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_is_cached_until_invalidated() {
    let server = TestServer::spawn().await;

    // Prime the cache on an empty store.
    let (_, body) = server
        .json("GET", "/api/admin/storage/summary", Some(ADMIN), None)
        .await;
    assert_eq!(body["object_count"], 0);

    // Write a blob behind the accountant's back; the cached summary (TTL is
    // minutes in the test config) does not see it.
    server
        .state
        .storage
        .put("fonts/reader.woff2", Bytes::from_static(b"glyphs"))
        .await
        .unwrap();
    let (_, body) = server
        .json("GET", "/api/admin/storage/summary", Some(ADMIN), None)
        .await;
    assert_eq!(body["object_count"], 0);

    // Changing the ceiling invalidates the cache.
    server
        .json(
            "PUT",
            "/api/admin/storage/summary",
            Some(SUPER),
            Some(json!({ "limit_bytes": 1024 })),
        )
        .await;
    let (_, body) = server
        .json("GET", "/api/admin/storage/summary", Some(ADMIN), None)
        .await;
    assert_eq!(body["object_count"], 1);
    assert_eq!(body["by_category"]["fonts"]["objects"], 1);
    assert_eq!(body["limit_bytes"], 1024);
}

#[tokio::test]
async fn object_listing_paginates_and_classifies() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Listed").await;
    let chapter_id = server.add_chapter(book_id, "One", "words").await;
    server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/cover"),
            Some(EDITOR),
            &[("content-type", "image/jpeg")],
            fake_image(32),
        )
        .await;

    let (status, _) = server
        .json("GET", "/api/admin/storage/objects", Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Walk the listing one object at a time.
    let mut keys = Vec::new();
    let mut uri = "/api/admin/storage/objects?limit=1".to_string();
    loop {
        let (status, body) = server.json("GET", &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        for object in body["objects"].as_array().unwrap() {
            keys.push(object["key"].as_str().unwrap().to_string());
        }
        match body["next_cursor"].as_str() {
            Some(cursor) => {
                uri = format!("/api/admin/storage/objects?limit=1&cursor={}", urlencode(cursor));
            }
            None => break,
        }
    }
    let mut expected = vec![
        format!("covers/{book_id}.jpg"),
        format!("novels/books/{book_id}/chapters/{chapter_id}.txt"),
    ];
    expected.sort();
    assert_eq!(keys, expected);

    // Classification resolves owners from keys alone.
    let (_, body) = server
        .json("GET", "/api/admin/storage/objects?prefix=covers/", Some(ADMIN), None)
        .await;
    let objects = body["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["class"]["kind"], "cover");
    assert_eq!(objects[0]["class"]["owner_id"], book_id);
}

fn urlencode(s: &str) -> String {
    // Base64 cursors only need '+', '/' and '=' escaped.
    s.replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}
