//! Garbage collection sweep tests. The test config uses a zero-day retention
//! so soft-deleted entities are immediately purgeable.

mod common;

use axum::http::StatusCode;
use common::{fake_image, TestServer, ADMIN, EDITOR};
use serde_json::json;

#[tokio::test]
async fn sweep_purges_expired_entities_and_their_blobs() {
    let server = TestServer::spawn().await;

    let book_id = server.create_book("Expiring").await;
    let chapter_id = server.add_chapter(book_id, "Only", "short lived words").await;
    server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/cover"),
            Some(EDITOR),
            &[("content-type", "image/jpeg")],
            fake_image(32),
        )
        .await;
    let comic_id = server.create_comic("Expiring Too").await;
    server
        .upload(
            "PUT",
            &format!("/api/admin/comics/{comic_id}/pages/1"),
            Some(EDITOR),
            &[("content-type", "image/png")],
            fake_image(32),
        )
        .await;

    let chapter_key = format!("novels/books/{book_id}/chapters/{chapter_id}.txt");
    let cover_key = format!("covers/{book_id}.jpg");
    let page_key = format!("comics/{comic_id}/pages/0001.png");

    server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;
    server
        .json("DELETE", &format!("/api/admin/comics/{comic_id}"), Some(EDITOR), None)
        .await;

    let (status, body) = server
        .json("POST", "/api/admin/gc/sweep", Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["books_purged"], 1);
    assert_eq!(body["comics_purged"], 1);
    assert_eq!(body["blob_errors"], 0);

    for key in [&chapter_key, &cover_key, &page_key] {
        assert!(
            !server.state.storage.exists(key).await.unwrap(),
            "blob {key} should be gone"
        );
    }
    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sweep_leaves_live_entities_alone() {
    let server = TestServer::spawn().await;
    let keeper = server.create_book("Keeper").await;
    let goner = server.create_book("Goner").await;
    server
        .json("DELETE", &format!("/api/admin/books/{goner}"), Some(EDITOR), None)
        .await;

    let (_, body) = server
        .json("POST", "/api/admin/gc/sweep", Some(ADMIN), None)
        .await;
    assert_eq!(body["books_purged"], 1);

    let (status, _) = server
        .json("GET", &format!("/api/books/{keeper}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn restored_entities_survive_the_sweep() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Second Chance").await;
    server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;
    server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            Some(json!({ "action": "restore" })),
        )
        .await;

    let (_, body) = server
        .json("POST", "/api/admin/gc/sweep", Some(ADMIN), None)
        .await;
    assert_eq!(body["books_purged"], 0);

    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn concurrent_sweeps_purge_each_entity_exactly_once() {
    let server = TestServer::spawn().await;
    for i in 0..5 {
        let id = server.create_book(&format!("Batch {i}")).await;
        server
            .json("DELETE", &format!("/api/admin/books/{id}"), Some(EDITOR), None)
            .await;
    }

    let (first, second) = tokio::join!(
        server.json("POST", "/api/admin/gc/sweep", Some(ADMIN), None),
        server.json("POST", "/api/admin/gc/sweep", Some(ADMIN), None),
    );
    assert_eq!(first.0, StatusCode::OK, "{}", first.1);
    assert_eq!(second.0, StatusCode::OK, "{}", second.1);

    let total = first.1["books_purged"].as_u64().unwrap()
        + second.1["books_purged"].as_u64().unwrap();
    assert_eq!(total, 5, "first: {}, second: {}", first.1, second.1);

    let (_, body) = server
        .json("GET", "/api/admin/books", Some(ADMIN), None)
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn sweep_requires_admin() {
    let server = TestServer::spawn().await;
    let (status, _) = server
        .json("POST", "/api/admin/gc/sweep", Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
