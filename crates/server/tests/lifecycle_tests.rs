//! Lifecycle transition tests: soft delete, unlist, restore, purge, and the
//! visibility rules around each state.

mod common;

use axum::http::StatusCode;
use common::{TestServer, ADMIN, EDITOR, OTHER_EDITOR, SUPER};
use serde_json::json;

#[tokio::test]
async fn soft_delete_hides_then_restore_revives() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Ephemeral").await;

    let (status, body) = server
        .json(
            "DELETE",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "deleted");
    assert!(body["delete_at"].is_string());

    // Gone from the public surface.
    let (_, body) = server.json("GET", "/api/books", None, None).await;
    assert!(body.as_array().unwrap().is_empty());
    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Still in the owner's admin listing, restorable.
    let (_, body) = server
        .json("GET", "/api/admin/books", Some(EDITOR), None)
        .await;
    assert_eq!(body[0]["status"], "deleted");

    let (status, body) = server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            Some(json!({ "action": "restore" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "normal");
    assert!(body["delete_at"].is_null());

    let (_, body) = server.json("GET", "/api/books", None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_books_return_404_not_403_to_strangers() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Hidden").await;
    server
        .json(
            "DELETE",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            None,
        )
        .await;

    // A different editor gets 404, indistinguishable from a missing id.
    let (status, _) = server
        .json(
            "PUT",
            &format!("/api/admin/books/{book_id}"),
            Some(OTHER_EDITOR),
            Some(json!({ "title": "Probe" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unlisted_books_hide_from_listing_but_stay_owner_visible() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Quiet").await;

    let (status, body) = server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            Some(json!({ "action": "unlist" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "unlisted");

    let (_, body) = server.json("GET", "/api/books", None, None).await;
    assert!(body.as_array().unwrap().is_empty());

    // Anonymous readers cannot reach it directly either.
    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The owner still can.
    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Unlisting twice is a conflict.
    let (status, _) = server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            Some(json!({ "action": "unlist" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn double_delete_is_a_conflict() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Once").await;

    let (status, _) = server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn mutations_on_deleted_entities_conflict() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Frozen").await;
    server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;

    let (status, _) = server
        .upload(
            "PUT",
            &format!("/api/admin/books/{book_id}/source"),
            Some(EDITOR),
            &[("x-file-name", "late.epub")],
            b"too late".to_vec(),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = server
        .json(
            "PUT",
            &format!("/api/admin/books/{book_id}"),
            Some(EDITOR),
            Some(json!({ "title": "Rename" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn purge_requires_super_admin_and_deleted_state() {
    let server = TestServer::spawn().await;
    let book_id = server.create_book("Doomed").await;
    let chapter_id = server.add_chapter(book_id, "Last Words", "farewell").await;
    let chapter_key = format!("novels/books/{book_id}/chapters/{chapter_id}.txt");

    // Purging a live book is a conflict.
    let (status, _) = server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(SUPER),
            Some(json!({ "action": "purge" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    server
        .json("DELETE", &format!("/api/admin/books/{book_id}"), Some(EDITOR), None)
        .await;

    // Neither editors nor plain admins can purge.
    for identity in [EDITOR, ADMIN] {
        let (status, _) = server
            .json(
                "POST",
                &format!("/api/admin/books/{book_id}"),
                Some(identity),
                Some(json!({ "action": "purge" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, body) = server
        .json(
            "POST",
            &format!("/api/admin/books/{book_id}"),
            Some(SUPER),
            Some(json!({ "action": "purge" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["rows"]["chapters"], 1);
    assert_eq!(body["blobs_deleted"], 1);

    // Rows and blobs are gone for good.
    assert!(!server.state.storage.exists(&chapter_key).await.unwrap());
    let (status, _) = server
        .json("GET", &format!("/api/books/{book_id}"), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comic_lifecycle_mirrors_books() {
    let server = TestServer::spawn().await;
    let comic_id = server.create_comic("Vanishing").await;

    let (status, body) = server
        .json("DELETE", &format!("/api/admin/comics/{comic_id}"), Some(EDITOR), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "deleted");

    let (status, _) = server
        .json("GET", &format!("/api/comics/{comic_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .json(
            "POST",
            &format!("/api/admin/comics/{comic_id}"),
            Some(SUPER),
            Some(json!({ "action": "purge" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = server
        .json("GET", &format!("/api/comics/{comic_id}"), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
