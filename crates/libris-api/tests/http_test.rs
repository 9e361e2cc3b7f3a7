//! HTTP-level tests driving the router over the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use libris_api::{router, AppState, ServerConfig, Stores};
use libris_core::mock::MemoryStore;

fn test_config() -> ServerConfig {
    ServerConfig {
        rate_limit_enabled: false,
        ..ServerConfig::default()
    }
}

fn app_with(config: ServerConfig) -> Router {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Stores::from_shared(store), &config).unwrap();
    router(state, &config)
}

fn app() -> Router {
    app_with(test_config())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Register and log in, returning the bearer token.
async fn sign_up(app: &Router, username: &str) -> String {
    let creds = json!({ "username": username, "password": "password123" });
    let (status, _) = send(app, Method::POST, "/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(app, Method::POST, "/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn upload_book(app: &Router, token: &str, title: &str, hash_digit: char) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/books",
        Some(token),
        Some(json!({
            "content_hash": hash_digit.to_string().repeat(64),
            "title": title,
            "tags": [{ "key": "genre", "value": "sf" }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

async fn create_library(app: &Router, token: &str, name: &str, is_public: bool) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/media-libraries",
        Some(token),
        Some(json!({ "name": name, "is_public": is_public })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_reports_healthy() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["components"]["schemas"]["LibraryDetail"].is_object());
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_mutations_require_authentication() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/media-libraries",
        None,
        Some(json!({ "name": "Shelf" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");

    let (status, _) = send(
        &app,
        Method::GET,
        "/media-libraries/my",
        Some("lb_at_forged"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_doubled_bearer_scheme_rejected() {
    let app = app();
    let token = sign_up(&app, "dave").await;

    let (status, _) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let doubled = format!("Bearer {}", token);
    let (status, _) = send(&app, Method::GET, "/auth/me", Some(&doubled), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = app();
    sign_up(&app, "carol").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "carol", "password": "not-the-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid username or password");
}

#[tokio::test]
async fn test_library_error_statuses() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;
    let private = create_library(&app, &alice, "Private", false).await;

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}", private),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/media-libraries/999", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/media-libraries",
        Some(&alice),
        Some(json!({ "name": " Private " })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/media-libraries",
        Some(&alice),
        Some(json!({ "name": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/media-libraries/{}/libraries/{}", private, private),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/media-libraries/{}", private),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_library_readable_anonymously() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let shelf = create_library(&app, &alice, "Open Shelf", true).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}", shelf),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Open Shelf");
}

#[tokio::test]
async fn test_detail_paging_fields() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let shelf = create_library(&app, &alice, "Shelf", false).await;
    let book = upload_book(&app, &alice, "Dune", 'a').await;
    send(
        &app,
        Method::POST,
        &format!("/media-libraries/{}/books/{}", shelf, book),
        Some(&alice),
        None,
    )
    .await;

    let (_, full) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}", shelf),
        Some(&alice),
        None,
    )
    .await;
    assert!(full.get("limit").is_none());
    assert!(full.get("offset").is_none());
    assert_eq!(full["items_count"], 1);
    assert_eq!(full["items"][0]["type"], "book");
    assert_eq!(full["items"][0]["book"]["title"], "Dune");
    assert_eq!(full["items"][0]["book"]["tags"][0]["key"], "genre");

    let (_, paged) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}?limit=500&offset=-5", shelf),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(paged["limit"], 100);
    assert_eq!(paged["offset"], 0);
    assert_eq!(paged["items_count"], 1);
}

#[tokio::test]
async fn test_duplicate_membership_conflicts() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let shelf = create_library(&app, &alice, "Shelf", false).await;
    let book = upload_book(&app, &alice, "Dune", 'b').await;
    let uri = format!("/media-libraries/{}/books/{}", shelf, book);

    let (status, item) = send(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(item["book_id"], book);

    let (status, _) = send(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/media-libraries/{}/books/{}", shelf, 999),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let item_id = item["id"].as_i64().unwrap();
    let (status, ack) = send(
        &app,
        Method::DELETE,
        &format!("/media-libraries/{}/items/{}", shelf, item_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["success"], true);
}

#[tokio::test]
async fn test_reading_history_is_system_locked() {
    let app = app();
    let alice = sign_up(&app, "alice").await;

    let (status, history) = send(
        &app,
        Method::GET,
        "/media-libraries/reading-record",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["is_system"], true);
    let id = history["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/media-libraries/{}", id),
        Some(&alice),
        Some(json!({ "name": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/media-libraries/{}", id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reading_session_files_book_in_history() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let book = upload_book(&app, &alice, "Neuromancer", 'c').await;

    let (status, record) = send(
        &app,
        Method::POST,
        "/reading-records",
        Some(&alice),
        Some(json!({ "book_id": book, "position": "epubcfi(/6/2)" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let record_id = record["id"].as_i64().unwrap();

    let (status, beat) = send(
        &app,
        Method::PATCH,
        &format!("/reading-records/{}/heartbeat", record_id),
        Some(&alice),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beat["position"], "epubcfi(/6/2)");

    let end_uri = format!("/reading-records/{}/end", record_id);
    let (status, _) = send(
        &app,
        Method::POST,
        &end_uri,
        Some(&alice),
        Some(json!({ "position": "epubcfi(/6/8)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, &end_uri, Some(&alice), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, last) = send(
        &app,
        Method::GET,
        &format!("/reading-records/last?book_id={}", book),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["position"], "epubcfi(/6/8)");

    let (_, history) = send(
        &app,
        Method::GET,
        "/media-libraries/reading-record",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(history["items_count"], 1);
    assert_eq!(history["items"][0]["book"]["id"], book);

    let (_, mine) = send(&app, Method::GET, "/reading-records/my", Some(&alice), None).await;
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["limit"], 20);
}

#[tokio::test]
async fn test_virtual_uploads_count_ignores_paging() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    upload_book(&app, &alice, "One", 'd').await;
    upload_book(&app, &alice, "Two", 'e').await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/media-libraries/virtual/my-uploaded?limit=1",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 0);
    assert_eq!(body["is_virtual"], true);
    assert_eq!(body["items_count"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["book"]["title"], "Two");
}

#[tokio::test]
async fn test_book_validation() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/books",
        Some(&alice),
        Some(json!({ "content_hash": "xyz", "title": "Bad" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    upload_book(&app, &alice, "First", 'f').await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/books",
        Some(&alice),
        Some(json!({ "content_hash": "f".repeat(64), "title": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, mine) = send(&app, Method::GET, "/books/my", Some(&alice), None).await;
    assert_eq!(mine["total"], 1);

    let (_, tags) = send(&app, Method::GET, "/tags?key=genre", None, None).await;
    assert_eq!(tags.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_copy_survives_deletion_of_source() {
    let app = app();
    let alice = sign_up(&app, "alice").await;
    let bob = sign_up(&app, "bob").await;

    let book = upload_book(&app, &alice, "Dune", '1').await;
    let shelf = create_library(&app, &alice, "Shelf", true).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/media-libraries/{}/books/{}", shelf, book),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, copy) = send(
        &app,
        Method::POST,
        &format!("/media-libraries/{}/copy", shelf),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(copy["name"], "Shelf (copy)");
    assert_eq!(copy["is_public"], false);
    assert_eq!(copy["items_count"], 1);
    assert_eq!(copy["copied_from"], shelf);
    let copy_id = copy["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/media-libraries/{}", shelf),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, detail) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}", copy_id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["items_count"], 1);
    assert_eq!(detail["items"][0]["book"]["id"], book);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/media-libraries/{}", copy_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let app = app_with(ServerConfig {
        rate_limit_enabled: true,
        rate_limit_requests: 1,
        rate_limit_period_secs: 3600,
        ..ServerConfig::default()
    });

    let (first, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(first, StatusCode::OK);
    let (second, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");
}
