//! Book catalogue handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use libris_core::{Book, BookRepository, NewBook, PageQuery, Paged, TagSpec};

use crate::extract::RequireAuth;
use crate::{ApiError, AppState};

/// SHA-256 of the book content, lowercase hex.
static CONTENT_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("content hash pattern is valid"));

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookRequest {
    pub content_hash: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagSpec>,
}

/// Register a book uploaded by the caller.
///
/// # Returns
/// - 201 Created with the book
/// - 400 Bad Request if the content hash is not 64 lowercase hex digits or
///   the title is blank
/// - 409 Conflict if a book with this content hash already exists
pub async fn create_book(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    if !CONTENT_HASH_RE.is_match(&req.content_hash) {
        return Err(ApiError::BadRequest(
            "content_hash must be 64 lowercase hex characters".to_string(),
        ));
    }
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let tag_ids = state.tag_resolver.resolve_ids(&req.tags).await?;
    let book = state
        .stores
        .books
        .create(NewBook {
            content_hash: req.content_hash,
            title: title.to_string(),
            author: non_blank(req.author),
            description: non_blank(req.description),
            uploader_id: auth.user_id,
            tag_ids,
        })
        .await?;

    info!(
        subsystem = "api",
        component = "books",
        op = "create",
        book_id = book.id,
        user_id = auth.user_id,
        "Book created"
    );
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn list_my_books(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<Book>>, ApiError> {
    let page = query.page();
    let books = &state.stores.books;
    let items = books.list_by_uploader(auth.user_id, Some(page)).await?;
    let total = books.count_by_uploader(auth.user_id).await?;
    Ok(Json(Paged::new(items, total, page)))
}

pub async fn get_book(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(id): Path<i64>,
) -> Result<Json<Book>, ApiError> {
    let book = state
        .stores
        .books
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book {} not found", id)))?;
    Ok(Json(book))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_pattern() {
        assert!(CONTENT_HASH_RE.is_match(&"0f".repeat(32)));
        assert!(!CONTENT_HASH_RE.is_match(&"0F".repeat(32)));
        assert!(!CONTENT_HASH_RE.is_match(&"0f".repeat(31)));
        assert!(!CONTENT_HASH_RE.is_match("not-a-hash"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" Le Guin ".to_string())), Some("Le Guin".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
