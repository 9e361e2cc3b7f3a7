//! Media library HTTP handlers.
//!
//! Thin wrappers over [`LibraryService`](crate::services::LibraryService):
//! extract the requester, delegate, and pick the status code. All access
//! decisions live in the service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use libris_core::{
    Ack, CopiedLibrary, CreateLibraryRequest, LibraryDetail, LibraryInfo, LibraryItem,
    LibrarySummary, PageQuery, UpdateLibraryRequest,
};

use crate::extract::{Auth, RequireAuth};
use crate::{ApiError, AppState};

/// Create a library owned by the caller.
///
/// # Returns
/// - 201 Created with the library metadata
/// - 400 Bad Request if the name or a tag is invalid
/// - 409 Conflict if the caller already owns a library with that name
pub async fn create_library(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<CreateLibraryRequest>,
) -> Result<(StatusCode, Json<LibraryInfo>), ApiError> {
    let info = state.libraries.create(auth.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn list_my_libraries(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Vec<LibrarySummary>>, ApiError> {
    Ok(Json(state.libraries.list_mine(auth.user_id).await?))
}

/// Library detail, full or paged.
///
/// # Query Parameters
/// - `limit`, `offset`: supplying either switches to a paged response that
///   echoes the effective window
///
/// # Returns
/// - 200 OK with the detail
/// - 403 Forbidden if the library is private and the caller is not its owner
/// - 404 Not Found if the library does not exist
pub async fn get_library(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<LibraryDetail>, ApiError> {
    Ok(Json(state.libraries.get_one(id, auth.user_id, page).await?))
}

pub async fn get_virtual_uploaded(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(page): Query<PageQuery>,
) -> Result<Json<LibraryDetail>, ApiError> {
    Ok(Json(
        state.libraries.virtual_uploaded(auth.user_id, page).await?,
    ))
}

pub async fn get_reading_history(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(page): Query<PageQuery>,
) -> Result<Json<LibraryDetail>, ApiError> {
    Ok(Json(
        state.libraries.reading_history(auth.user_id, page).await?,
    ))
}

pub async fn add_book(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path((id, book_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<LibraryItem>), ApiError> {
    let item = state.libraries.add_book(id, auth.user_id, book_id).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn add_library(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path((id, child_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<LibraryItem>), ApiError> {
    let item = state
        .libraries
        .add_library(id, auth.user_id, child_id)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<Json<Ack>, ApiError> {
    Ok(Json(
        state.libraries.remove_item(id, auth.user_id, item_id).await?,
    ))
}

/// Partial update. Absent fields are untouched; `tags` replaces the whole set.
///
/// # Returns
/// - 200 OK with the updated metadata
/// - 403 Forbidden for non-owners and for system libraries
/// - 409 Conflict if the new name is already taken
pub async fn update_library(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLibraryRequest>,
) -> Result<Json<LibraryInfo>, ApiError> {
    Ok(Json(state.libraries.update(id, auth.user_id, req).await?))
}

pub async fn copy_library(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<CopiedLibrary>), ApiError> {
    let copy = state.libraries.copy(id, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn delete_library(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    Ok(Json(state.libraries.remove(id, auth.user_id).await?))
}
