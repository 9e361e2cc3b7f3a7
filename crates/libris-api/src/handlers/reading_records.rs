//! Reading session handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use libris_core::{PageQuery, Paged, ReadingRecord};

use crate::extract::RequireAuth;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartReadingRequest {
    pub book_id: i64,
    #[serde(default)]
    pub position: Option<String>,
}

/// Heartbeat and end body. A missing position keeps the stored bookmark.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProgressRequest {
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListReadingQuery {
    pub book_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LastReadingQuery {
    pub book_id: i64,
}

pub async fn start_reading(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<StartReadingRequest>,
) -> Result<(StatusCode, Json<ReadingRecord>), ApiError> {
    let record = state
        .reading
        .start(auth.user_id, req.book_id, req.position)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<i64>,
    body: Option<Json<ProgressRequest>>,
) -> Result<Json<ReadingRecord>, ApiError> {
    let position = body.and_then(|Json(b)| b.position);
    Ok(Json(state.reading.heartbeat(auth.user_id, id, position).await?))
}

/// End a session. Ending twice is a 409.
pub async fn end_reading(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<i64>,
    body: Option<Json<ProgressRequest>>,
) -> Result<Json<ReadingRecord>, ApiError> {
    let position = body.and_then(|Json(b)| b.position);
    Ok(Json(state.reading.end(auth.user_id, id, position).await?))
}

pub async fn list_my_reading(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<ListReadingQuery>,
) -> Result<Json<Paged<ReadingRecord>>, ApiError> {
    let page = PageQuery::new(query.limit, query.offset);
    Ok(Json(
        state
            .reading
            .list_mine(auth.user_id, query.book_id, page)
            .await?,
    ))
}

pub async fn last_reading(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<LastReadingQuery>,
) -> Result<Json<ReadingRecord>, ApiError> {
    Ok(Json(state.reading.last(auth.user_id, query.book_id).await?))
}
