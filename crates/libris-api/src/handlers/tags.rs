//! Tag listing.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use libris_core::Tag;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ListTagsQuery {
    /// Only tags with this exact key
    pub key: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<ListTagsQuery>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.tag_resolver.list(query.key.as_deref()).await?))
}
