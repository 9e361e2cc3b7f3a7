//! Account and session handlers.

use axum::{extract::State, http::StatusCode, Json};

use libris_core::{Ack, User};

use crate::extract::RequireAuth;
use crate::services::{AccessToken, Credentials};
use crate::{ApiError, AppState};

pub async fn register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.auth.register(creds).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange a username and password for a bearer token.
///
/// Unknown users and wrong passwords get the same 401 body.
pub async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<Json<AccessToken>, ApiError> {
    Ok(Json(state.auth.login(creds).await?))
}

pub async fn me(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.auth.me(auth.user_id).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Ack>, ApiError> {
    state.auth.logout(&auth.token).await?;
    Ok(Json(Ack::new("Logged out")))
}
