//! Bearer-token authentication extractors.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use tracing::warn;

use libris_core::UserId;

use crate::{ApiError, AppState};

/// Optional identity. Anonymous requests pass with `user_id: None`.
///
/// Usage:
/// ```ignore
/// async fn handler(State(state): State<AppState>, auth: Auth, Path(id): Path<i64>) {
///     let detail = state.libraries.get_one(id, auth.user_id, PageQuery::default()).await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Auth {
    pub user_id: Option<UserId>,
    pub token: Option<String>,
}

/// Token of an `Authorization: Bearer <token>` header. The scheme is
/// stripped once; anything else is not a bearer credential.
fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match auth_header.and_then(bearer_token) {
            Some(token) => token.to_string(),
            None => {
                return Ok(Auth {
                    user_id: None,
                    token: None,
                })
            }
        };

        let user_id = match state.auth.authenticate(&token).await {
            Ok(user_id) => user_id,
            Err(e) => {
                warn!(subsystem = "api", component = "auth", error = %e, "Token lookup failed");
                None
            }
        };

        Ok(Auth {
            user_id,
            token: Some(token),
        })
    }
}

/// Identity of a caller holding a valid, unexpired token. 401 otherwise.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    pub user_id: UserId,
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = Auth::from_request_parts(parts, state).await?;

        match (auth.user_id, auth.token) {
            (Some(user_id), Some(token)) => Ok(RequireAuth { user_id, token }),
            _ => Err(ApiError::Unauthorized(
                "Authentication required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer lb_at_abc"), Some("lb_at_abc"));
        assert_eq!(bearer_token("Bearer  lb_at_abc "), Some("lb_at_abc"));
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn test_bearer_scheme_stripped_once() {
        assert_eq!(
            bearer_token("Bearer Bearer lb_at_abc"),
            Some("Bearer lb_at_abc")
        );
    }
}
