use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use super::types::MeResponse;
use crate::oidc::LoginService;

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Identity carried by the session token", body = MeResponse),
        (status = 401, description = "Missing, invalid, or expired session token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, login: Extension<Arc<LoginService>>) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token").into_response();
    };

    match login.sessions().verify(&token) {
        Ok(identity) => Json(MeResponse {
            user_id: identity.user_id.to_string(),
            email: identity.email,
            is_student: identity.is_student,
        })
        .into_response(),
        Err(_) => (StatusCode::UNAUTHORIZED, "Invalid session token").into_response(),
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
