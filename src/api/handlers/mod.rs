pub mod auth;
pub mod health;
pub mod me;
pub mod types;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::oidc::{LoginError, LoginErrorKind};

/// Map a login failure to a plain-text response. Details stay in the logs.
pub(crate) fn error_response(err: &LoginError) -> Response {
    let status = match err.kind() {
        LoginErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        LoginErrorKind::Forbidden => StatusCode::FORBIDDEN,
        LoginErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.client_message()).into_response()
}
