//! Login endpoints used by the mobile client.
//!
//! Flow Overview:
//! 1) `GET /auth/{provider}/start` records a flow and returns the IdP URL.
//! 2) The client opens the URL in the system browser and captures the redirect.
//! 3) `POST /auth/{provider}/callback` redeems `code` + `state` for a session token.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::error_response;
use super::types::{CallbackRequest, SessionResponse, StartQuery, StartResponse};
use crate::oidc::{LoginError, LoginService};

#[utoipa::path(
    get,
    path = "/auth/{provider}/start",
    params(
        ("provider" = String, Path, description = "Configured identity provider name"),
        StartQuery
    ),
    responses(
        (status = 200, description = "Authorization URL for the system browser", body = StartResponse),
        (status = 404, description = "Unknown provider"),
        (status = 500, description = "Flow could not be started")
    ),
    tag = "auth"
)]
pub async fn start(
    Path(provider): Path<String>,
    Query(query): Query<StartQuery>,
    login: Extension<Arc<LoginService>>,
) -> Response {
    if let Some(response) = unknown_provider(&login, &provider) {
        return response;
    }

    match login.start(query.email_hint.as_deref()) {
        Ok(start) => Json(StartResponse {
            authorization_url: start.authorization_url.to_string(),
            state: start.state,
            callback_scheme: start.callback_scheme,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Configured identity provider name")
    ),
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 400, description = "Missing, unknown, or expired state, or missing code"),
        (status = 403, description = "Account rejected by institutional policy"),
        (status = 404, description = "Unknown provider"),
        (status = 500, description = "Identity provider exchange or token verification failed")
    ),
    tag = "auth"
)]
pub async fn callback(
    Path(provider): Path<String>,
    login: Extension<Arc<LoginService>>,
    request: Result<Json<CallbackRequest>, JsonRejection>,
) -> Response {
    if let Some(response) = unknown_provider(&login, &provider) {
        return response;
    }

    // an unreadable body is answered like one without code and state
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "callback body rejected");
            return error_response(&LoginError::MissingParameters);
        }
    };

    match login
        .complete(
            request.code.as_deref(),
            request.state.as_deref(),
            request.redirect_uri.as_deref(),
        )
        .await
    {
        Ok(outcome) => Json(SessionResponse {
            session_token: outcome.session.token,
            expires_in: outcome.session.expires_in,
            email: outcome.user.email,
            is_student: outcome.user.is_student,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

fn unknown_provider(login: &LoginService, provider: &str) -> Option<Response> {
    if login.provider().name() == provider {
        None
    } else {
        debug!(provider, "unknown provider requested");
        Some((StatusCode::NOT_FOUND, "Unknown provider").into_response())
    }
}
