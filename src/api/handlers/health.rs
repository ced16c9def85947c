use crate::GIT_COMMIT_HASH;
use axum::{
    http::{header::InvalidHeaderValue, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

const X_APP: HeaderName = HeaderName::from_static("x-app");

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    ok: bool,
    commit: String,
    name: String,
    version: String,
}

impl Health {
    fn current() -> Self {
        Self {
            ok: true,
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// `name:version:short-commit`; the commit part is empty for unknown builds.
    fn x_app(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let short_commit = match self.commit.get(..7) {
            Some(prefix) if self.commit.len() > 7 => prefix,
            _ => "",
        };
        HeaderValue::from_str(&format!("{}:{}:{short_commit}", self.name, self.version))
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = Health)
    ),
    tag = "health"
)]
pub async fn health(method: Method) -> Response {
    let health = Health::current();

    // OPTIONS gets the header only.
    let mut response = if method == Method::GET {
        Json(&health).into_response()
    } else {
        StatusCode::OK.into_response()
    };

    match health.x_app() {
        Ok(value) => {
            response.headers_mut().insert(X_APP, value);
        }
        Err(err) => error!(error = %err, "failed to build X-App header"),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new().route("/health", get(health).options(health))
    }

    #[tokio::test]
    async fn get_reports_ok_and_build_info() -> Result<()> {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let x_app = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(x_app.starts_with(&format!(
            "{}:{}:",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )));

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let health: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(health["ok"], true);
        assert_eq!(health["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(health["commit"], GIT_COMMIT_HASH);
        Ok(())
    }

    #[tokio::test]
    async fn options_has_empty_body() -> Result<()> {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-App"));
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert!(body.is_empty());
        Ok(())
    }
}
