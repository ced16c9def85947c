use crate::oidc::LoginService;
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// How often abandoned login flows are swept.
pub const FLOW_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Build the application router.
///
/// `allowed_origin` restricts CORS to one origin; `None` allows any origin,
/// which is what native clients need.
#[must_use]
pub fn router(login: Arc<LoginService>, allowed_origin: Option<HeaderValue>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST]);
    let cors = match allowed_origin {
        Some(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        None => cors.allow_origin(Any),
    };

    Router::new()
        .route("/auth/:provider/start", get(handlers::auth::start))
        .route("/auth/:provider/callback", post(handlers::auth::callback))
        .route("/me", get(handlers::me::me))
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(login)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    login: Arc<LoginService>,
    allowed_origin: Option<&str>,
) -> Result<()> {
    let allowed_origin = allowed_origin.map(origin_header).transpose()?;

    // A failed prefetch is not fatal: keys are fetched again on first use.
    match login.verifier().prefetch().await {
        Ok(keys) => info!(keys, "identity provider signing keys loaded"),
        Err(err) => warn!(error = %err, "could not prefetch identity provider signing keys"),
    }

    let reaper = spawn_flow_reaper(login.clone(), FLOW_REAPER_INTERVAL);

    let app = router(login, allowed_origin);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    reaper.abort();

    Ok(())
}

/// Periodically drop expired login flows.
pub fn spawn_flow_reaper(login: Arc<LoginService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = login.vault().purge_expired();
            if removed > 0 {
                debug!(removed, pending = login.vault().pending(), "flow reaper pass");
            }
        }
    })
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn origin_header(allowed_origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(allowed_origin)
        .with_context(|| format!("Invalid allowed origin: {allowed_origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Allowed origin must include a valid host: {allowed_origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build allowed origin header")
}
