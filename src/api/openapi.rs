#![allow(clippy::needless_for_each)]

use super::handlers::{
    auth::{__path_callback, __path_start},
    health::{self, __path_health},
    me::__path_me,
    types,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(health, start, callback, me),
    components(schemas(
        health::Health,
        types::StartResponse,
        types::CallbackRequest,
        types::SessionResponse,
        types::MeResponse
    )),
    modifiers(&SessionBearer),
    tags(
        (name = "auth", description = "Campus sign-in and session tokens"),
        (name = "health", description = "Liveness")
    )
)]
struct ApiDoc;

struct SessionBearer;

impl Modify for SessionBearer {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
