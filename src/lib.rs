//! # healthu-auth (campus sign-in backend)
//!
//! `healthu-auth` signs mobile users in against a campus OpenID Connect
//! provider using the Authorization Code flow with PKCE, then issues its own
//! short-lived session tokens.
//!
//! ## Login Flow
//!
//! - **Start:** `GET /auth/{provider}/start` mints a `state`, a `nonce` and a
//!   PKCE verifier, parks them in a one-shot flow vault and returns the IdP
//!   authorization URL.
//! - **Callback:** `POST /auth/{provider}/callback` consumes the flow, redeems
//!   the code at the token endpoint, verifies the RS256 ID token against the
//!   provider's JWKS and applies the campus policy before issuing a session.
//! - **Sessions:** HS256 tokens bound to this service's issuer and the mobile
//!   audience. `GET /me` resolves them back to an identity.
//!
//! ## Policy
//!
//! Only verified addresses in the allowed domain pass. Student affiliation and
//! multi-factor evidence are enforced or logged depending on configuration.
//!
//! The [`client`] module drives the same flow from the app side.

pub mod api;
pub mod cli;
pub mod client;
pub mod oidc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
