//! OIDC authorization code + PKCE login against a single campus IdP.
//!
//! The callback pipeline runs leaf-first through the modules below: the flow
//! vault correlates the callback, the exchange client redeems the code, the
//! ID token is verified, policy decides admission, the user directory records
//! the subject, and the session issuer mints the token the client keeps.

pub mod claims;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod id_token;
pub mod jwks;
pub mod login;
pub mod pkce;
pub mod policy;
pub mod provider;
pub mod session;
pub mod store;
pub mod users;

use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{AssertionError, ExchangeError, FlowError, PolicyRejection, SessionError};
pub use flow::{FlowStart, FlowVault, PendingAuthFlow};
pub use login::{LoginError, LoginErrorKind, LoginOutcome, LoginService, LoginStart};
pub use policy::{PolicyConfig, PolicyDecision, PolicyEngine};
pub use provider::ProviderConfig;
pub use session::{IssuedSession, SessionIdentity, SessionIssuer};
pub use users::{User, UserDirectory};

pub(crate) fn now_unix_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

pub(crate) fn now_unix_seconds() -> i64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}
