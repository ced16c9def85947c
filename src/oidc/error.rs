use thiserror::Error;

/// Failures of the state/PKCE vault.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("login flow not found")]
    NotFound,
    #[error("login flow expired")]
    Expired,
    #[error("random generator unavailable: {0}")]
    Rng(String),
}

/// Failures talking to the IdP token endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token endpoint request failed")]
    Request(#[from] reqwest::Error),
    #[error("token exchange failed: {status}")]
    TokenExchangeFailed { status: u16, body: String },
    #[error("token response is not valid json")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("token response has no id_token")]
    MissingIdentityAssertion,
}

/// Failures validating the IdP-issued ID token.
#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("token header has no key id")]
    MissingKid,
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to build RSA key from JWK")]
    KeyParse,
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("id token expired")]
    Expired,
    #[error("nonce mismatch")]
    NonceMismatch,
}

/// Institutional policy gates, in evaluation order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyRejection {
    #[error("Only @{domain} accounts are allowed")]
    DomainRejected { domain: String },
    #[error("Email must be verified")]
    EmailUnverified,
    #[error("Student affiliation required")]
    AffiliationRequired,
    #[error("MFA/Duo confirmation missing in token claims")]
    MfaRequired,
}

/// Session credential failures. Verification never says why.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session token")]
    Invalid,
    #[error("failed to sign session token: {0}")]
    Signing(String),
}
