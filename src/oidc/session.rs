//! Self-contained HS256 session tokens handed to the mobile client.
//!
//! Nothing is stored server-side: a token is valid until `exp` and cannot be
//! revoked earlier.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::error::SessionError;
use super::now_unix_seconds;
use super::users::User;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_AUDIENCE: &str = "healthu-mobile";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

const SESSION_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    pub is_student: bool,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Deserialize)]
struct SessionHeader {
    alg: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

/// Who a valid session token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub is_student: bool,
}

#[derive(Clone, Debug)]
pub struct SessionIssuer {
    secret: SecretString,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(secret: SecretString, issuer: String) -> Self {
        Self {
            secret,
            issuer,
            audience: SESSION_AUDIENCE.to_string(),
            ttl: DEFAULT_SESSION_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a session token for `user`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the key is unusable.
    pub fn issue(&self, user: &User) -> Result<IssuedSession, SessionError> {
        self.issue_at(user, now_unix_seconds())
    }

    pub(crate) fn issue_at(&self, user: &User, now: i64) -> Result<IssuedSession, SessionError> {
        let ttl_seconds = self.ttl.as_secs();
        let claims = SessionClaims {
            user_id: user.id.to_string(),
            email: user.email.clone(),
            is_student: user.is_student,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let header_b64 = Base64UrlUnpadded::encode_string(SESSION_HEADER.as_bytes());
        let claims_json =
            serde_json::to_vec(&claims).map_err(|err| SessionError::Signing(err.to_string()))?;
        let claims_b64 = Base64UrlUnpadded::encode_string(&claims_json);
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(IssuedSession {
            token: format!("{signing_input}.{signature_b64}"),
            expires_in: ttl_seconds,
        })
    }

    /// Check a presented session token.
    ///
    /// # Errors
    /// `SessionError::Invalid` for any failure; the reason is only logged.
    pub fn verify(&self, token: &str) -> Result<SessionIdentity, SessionError> {
        self.verify_at(token, now_unix_seconds())
    }

    pub(crate) fn verify_at(&self, token: &str, now: i64) -> Result<SessionIdentity, SessionError> {
        self.check(token, now).map_err(|reason| {
            debug!(reason, "session token rejected");
            SessionError::Invalid
        })
    }

    fn check(&self, token: &str, now: i64) -> Result<SessionIdentity, &'static str> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err("malformed token");
        };

        let header: SessionHeader = decode_json(header_b64).ok_or("malformed header")?;
        if header.alg != "HS256" {
            return Err("unexpected algorithm");
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| "malformed signature")?;
        let mut mac = self.mac().map_err(|_| "unusable key")?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| "signature mismatch")?;

        let claims: SessionClaims = decode_json(claims_b64).ok_or("malformed claims")?;
        if claims.iss != self.issuer {
            return Err("issuer mismatch");
        }
        if claims.aud != self.audience {
            return Err("audience mismatch");
        }
        if claims.exp <= now {
            return Err("expired");
        }
        let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| "malformed user id")?;

        Ok(SessionIdentity {
            user_id,
            email: claims.email,
            is_student: claims.is_student,
        })
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|err| SessionError::Signing(err.to_string()))
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Option<T> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const NOW: i64 = 1_700_000_000;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(
            SecretString::from("test-session-secret".to_string()),
            "http://localhost:4000".to_string(),
        )
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            sub: "uci|jdoe".to_string(),
            email: "jdoe@uci.edu".to_string(),
            is_student: true,
            created_at_unix_ms: 0,
            last_login_at_unix_ms: None,
        }
    }

    #[test]
    fn issued_token_verifies_until_expiry() -> Result<()> {
        let issuer = issuer();
        let user = user();
        let session = issuer.issue_at(&user, NOW)?;
        assert_eq!(session.expires_in, 8 * 60 * 60);

        let identity = issuer.verify_at(&session.token, NOW + 60)?;
        assert_eq!(
            identity,
            SessionIdentity {
                user_id: user.id,
                email: "jdoe@uci.edu".to_string(),
                is_student: true,
            }
        );

        let expiry = NOW + 8 * 60 * 60;
        assert!(issuer.verify_at(&session.token, expiry - 1).is_ok());
        assert!(matches!(
            issuer.verify_at(&session.token, expiry),
            Err(SessionError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn claims_use_camel_case_and_mobile_audience() -> Result<()> {
        let session = issuer().issue_at(&user(), NOW)?;
        let claims_b64 = session.token.split('.').nth(1).unwrap_or_default();
        let claims: serde_json::Value =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(claims_b64)?)?;
        assert_eq!(claims["aud"], "healthu-mobile");
        assert_eq!(claims["iss"], "http://localhost:4000");
        assert_eq!(claims["isStudent"], true);
        assert_eq!(claims["iat"], NOW);
        assert!(claims["userId"].is_string());
        Ok(())
    }

    #[test]
    fn tampered_claims_are_rejected() -> Result<()> {
        let issuer = issuer();
        let session = issuer.issue_at(&user(), NOW)?;
        let parts: Vec<&str> = session.token.split('.').collect();

        let mut forged: SessionClaims =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(parts[1])?)?;
        forged.is_student = false;
        forged.email = "someone@uci.edu".to_string();
        let forged_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&forged)?);
        let token = format!("{}.{}.{}", parts[0], forged_b64, parts[2]);

        assert!(matches!(
            issuer.verify_at(&token, NOW),
            Err(SessionError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn other_secret_or_issuer_is_rejected() -> Result<()> {
        let session = issuer().issue_at(&user(), NOW)?;

        let other_secret = SessionIssuer::new(
            SecretString::from("another-secret".to_string()),
            "http://localhost:4000".to_string(),
        );
        assert!(other_secret.verify_at(&session.token, NOW).is_err());

        let other_issuer = SessionIssuer::new(
            SecretString::from("test-session-secret".to_string()),
            "https://api.example.test".to_string(),
        );
        assert!(other_issuer.verify_at(&session.token, NOW).is_err());
        Ok(())
    }

    #[test]
    fn other_audience_is_rejected() -> Result<()> {
        let issuer = issuer();
        let session = issuer.issue_at(&user(), NOW)?;
        let parts: Vec<&str> = session.token.split('.').collect();

        let mut claims: SessionClaims =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(parts[1])?)?;
        claims.aud = "healthu-web".to_string();
        let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims)?);

        let mut mac = issuer.mac()?;
        mac.update(parts[0].as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        let token = format!("{}.{claims_b64}.{signature}", parts[0]);

        assert_eq!(issuer.check(&token, NOW), Err("audience mismatch"));
        assert!(matches!(
            issuer.verify_at(&token, NOW),
            Err(SessionError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn garbage_and_alg_swaps_are_rejected() -> Result<()> {
        let issuer = issuer();
        for token in ["", "a.b", "a.b.c.d", "not-a-token"] {
            assert!(issuer.verify_at(token, NOW).is_err());
        }

        let session = issuer.issue_at(&user(), NOW)?;
        let parts: Vec<&str> = session.token.split('.').collect();
        let none_header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let token = format!("{none_header}.{}.", parts[1]);
        assert!(issuer.verify_at(&token, NOW).is_err());
        Ok(())
    }

    #[test]
    fn custom_ttl_is_reported() -> Result<()> {
        let issuer = issuer().with_ttl(Duration::from_secs(60));
        let session = issuer.issue_at(&user(), NOW)?;
        assert_eq!(session.expires_in, 60);
        assert!(issuer.verify_at(&session.token, NOW + 61).is_err());
        Ok(())
    }
}
