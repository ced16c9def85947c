//! ID token claims and their normalization into policy-ready shapes.
//!
//! IdPs disagree on claim shapes: affiliation may arrive as a string or a
//! list under several names, `amr` may be a string or a list. Everything is
//! folded into a lower-cased [`ClaimValues`] list here so the policy gates
//! never inspect raw JSON.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Claim names that may carry an affiliation or role.
pub const AFFILIATION_CLAIMS: [&str; 4] = ["eduPersonAffiliation", "affiliation", "roles", "role"];

/// `aud` is either a single string or an array of strings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims as they appear in the ID token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: Audience,
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `Some(Value::Null)` when the claim is sent as `null`.
    #[serde(default, deserialize_with = "present")]
    pub email_verified: Option<Value>,
    #[serde(default)]
    pub amr: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Keeps a present `null` distinct from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerification {
    /// The IdP did not send `email_verified`.
    Absent,
    Verified,
    /// Present but not boolean `true` (including `null` and `"true"` strings).
    Unverified,
}

impl EmailVerification {
    fn from_claim(value: Option<&Value>) -> Self {
        match value {
            None => Self::Absent,
            Some(Value::Bool(true)) => Self::Verified,
            Some(_) => Self::Unverified,
        }
    }
}

/// A claim normalized to a list of lower-cased, non-empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimValues(Vec<String>);

impl ClaimValues {
    /// Fold any number of raw claims (each missing, scalar, or list) into one list.
    #[must_use]
    pub fn normalize<'a>(claims: impl IntoIterator<Item = Option<&'a Value>>) -> Self {
        let mut values = Vec::new();
        for claim in claims.into_iter().flatten() {
            match claim {
                Value::Array(items) => items.iter().for_each(|item| push_scalar(&mut values, item)),
                other => push_scalar(&mut values, other),
            }
        }
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any value contains any of `needles` as a substring.
    #[must_use]
    pub fn contains_any(&self, needles: &[&str]) -> bool {
        self.0
            .iter()
            .any(|value| needles.iter().any(|needle| value.contains(needle)))
    }
}

fn push_scalar(values: &mut Vec<String>, value: &Value) {
    let text = match value {
        Value::String(s) => s.trim().to_lowercase(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => return,
    };
    if !text.is_empty() {
        values.push(text);
    }
}

/// Claims that passed signature, issuer, audience, expiry, and nonce checks.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: EmailVerification,
    pub affiliations: ClaimValues,
    pub amr: ClaimValues,
    pub nonce: Option<String>,
}

impl From<IdTokenClaims> for VerifiedClaims {
    fn from(claims: IdTokenClaims) -> Self {
        let affiliations =
            ClaimValues::normalize(AFFILIATION_CLAIMS.iter().map(|name| claims.extra.get(*name)));
        let amr = ClaimValues::normalize([claims.amr.as_ref()]);
        Self {
            email_verified: EmailVerification::from_claim(claims.email_verified.as_ref()),
            sub: claims.sub,
            email: claims.email,
            affiliations,
            amr,
            nonce: claims.nonce,
        }
    }
}
