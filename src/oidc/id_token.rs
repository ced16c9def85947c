//! ID token verification against the IdP's published signing keys.
//!
//! Keys are cached in memory with a TTL. A token signed with a `kid` the cache
//! does not know triggers one refresh before it is rejected, which is how key
//! rotation at the IdP is picked up. The HTTP fetch never runs under the
//! cache's write lock, so tokens signed with cached keys keep verifying while
//! a refresh is in flight.

use base64ct::{Base64UrlUnpadded, Encoding};
use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    Client, StatusCode,
};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use super::claims::{IdTokenClaims, VerifiedClaims};
use super::error::AssertionError;
use super::jwks::Jwks;
use super::now_unix_seconds;
use super::provider::ProviderConfig;

const KEYSET_CACHE_TTL_SECONDS: u64 = 60 * 60;
// Small allowance for clock drift between us and the IdP.
const EXPIRY_LEEWAY_SECONDS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
struct IdTokenHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, AssertionError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| AssertionError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Expected values an ID token is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Expectations<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
    pub nonce: &'a str,
    pub now_unix_seconds: i64,
}

/// Verify an RS256 ID token against `jwks` and return its claims.
///
/// Checks run in this order: structure, signature, issuer, audience, expiry,
/// nonce. The nonce check is last so a replayed token from another flow is
/// rejected even when everything else about it is valid.
///
/// # Errors
///
/// Returns the first failing check as an [`AssertionError`].
pub fn verify_rs256(
    token: &str,
    jwks: &Jwks,
    expected: &Expectations<'_>,
) -> Result<VerifiedClaims, AssertionError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AssertionError::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(AssertionError::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(AssertionError::TokenFormat)?;
    if parts.next().is_some() {
        return Err(AssertionError::TokenFormat);
    }

    let header: IdTokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(AssertionError::UnsupportedAlg(header.alg));
    }
    let kid = header.kid.ok_or(AssertionError::MissingKid)?;

    let jwk = jwks
        .find_by_kid(&kid)
        .ok_or_else(|| AssertionError::UnknownKid(kid.clone()))?;

    let public_key = jwk.to_rsa_public_key()?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes =
        Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| AssertionError::SignatureInvalid)?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|_| AssertionError::SignatureInvalid)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| AssertionError::SignatureInvalid)?;

    let claims: IdTokenClaims = b64d_json(claims_b64)?;
    if claims.iss != expected.issuer {
        return Err(AssertionError::IssuerMismatch);
    }
    if !claims.aud.contains(expected.audience) {
        return Err(AssertionError::AudienceMismatch);
    }
    if let Some(exp) = claims.exp {
        if exp.saturating_add(EXPIRY_LEEWAY_SECONDS) <= expected.now_unix_seconds {
            return Err(AssertionError::Expired);
        }
    }
    if claims.nonce.as_deref() != Some(expected.nonce) {
        return Err(AssertionError::NonceMismatch);
    }

    Ok(claims.into())
}

#[derive(Debug, Clone, Default)]
struct KeysetCache {
    jwks: Jwks,
    fetched_at: Option<Instant>,
    etag: Option<String>,
    /// Bumped on every refresh attempt, failed ones included.
    generation: u64,
}

impl KeysetCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.is_some_and(|fetched_at| {
            fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
        })
    }
}

enum FetchOutcome {
    NotModified,
    Updated { jwks: Jwks, etag: Option<String> },
}

/// Verifies IdP ID tokens using a cached JWKS.
#[derive(Debug)]
pub struct IdTokenVerifier {
    client: Client,
    jwks_uri: String,
    issuer: String,
    audience: String,
    keyset_cache: RwLock<KeysetCache>,
    /// Serializes refreshes so a burst of unknown-kid tokens costs one fetch.
    refresh_guard: Mutex<()>,
}

impl IdTokenVerifier {
    /// Build a verifier for `provider`; the audience is the client id.
    ///
    /// The key set starts empty, so the first verification fetches it.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(provider: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(provider.http_timeout())
            .build()?;
        Ok(Self {
            client,
            jwks_uri: provider.jwks_uri().to_string(),
            issuer: provider.issuer().to_string(),
            audience: provider.client_id().to_string(),
            keyset_cache: RwLock::new(KeysetCache::default()),
            refresh_guard: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Fetch the key set now. Used at startup; failure is not fatal because
    /// verification fetches again on demand.
    ///
    /// # Errors
    /// Returns an error if the key set cannot be fetched or parsed.
    pub async fn prefetch(&self) -> Result<usize, AssertionError> {
        self.refresh_keyset(None).await?;
        Ok(self.keyset_cache.read().await.jwks.keys.len())
    }

    /// Verify `id_token` and check its `nonce` against `expected_nonce`.
    ///
    /// # Errors
    /// Returns the failing check; see [`verify_rs256`].
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<VerifiedClaims, AssertionError> {
        let (jwks, generation) = self.keyset_snapshot().await;

        match self.verify_with(id_token, &jwks, expected_nonce) {
            Err(AssertionError::UnknownKid(kid)) => {
                debug!(kid = %kid, "unknown signing key id, refreshing key set");
                self.refresh_keyset(Some(generation)).await?;
                let (jwks, _) = self.keyset_snapshot().await;
                self.verify_with(id_token, &jwks, expected_nonce)
            }
            result => result,
        }
    }

    fn verify_with(
        &self,
        id_token: &str,
        jwks: &Jwks,
        expected_nonce: &str,
    ) -> Result<VerifiedClaims, AssertionError> {
        let expected = Expectations {
            issuer: &self.issuer,
            audience: &self.audience,
            nonce: expected_nonce,
            now_unix_seconds: now_unix_seconds(),
        };
        verify_rs256(id_token, jwks, &expected)
    }

    /// Return the cached key set, refreshing first when it is stale. A failed
    /// refresh keeps the last known keys.
    ///
    /// The generation returned is the one seen before any refresh, so an
    /// unknown `kid` right after a stale refresh does not fetch again.
    async fn keyset_snapshot(&self) -> (Jwks, u64) {
        let (cached, generation, fresh) = {
            let cache = self.keyset_cache.read().await;
            (cache.jwks.clone(), cache.generation, cache.is_fresh())
        };

        if fresh {
            return (cached, generation);
        }

        if let Err(err) = self.refresh_keyset(Some(generation)).await {
            warn!(error = %err, url = %self.jwks_uri, "failed to refresh jwks cache");
            return (cached, generation);
        }

        (self.keyset_cache.read().await.jwks.clone(), generation)
    }

    /// Fetch the JWKS and swap it into the cache.
    ///
    /// `seen` is the generation of the snapshot the caller worked with; if
    /// another task attempted a refresh since then, this call returns without
    /// fetching. After a failed attempt waiters keep the last known keys
    /// instead of queueing another fetch against an endpoint that is down.
    async fn refresh_keyset(&self, seen: Option<u64>) -> Result<(), AssertionError> {
        let _guard = self.refresh_guard.lock().await;

        let etag = {
            let cache = self.keyset_cache.read().await;
            if seen.is_some_and(|seen| cache.generation != seen) {
                return Ok(());
            }
            cache.etag.clone()
        };

        let outcome = match fetch_keyset(&self.client, &self.jwks_uri, etag.as_deref()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // fetched_at is left alone so the next request retries
                self.keyset_cache.write().await.generation += 1;
                return Err(err);
            }
        };

        match outcome {
            FetchOutcome::NotModified => {
                let mut cache = self.keyset_cache.write().await;
                cache.fetched_at = Some(Instant::now());
                cache.generation += 1;
            }
            FetchOutcome::Updated { jwks, etag } => {
                let mut cache = self.keyset_cache.write().await;
                cache.jwks = jwks;
                cache.fetched_at = Some(Instant::now());
                cache.etag = etag;
                cache.generation += 1;
                info!(keys = cache.jwks.keys.len(), "jwks cache refreshed");
            }
        }
        Ok(())
    }
}

async fn fetch_keyset(
    client: &Client,
    url: &str,
    etag: Option<&str>,
) -> Result<FetchOutcome, AssertionError> {
    let span = info_span!("idp.jwks.fetch", http.method = "GET", url = %url);
    async {
        let mut request = client.get(url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AssertionError::KeySetUnavailable(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|err| AssertionError::KeySetUnavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(AssertionError::KeySetUnavailable(format!(
                "jwks fetch failed: {status}"
            )));
        }

        let jwks = Jwks::from_json(&body)?;
        Ok(FetchOutcome::Updated { jwks, etag })
    }
    .instrument(span)
    .await
}
