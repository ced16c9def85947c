//! Authorization code → token exchange against the IdP token endpoint.

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{error, info_span, Instrument};

use super::error::ExchangeError;
use super::provider::ProviderConfig;

// Upstream bodies are logged for diagnosis; keep the log line bounded.
const MAX_LOGGED_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    client: Client,
    provider: ProviderConfig,
}

impl TokenExchangeClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(provider: ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(provider.http_timeout())
            .build()?;
        Ok(Self { client, provider })
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Trade an authorization code (plus the PKCE verifier) for tokens.
    ///
    /// Returns the ID token; the rest of the response is not used.
    ///
    /// # Errors
    /// `TokenExchangeFailed` for any non-2xx answer, `MissingIdentityAssertion`
    /// when the response has no `id_token`, `Request` on transport failure or timeout.
    pub async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<String, ExchangeError> {
        let response = self
            .request_tokens(code, code_verifier, redirect_uri)
            .await?;
        response
            .id_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(ExchangeError::MissingIdentityAssertion)
    }

    /// Issue the token request and parse the JSON body.
    ///
    /// # Errors
    /// See [`Self::exchange`].
    pub async fn request_tokens(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ExchangeError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.provider.client_id()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.provider.client_secret() {
            form.push(("client_secret", secret.expose_secret()));
        }

        let url = self.provider.token_endpoint().as_str();
        let span = info_span!("idp.token.exchange", http.method = "POST", url = %url);
        async {
            let response = self.client.post(url).form(&form).send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                error!(
                    status = status.as_u16(),
                    body = %truncate(&body, MAX_LOGGED_BODY_CHARS),
                    "token exchange rejected by identity provider"
                );
                return Err(ExchangeError::TokenExchangeFailed {
                    status: status.as_u16(),
                    body,
                });
            }

            serde_json::from_str(&body).map_err(ExchangeError::InvalidResponse)
        }
        .instrument(span)
        .await
    }
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
