//! Identity provider registration and authorization URL construction.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use super::flow::FlowStart;

const DEFAULT_SCOPES: &str = "openid profile email";
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 5;

/// Static settings for the single configured IdP.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    name: String,
    issuer: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    jwks_uri: Url,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_uri: String,
    callback_scheme: String,
    scopes: String,
    http_timeout: Duration,
}

impl ProviderConfig {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        issuer: String,
        authorization_endpoint: Url,
        token_endpoint: Url,
        jwks_uri: Url,
        client_id: String,
        redirect_uri: String,
        callback_scheme: String,
    ) -> Self {
        Self {
            name,
            issuer,
            authorization_endpoint,
            token_endpoint,
            jwks_uri,
            client_id,
            client_secret: None,
            redirect_uri,
            callback_scheme,
            scopes: DEFAULT_SCOPES.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: Option<SecretString>) -> Self {
        self.client_secret = secret;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: String) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn callback_scheme(&self) -> &str {
        &self.callback_scheme
    }

    #[must_use]
    pub fn scopes(&self) -> &str {
        &self.scopes
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Build the IdP authorization URL for a freshly started flow.
    ///
    /// `login_hint` is forwarded only when it is non-empty after trimming.
    #[must_use]
    pub fn authorization_url(&self, flow: &FlowStart, login_hint: Option<&str>) -> Url {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scopes)
                .append_pair("state", &flow.state)
                .append_pair("nonce", &flow.nonce)
                .append_pair("code_challenge", &flow.code_challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(hint) = login_hint.map(str::trim).filter(|hint| !hint.is_empty()) {
                query.append_pair("login_hint", hint);
            }
        }
        url
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;

    pub(crate) fn provider_for(base: &str) -> Result<ProviderConfig> {
        Ok(ProviderConfig::new(
            "uci".to_string(),
            "https://login.uci.test".to_string(),
            Url::parse(&format!("{base}/authorize"))?,
            Url::parse(&format!("{base}/token"))?,
            Url::parse(&format!("{base}/jwks"))?,
            "healthu-client".to_string(),
            "healthu://auth/callback".to_string(),
            "healthu".to_string(),
        ))
    }

    fn flow() -> FlowStart {
        FlowStart {
            state: "state-1".to_string(),
            nonce: "nonce-1".to_string(),
            code_verifier: "verifier".to_string(),
            code_challenge: "challenge".to_string(),
        }
    }

    #[test]
    fn authorization_url_carries_pkce_parameters() -> Result<()> {
        let provider = provider_for("https://idp.test")?;
        let url = provider.authorization_url(&flow(), None);
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert_eq!(query.get("client_id").map(String::as_str), Some("healthu-client"));
        assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            query.get("redirect_uri").map(String::as_str),
            Some("healthu://auth/callback")
        );
        assert_eq!(
            query.get("scope").map(String::as_str),
            Some("openid profile email")
        );
        assert_eq!(query.get("state").map(String::as_str), Some("state-1"));
        assert_eq!(query.get("nonce").map(String::as_str), Some("nonce-1"));
        assert_eq!(query.get("code_challenge").map(String::as_str), Some("challenge"));
        assert_eq!(
            query.get("code_challenge_method").map(String::as_str),
            Some("S256")
        );
        assert!(!query.contains_key("login_hint"));
        Ok(())
    }

    #[test]
    fn login_hint_is_trimmed_and_blank_hints_dropped() -> Result<()> {
        let provider = provider_for("https://idp.test")?;

        let url = provider.authorization_url(&flow(), Some("  jdoe@uci.edu "));
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("login_hint").map(String::as_str), Some("jdoe@uci.edu"));

        let url = provider.authorization_url(&flow(), Some("   "));
        assert!(!url.query_pairs().any(|(key, _)| key == "login_hint"));
        Ok(())
    }
}
