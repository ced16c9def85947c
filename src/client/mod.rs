//! Client side of the sign-in flow, as driven by the mobile app.
//!
//! [`AuthClient::sign_in`] asks the backend to start a flow, hands the
//! authorization URL to a [`BrowserAuthenticator`], and redeems the captured
//! redirect for a session. Closing the browser is an ordinary outcome
//! ([`SignInOutcome::Cancelled`]), not an error.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::api::handlers::types::{CallbackRequest, MeResponse, SessionResponse, StartResponse};

pub type AuthSession = SessionResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid backend URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("request to backend failed")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Backend { status: u16, message: String },
    #[error("unexpected server response during sign in")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("login callback was malformed")]
    MalformedCallback,
    #[error("browser authentication failed: {0}")]
    Browser(String),
}

/// What the browser step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The IdP redirected to the callback scheme with this URL.
    Redirected(Url),
    /// The user closed the browser before finishing.
    Cancelled,
}

/// Opens the authorization URL and waits for the redirect to `callback_scheme`.
/// Called at most once per sign-in.
pub trait BrowserAuthenticator {
    fn authenticate(
        &self,
        authorization_url: &Url,
        callback_scheme: &str,
    ) -> impl Future<Output = Result<BrowserOutcome, ClientError>> + Send;
}

#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn(AuthSession),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    base_url: Url,
    provider: String,
}

impl AuthClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let trimmed = base_url.trim();
        // Url::join replaces the last segment unless the base ends with '/'.
        let base_url = if trimmed.ends_with('/') {
            Url::parse(trimmed)?
        } else {
            Url::parse(&format!("{trimmed}/"))?
        };
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url,
            provider: "uci".to_string(),
        })
    }

    #[must_use]
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Run the full sign-in: start, browser, callback.
    ///
    /// # Errors
    /// Backend rejections carry the backend's message; a redirect without
    /// `code` and `state` is `MalformedCallback`.
    #[instrument(skip_all, fields(provider = %self.provider))]
    pub async fn sign_in<B: BrowserAuthenticator>(
        &self,
        email_hint: Option<&str>,
        browser: &B,
    ) -> Result<SignInOutcome, ClientError> {
        let start = self.start(email_hint).await?;
        let authorization_url = Url::parse(&start.authorization_url)?;

        let redirect = match browser
            .authenticate(&authorization_url, &start.callback_scheme)
            .await?
        {
            BrowserOutcome::Redirected(url) => url,
            BrowserOutcome::Cancelled => {
                debug!("sign in cancelled in browser");
                return Ok(SignInOutcome::Cancelled);
            }
        };

        let (code, state) = callback_params(&redirect).ok_or(ClientError::MalformedCallback)?;
        let session = self.callback(code, state).await?;
        Ok(SignInOutcome::SignedIn(session))
    }

    /// Identity behind a session token.
    ///
    /// # Errors
    /// A rejected token surfaces as `Backend { status: 401, .. }`.
    pub async fn me(&self, session_token: &str) -> Result<MeResponse, ClientError> {
        let response = self
            .client
            .get(self.base_url.join("me")?)
            .bearer_auth(session_token)
            .send()
            .await?;
        decode(response).await
    }

    async fn start(&self, email_hint: Option<&str>) -> Result<StartResponse, ClientError> {
        let mut url = self
            .base_url
            .join(&format!("auth/{}/start", self.provider))?;
        if let Some(hint) = email_hint.map(str::trim).filter(|hint| !hint.is_empty()) {
            url.query_pairs_mut().append_pair("email_hint", hint);
        }
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    async fn callback(&self, code: String, state: String) -> Result<AuthSession, ClientError> {
        let url = self
            .base_url
            .join(&format!("auth/{}/callback", self.provider))?;
        let request = CallbackRequest {
            code: Some(code),
            state: Some(state),
            redirect_uri: None,
        };
        let response = self.client.post(url).json(&request).send().await?;
        decode(response).await
    }
}

fn callback_params(redirect: &Url) -> Option<(String, String)> {
    let mut code = None;
    let mut state = None;
    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    Some((
        code.filter(|code| !code.is_empty())?,
        state.filter(|state| !state.is_empty())?,
    ))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::Backend {
            status: status.as_u16(),
            message: body,
        });
    }
    serde_json::from_str(&body).map_err(ClientError::InvalidResponse)
}
