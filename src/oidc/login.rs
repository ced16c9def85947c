//! The login pipeline: start a flow, then turn the IdP callback into a session.

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use url::Url;

use super::error::{AssertionError, ExchangeError, FlowError, PolicyRejection, SessionError};
use super::exchange::TokenExchangeClient;
use super::flow::FlowVault;
use super::id_token::IdTokenVerifier;
use super::policy::PolicyEngine;
use super::provider::ProviderConfig;
use super::session::{IssuedSession, SessionIssuer};
use super::users::{User, UserDirectory};

const AUTHENTICATION_FAILED: &str = "Authentication failed";

/// Everything that can end a callback without a session.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("missing code or state")]
    MissingParameters,
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error(transparent)]
    Policy(#[from] PolicyRejection),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// How a failure is reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginErrorKind {
    BadRequest,
    Forbidden,
    Internal,
}

impl LoginError {
    #[must_use]
    pub fn kind(&self) -> LoginErrorKind {
        match self {
            Self::MissingParameters
            | Self::Flow(FlowError::NotFound | FlowError::Expired) => LoginErrorKind::BadRequest,
            Self::Policy(_) => LoginErrorKind::Forbidden,
            // a token response without id_token is an IdP fault, so 500 rather than 400
            Self::Flow(FlowError::Rng(_))
            | Self::Exchange(_)
            | Self::Assertion(_)
            | Self::Session(_) => LoginErrorKind::Internal,
        }
    }

    /// Text safe to show the user. Upstream and verification details are
    /// never included.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::MissingParameters => "Missing code/state".to_string(),
            Self::Flow(FlowError::NotFound) => "Invalid state".to_string(),
            Self::Flow(FlowError::Expired) => "Authentication request expired".to_string(),
            Self::Policy(rejection) => rejection.to_string(),
            Self::Flow(FlowError::Rng(_))
            | Self::Exchange(_)
            | Self::Assertion(_)
            | Self::Session(_) => AUTHENTICATION_FAILED.to_string(),
        }
    }
}

/// What the client needs to open the IdP in a browser.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub authorization_url: Url,
    pub state: String,
    pub callback_scheme: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: IssuedSession,
}

#[derive(Debug)]
pub struct LoginService {
    provider: ProviderConfig,
    vault: FlowVault,
    exchange: TokenExchangeClient,
    verifier: IdTokenVerifier,
    policy: PolicyEngine,
    users: UserDirectory,
    sessions: SessionIssuer,
}

impl LoginService {
    /// Wire the pipeline for `provider` with an in-memory vault and user
    /// directory and the default policy.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(provider: ProviderConfig, sessions: SessionIssuer) -> Result<Self, reqwest::Error> {
        let exchange = TokenExchangeClient::new(provider.clone())?;
        let verifier = IdTokenVerifier::new(&provider)?;
        Ok(Self {
            provider,
            vault: FlowVault::default(),
            exchange,
            verifier,
            policy: PolicyEngine::default(),
            users: UserDirectory::default(),
            sessions,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PolicyEngine) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_flow_vault(mut self, vault: FlowVault) -> Self {
        self.vault = vault;
        self
    }

    #[must_use]
    pub fn with_user_directory(mut self, users: UserDirectory) -> Self {
        self.users = users;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    #[must_use]
    pub fn vault(&self) -> &FlowVault {
        &self.vault
    }

    #[must_use]
    pub fn verifier(&self) -> &IdTokenVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// Record a new flow and build the authorization URL for it.
    ///
    /// # Errors
    /// Returns an error if random values cannot be generated.
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    pub fn start(&self, login_hint: Option<&str>) -> Result<LoginStart, LoginError> {
        let flow = self.vault.begin()?;
        let authorization_url = self.provider.authorization_url(&flow, login_hint);
        Ok(LoginStart {
            authorization_url,
            state: flow.state,
            callback_scheme: self.provider.callback_scheme().to_string(),
        })
    }

    /// Complete a login from the callback parameters.
    ///
    /// The flow for `state` is consumed before anything else, so a callback
    /// can be attempted only once whatever its outcome. `redirect_uri`
    /// overrides the configured one for the token exchange.
    ///
    /// # Errors
    /// See [`LoginError`]; every failure is logged here.
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn complete(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        let result = self.run_callback(code, state, redirect_uri).await;
        match &result {
            Ok(outcome) => info!(user_id = %outcome.user.id, "login completed"),
            Err(err @ LoginError::Policy(_)) => warn!(error = %err, "login rejected by policy"),
            Err(err) => match err.kind() {
                LoginErrorKind::Internal => error!(error = ?err, "login failed"),
                _ => warn!(error = %err, "login callback refused"),
            },
        }
        result
    }

    async fn run_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        let state = non_empty(state).ok_or(LoginError::MissingParameters)?;
        let flow = self.vault.consume(state)?;
        let code = non_empty(code).ok_or(LoginError::MissingParameters)?;

        let redirect_uri = non_empty(redirect_uri).unwrap_or(self.provider.redirect_uri());
        let id_token = self
            .exchange
            .exchange(code, &flow.code_verifier, redirect_uri)
            .await?;

        let claims = self.verifier.verify(&id_token, &flow.nonce).await?;
        let decision = self.policy.evaluate(&claims)?;

        let user = self
            .users
            .upsert(&claims.sub, &decision.email, decision.is_student);
        let session = self.sessions.issue(&user)?;

        Ok(LoginOutcome { user, session })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
