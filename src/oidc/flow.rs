//! One-time login flow state, keyed by the OAuth `state` parameter.
//!
//! A flow is recorded when the client asks to start a login and is removed
//! the first time its `state` comes back, whatever happens afterwards. That
//! single removal is what stops an authorization code from being redeemed
//! twice.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::error::FlowError;
use super::now_unix_millis;
use super::pkce;
use super::store::{KeyValueStore, MemoryStore};

pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug)]
pub struct PendingAuthFlow {
    pub nonce: String,
    pub code_verifier: String,
    pub created_at_unix_ms: u64,
}

impl PendingAuthFlow {
    fn age_ms(&self, now_unix_ms: u64) -> u64 {
        now_unix_ms.saturating_sub(self.created_at_unix_ms)
    }
}

/// Values produced when a flow starts. Everything here goes to the IdP or the
/// client except `code_verifier`, which stays in the vault.
#[derive(Debug)]
pub struct FlowStart {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

pub struct FlowVault {
    store: Arc<dyn KeyValueStore<PendingAuthFlow>>,
    ttl: Duration,
}

impl std::fmt::Debug for FlowVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowVault")
            .field("pending", &self.store.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for FlowVault {
    fn default() -> Self {
        Self::in_memory(DEFAULT_FLOW_TTL)
    }
}

impl FlowVault {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore<PendingAuthFlow>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::<PendingAuthFlow>::new()), ttl)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record a new flow and return its correlation values.
    ///
    /// # Errors
    /// Returns an error if random values cannot be generated.
    #[instrument(skip(self))]
    pub fn begin(&self) -> Result<FlowStart, FlowError> {
        self.begin_at(now_unix_millis())
    }

    pub(crate) fn begin_at(&self, now_unix_ms: u64) -> Result<FlowStart, FlowError> {
        let state = pkce::generate_state()?;
        let nonce = pkce::generate_nonce()?;
        let code_verifier = pkce::generate_code_verifier()?;
        let code_challenge = pkce::code_challenge(&code_verifier);

        // Abandoned flows are dropped here so the map stays bounded even
        // without the background reaper.
        self.purge_expired_at(now_unix_ms);

        self.store.insert(
            state.clone(),
            PendingAuthFlow {
                nonce: nonce.clone(),
                code_verifier: code_verifier.clone(),
                created_at_unix_ms: now_unix_ms,
            },
        );

        Ok(FlowStart {
            state,
            nonce,
            code_verifier,
            code_challenge,
        })
    }

    /// Remove the flow for `state` and return it if it is still within the TTL.
    ///
    /// # Errors
    /// `NotFound` when the state was never issued or was already consumed,
    /// `Expired` when it was issued more than the TTL ago.
    #[instrument(skip_all)]
    pub fn consume(&self, state: &str) -> Result<PendingAuthFlow, FlowError> {
        self.consume_at(state, now_unix_millis())
    }

    pub(crate) fn consume_at(
        &self,
        state: &str,
        now_unix_ms: u64,
    ) -> Result<PendingAuthFlow, FlowError> {
        let flow = self.store.take(state).ok_or(FlowError::NotFound)?;
        if u128::from(flow.age_ms(now_unix_ms)) > self.ttl.as_millis() {
            debug!(age_ms = flow.age_ms(now_unix_ms), "login flow expired");
            return Err(FlowError::Expired);
        }
        Ok(flow)
    }

    /// Drop every flow older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_unix_millis())
    }

    fn purge_expired_at(&self, now_unix_ms: u64) -> usize {
        let ttl_ms = self.ttl.as_millis();
        let removed = self
            .store
            .retain(&|flow| u128::from(flow.age_ms(now_unix_ms)) <= ttl_ms);
        if removed > 0 {
            debug!(removed, "purged expired login flows");
        }
        removed
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.store.len()
    }
}
