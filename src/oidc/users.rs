//! Local user records, one per IdP subject.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::now_unix_millis;
use super::store::{KeyValueStore, MemoryStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub sub: String,
    pub email: String,
    pub is_student: bool,
    pub created_at_unix_ms: u64,
    /// Unset on the login that created the record.
    pub last_login_at_unix_ms: Option<u64>,
}

/// User records keyed by `sub`. Concurrent logins for the same subject are
/// last-write-wins.
pub struct UserDirectory {
    store: Arc<dyn KeyValueStore<User>>,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users", &self.store.len())
            .finish()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl UserDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore<User>>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<User>::new()))
    }

    /// Create the user for `sub`, or refresh email and affiliation on an
    /// existing one and stamp the login time.
    #[instrument(skip(self, email))]
    pub fn upsert(&self, sub: &str, email: &str, is_student: bool) -> User {
        self.upsert_at(sub, email, is_student, now_unix_millis())
    }

    pub(crate) fn upsert_at(&self, sub: &str, email: &str, is_student: bool, now_unix_ms: u64) -> User {
        self.store.upsert_with(sub, &mut |current| match current {
            Some(existing) => User {
                email: email.to_string(),
                is_student,
                last_login_at_unix_ms: Some(now_unix_ms),
                ..existing
            },
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    sub: sub.to_string(),
                    email: email.to_string(),
                    is_student,
                    created_at_unix_ms: now_unix_ms,
                    last_login_at_unix_ms: None,
                };
                info!(user_id = %user.id, "created user");
                user
            }
        })
    }

    #[must_use]
    pub fn find_by_sub(&self, sub: &str) -> Option<User> {
        self.store.get(sub)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
