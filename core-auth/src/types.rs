use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An established account session against the remote catalog.
///
/// The login handshake happens outside the core; this type only carries its
/// outcome. `session_id` is a credential and is never printed by `Debug`.
///
/// # Examples
///
/// ```
/// use core_auth::Session;
///
/// let session = Session::new("4f2a9c", 42, "viewer", 1_700_000_000);
/// assert!(session.validate().is_ok());
/// assert!(!format!("{:?}", session).contains("4f2a9c"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub account_id: i64,
    pub username: String,
    /// Unix seconds
    pub started_at: i64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        account_id: i64,
        username: impl Into<String>,
        started_at: i64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            account_id,
            username: username.into(),
            started_at,
        }
    }

    /// Rejects sessions that could not have come from a completed handshake.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(AuthError::InvalidSession(
                "session_id cannot be empty".to_string(),
            ));
        }
        if self.account_id <= 0 {
            return Err(AuthError::InvalidSession(format!(
                "account_id must be positive, got {}",
                self.account_id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Whether library writes belong to an account or to the local guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    Guest,
    SignedIn { account_id: i64 },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn { .. })
    }
}

impl From<Option<&Session>> for AuthState {
    fn from(session: Option<&Session>) -> Self {
        match session {
            Some(session) => AuthState::SignedIn {
                account_id: session.account_id,
            },
            None => AuthState::Guest,
        }
    }
}
