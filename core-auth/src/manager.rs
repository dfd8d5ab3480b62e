//! # Session Manager
//!
//! Tracks whether the library belongs to a signed-in account or to the local
//! guest, and persists the account session.
//!
//! ## Overview
//!
//! The `SessionManager` is the single source of truth for authentication
//! state inside the core. Library writes consult it to pick the initial sync
//! status of new entries, and the session transition handler drives it on
//! login and logout. Every change is broadcast as an [`AuthEvent`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{Session, SessionManager};
//! use core_runtime::events::EventBus;
//!
//! let manager = SessionManager::new(secure_store, EventBus::new(100));
//! manager.restore().await?;
//!
//! if !manager.is_authenticated().await {
//!     manager.sign_in(Session::new(session_id, account_id, username, now)).await?;
//! }
//! ```

use crate::error::{AuthError, Result};
use crate::session_store::SessionStore;
use crate::types::{AuthState, Session};
use bridge_traits::SecureStore;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Holds the current account session and keeps it persisted.
pub struct SessionManager {
    store: SessionStore,
    event_bus: EventBus,
    current_session: Arc<RwLock<Option<Session>>>,
}

impl SessionManager {
    pub fn new(secure_store: Arc<dyn SecureStore>, event_bus: EventBus) -> Self {
        Self {
            store: SessionStore::new(secure_store),
            event_bus,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    /// Loads the persisted session into memory.
    ///
    /// A corrupted entry is erased and the manager stays in guest mode; the
    /// failure is reported on the event bus rather than returned.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<Session>> {
        let session = match self.store.load_session().await {
            Ok(session) => session,
            Err(AuthError::Serialization(e)) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Auth(AuthEvent::AuthError {
                        message: "Persisted session was unreadable and has been cleared"
                            .to_string(),
                        recoverable: true,
                    }));
                None
            }
            Err(e) => return Err(e),
        };

        *self.current_session.write().await = session.clone();

        match &session {
            Some(session) => {
                info!(account_id = session.account_id, "Session restored");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Auth(AuthEvent::SessionRestored {
                        account_id: session.account_id,
                    }));
            }
            None => debug!("Starting as guest"),
        }

        Ok(session)
    }

    /// Establishes `session` as the current account session.
    ///
    /// The session is persisted before it becomes visible, so a storage
    /// failure leaves the manager unchanged.
    #[instrument(skip(self, session), fields(account_id = session.account_id))]
    pub async fn sign_in(&self, session: Session) -> Result<()> {
        session.validate()?;
        self.store.store_session(&session).await?;

        let event = CoreEvent::Auth(AuthEvent::SignedIn {
            account_id: session.account_id,
            username: session.username.clone(),
        });
        *self.current_session.write().await = Some(session);
        let _ = self.event_bus.emit(event);

        info!("Signed in");
        Ok(())
    }

    /// Clears the current session and returns it.
    ///
    /// In-memory state is cleared even if erasing the persisted copy fails,
    /// in which case the storage error is returned.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<Option<Session>> {
        let previous = self.current_session.write().await.take();
        let erase_result = self.store.delete_session().await;

        if let Some(session) = &previous {
            let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut {
                account_id: session.account_id,
            }));
            info!(account_id = session.account_id, "Signed out");
        } else {
            debug!("Sign-out requested while already a guest");
        }

        erase_result?;
        Ok(previous)
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.current_session.read().await.clone()
    }

    /// Returns the current session or [`AuthError::NotAuthenticated`].
    pub async fn require_session(&self) -> Result<Session> {
        self.current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current_session.read().await.is_some()
    }

    pub async fn auth_state(&self) -> AuthState {
        AuthState::from(self.current_session.read().await.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::tests::MemorySecureStore;
    use crate::session_store::SESSION_KEY;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;

    mock! {
        FailingStore {}

        #[async_trait::async_trait]
        impl SecureStore for FailingStore {
            async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()>;
            async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>>;
            async fn delete_secret(&self, key: &str) -> BridgeResult<()>;
        }
    }

    fn session() -> Session {
        Session::new("sess-1", 42, "viewer", 1_700_000_000)
    }

    #[tokio::test]
    async fn test_starts_as_guest() {
        let manager = SessionManager::new(Arc::new(MemorySecureStore::default()), EventBus::new(10));

        assert!(!manager.is_authenticated().await);
        assert_eq!(manager.auth_state().await, AuthState::Guest);
        assert!(matches!(
            manager.require_session().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_persists_and_emits() {
        let store = MemorySecureStore::default();
        let event_bus = EventBus::new(10);
        let mut events = event_bus.subscribe();
        let manager = SessionManager::new(Arc::new(store.clone()), event_bus);

        manager.sign_in(session()).await.unwrap();

        assert!(manager.is_authenticated().await);
        assert!(store.storage.lock().await.contains_key(SESSION_KEY));
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedIn {
                account_id: 42,
                username: "viewer".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_sign_in_rejects_invalid_session() {
        let manager = SessionManager::new(Arc::new(MemorySecureStore::default()), EventBus::new(10));

        let result = manager.sign_in(Session::new("", 42, "viewer", 0)).await;

        assert!(matches!(result, Err(AuthError::InvalidSession(_))));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_restore_across_instances() {
        let store = MemorySecureStore::default();
        let first = SessionManager::new(Arc::new(store.clone()), EventBus::new(10));
        first.sign_in(session()).await.unwrap();

        let second = SessionManager::new(Arc::new(store), EventBus::new(10));
        let restored = second.restore().await.unwrap();

        assert_eq!(restored, Some(session()));
        assert_eq!(
            second.auth_state().await,
            AuthState::SignedIn { account_id: 42 }
        );
    }

    #[tokio::test]
    async fn test_restore_discards_corrupted_session() {
        let store = MemorySecureStore::default();
        store.set_secret(SESSION_KEY, b"{broken").await.unwrap();
        let event_bus = EventBus::new(10);
        let mut events = event_bus.subscribe();
        let manager = SessionManager::new(Arc::new(store), event_bus);

        assert!(manager.restore().await.unwrap().is_none());
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::AuthError { recoverable: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let store = MemorySecureStore::default();
        let event_bus = EventBus::new(10);
        let manager = SessionManager::new(Arc::new(store.clone()), event_bus.clone());
        manager.sign_in(session()).await.unwrap();
        let mut events = event_bus.subscribe();

        let previous = manager.sign_out().await.unwrap();

        assert_eq!(previous.map(|s| s.account_id), Some(42));
        assert!(!manager.is_authenticated().await);
        assert!(store.storage.lock().await.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedOut { account_id: 42 })
        );
    }

    #[tokio::test]
    async fn test_sign_in_storage_failure_leaves_guest() {
        let mut failing = MockFailingStore::new();
        failing
            .expect_set_secret()
            .returning(|_, _| Err(BridgeError::NotAvailable("keychain locked".to_string())));
        let manager = SessionManager::new(Arc::new(failing), EventBus::new(10));

        let result = manager.sign_in(session()).await;

        assert!(matches!(result, Err(AuthError::SecureStorageUnavailable(_))));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_sign_out_clears_memory_even_if_erase_fails() {
        let mut failing = MockFailingStore::new();
        failing.expect_set_secret().returning(|_, _| Ok(()));
        failing
            .expect_delete_secret()
            .returning(|_| Err(BridgeError::OperationFailed("dbus error".to_string())));
        let manager = SessionManager::new(Arc::new(failing), EventBus::new(10));
        manager.sign_in(session()).await.unwrap();

        let result = manager.sign_out().await;

        assert!(result.is_err());
        assert!(!manager.is_authenticated().await);
    }
}
