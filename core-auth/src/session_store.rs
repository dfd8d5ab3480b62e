//! Secure Session Storage
//!
//! Persists the active [`Session`] through the host [`SecureStore`] so a
//! signed-in user stays signed in across restarts.
//!
//! ## Security
//!
//! - The session is serialized to JSON and stored under a single key
//! - Session identifiers are never logged
//! - A corrupted entry is erased on read

use crate::error::{AuthError, Result};
use crate::types::Session;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure-store key holding the serialized session.
pub const SESSION_KEY: &str = "library_sync.session";

/// Secure storage for the account session.
#[derive(Clone)]
pub struct SessionStore {
    secure_store: Arc<dyn SecureStore>,
}

impl SessionStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    /// Stores the session, overwriting any previous one.
    pub async fn store_session(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_vec(session)?;

        self.secure_store
            .set_secret(SESSION_KEY, &json)
            .await
            .map_err(|e| {
                warn!(
                    account_id = session.account_id,
                    error = %e,
                    "Failed to store session in secure storage"
                );
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(account_id = session.account_id, "Session stored securely");
        Ok(())
    }

    /// Loads the persisted session.
    ///
    /// Returns `Ok(None)` when nothing is stored. An undecodable entry is
    /// deleted and reported as [`AuthError::Serialization`].
    pub async fn load_session(&self) -> Result<Option<Session>> {
        let data = self.secure_store.get_secret(SESSION_KEY).await.map_err(|e| {
            warn!(error = %e, "Failed to read session from secure storage");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!("No persisted session");
            return Ok(None);
        };

        match serde_json::from_slice::<Session>(&data) {
            Ok(session) => {
                debug!(account_id = session.account_id, "Persisted session loaded");
                Ok(Some(session))
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is corrupted, erasing it");
                if let Err(delete_err) = self.secure_store.delete_secret(SESSION_KEY).await {
                    warn!(error = %delete_err, "Failed to erase corrupted session");
                }
                Err(AuthError::Serialization(e))
            }
        }
    }

    /// Erases the persisted session. Succeeds when nothing is stored.
    pub async fn delete_session(&self) -> Result<()> {
        self.secure_store
            .delete_secret(SESSION_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to erase session from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Session erased");
        Ok(())
    }

    pub async fn has_session(&self) -> Result<bool> {
        self.secure_store
            .has_secret(SESSION_KEY)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory `SecureStore` shared by the crate's tests.
    #[derive(Clone, Default)]
    pub(crate) struct MemorySecureStore {
        pub(crate) storage: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    #[async_trait::async_trait]
    impl SecureStore for MemorySecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
            self.storage
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_and_load_session() {
        let store = SessionStore::new(Arc::new(MemorySecureStore::default()));
        let session = Session::new("sess-1", 42, "viewer", 1_700_000_000);

        store.store_session(&session).await.unwrap();

        assert!(store.has_session().await.unwrap());
        assert_eq!(store.load_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let store = SessionStore::new(Arc::new(MemorySecureStore::default()));
        assert!(store.load_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SessionStore::new(Arc::new(MemorySecureStore::default()));
        store.delete_session().await.unwrap();

        store
            .store_session(&Session::new("sess-1", 42, "viewer", 0))
            .await
            .unwrap();
        store.delete_session().await.unwrap();

        assert!(!store.has_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_session_is_erased() {
        let backing = MemorySecureStore::default();
        backing
            .set_secret(SESSION_KEY, b"not json")
            .await
            .unwrap();
        let store = SessionStore::new(Arc::new(backing.clone()));

        let result = store.load_session().await;

        assert!(matches!(result, Err(AuthError::Serialization(_))));
        assert!(backing.storage.lock().await.is_empty());
    }
}
