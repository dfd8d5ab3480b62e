//! Secure Storage Abstraction

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Holds the account session so it survives process restarts:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service
///
/// Values returned from the store must not be logged.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value under `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
