//! Push local intent to the remote catalog
//!
//! A push looks at the row as it is *now*, not as it was when the work was
//! scheduled: a visible row is added remotely, a missing or soft-deleted row
//! is removed remotely. Confirmations then move the row through the state
//! machine. Pushing the same key twice is harmless.

use crate::error::Result;
use crate::reconcile::SyncResult;
use crate::remote::RemoteLibrary;
use crate::state::{self, SyncTransition, Transition};
use core_library::{EntryKey, LibraryEntry, LibraryList, LibraryRepository, MediaType, SyncStatus};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a push did remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    Added,
    Removed,
}

pub struct PushOperation {
    repository: Arc<dyn LibraryRepository>,
    remote: Arc<dyn RemoteLibrary>,
}

impl PushOperation {
    pub fn new(repository: Arc<dyn LibraryRepository>, remote: Arc<dyn RemoteLibrary>) -> Self {
        Self { repository, remote }
    }

    /// Push one key.
    ///
    /// `exists_locally` is the caller's view at scheduling time; the current
    /// local row wins when they disagree.
    #[instrument(skip(self), fields(list = %list))]
    pub async fn push_item(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
        exists_locally: bool,
    ) -> Result<PushAction> {
        let key = EntryKey::new(media_id, media_type);
        let status = self
            .repository
            .sync_status_of(list, media_id, media_type)
            .await?;
        let visible = status.map(state::is_visible).unwrap_or(false);

        if visible != exists_locally {
            debug!(key = %key, visible, exists_locally, "Local state changed since scheduling");
        }

        if visible {
            self.remote.add_item(list, media_id, media_type).await?;

            let updated = self.repository.mark_as_synced(list, &[key]).await?;
            if updated == 0 {
                debug!(key = %key, "Entry changed before add was confirmed");
            }
            return Ok(PushAction::Added);
        }

        self.remote.remove_item(list, media_id, media_type).await?;

        // Re-read: the user may have re-added the key while the request was in flight.
        let current = self
            .repository
            .sync_status_of(list, media_id, media_type)
            .await?;
        if let Some(current) = current {
            if let Ok(Transition::Removed) =
                state::next(current, SyncTransition::RemoteDeleteConfirmed)
            {
                self.repository.delete(list, media_id, media_type).await?;
            }
        }

        Ok(PushAction::Removed)
    }

    /// Push every `PENDING_PUSH` and `PENDING_DELETE` row of `list`.
    #[instrument(skip(self), fields(list = %list))]
    pub async fn push_pending(&self, list: LibraryList) -> Result<SyncResult> {
        let mut entries = self
            .repository
            .get_by_status(list, SyncStatus::PendingPush)
            .await?;
        entries.extend(self.repository.get_pending_delete(list).await?);

        let result = self.push_entries(list, entries).await;
        info!(pushed = result.pushed, errors = result.errors, "Pending changes pushed");
        Ok(result)
    }

    /// Upload the guest's `LOCAL_ONLY` rows of `list` to the signed-in account.
    ///
    /// Only runs on explicit request; guest rows are otherwise kept local.
    #[instrument(skip(self), fields(list = %list))]
    pub async fn push_guest_items(&self, list: LibraryList) -> Result<SyncResult> {
        let entries = self
            .repository
            .get_by_status(list, SyncStatus::LocalOnly)
            .await?;

        let result = self.push_entries(list, entries).await;
        info!(pushed = result.pushed, errors = result.errors, "Guest entries uploaded");
        Ok(result)
    }

    async fn push_entries(&self, list: LibraryList, entries: Vec<LibraryEntry>) -> SyncResult {
        let mut result = SyncResult::default();

        for entry in entries {
            let key = entry.key();
            match self
                .push_item(
                    list,
                    key.media_id,
                    key.media_type,
                    state::is_visible(entry.sync_status),
                )
                .await
            {
                Ok(_) => result.pushed += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Push failed");
                    result.errors += 1;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use core_library::db::create_test_pool;
    use core_library::{LibraryItem, SqliteLibraryRepository};
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Remote list kept in memory; `fail` makes every call error.
    #[derive(Default)]
    struct MemoryRemote {
        items: Mutex<HashSet<(LibraryList, EntryKey)>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteLibrary for MemoryRemote {
        async fn fetch_list(&self, list: LibraryList) -> Result<Vec<LibraryItem>> {
            Ok(self
                .items
                .lock()
                .await
                .iter()
                .filter(|(l, _)| *l == list)
                .map(|(_, key)| LibraryItem::new(key.media_id, key.media_type, "remote", ""))
                .collect())
        }

        async fn add_item(&self, list: LibraryList, media_id: i64, media_type: MediaType) -> Result<()> {
            if self.fail {
                return Err(SyncError::Remote("offline".to_string()));
            }
            self.items
                .lock()
                .await
                .insert((list, EntryKey::new(media_id, media_type)));
            Ok(())
        }

        async fn remove_item(&self, list: LibraryList, media_id: i64, media_type: MediaType) -> Result<()> {
            if self.fail {
                return Err(SyncError::Remote("offline".to_string()));
            }
            self.items
                .lock()
                .await
                .remove(&(list, EntryKey::new(media_id, media_type)));
            Ok(())
        }
    }

    const LIST: LibraryList = LibraryList::Watchlist;

    async fn setup(remote: MemoryRemote) -> (Arc<SqliteLibraryRepository>, Arc<MemoryRemote>, PushOperation) {
        let repo = Arc::new(SqliteLibraryRepository::new(create_test_pool().await.unwrap()));
        let remote = Arc::new(remote);
        let push = PushOperation::new(repo.clone(), remote.clone());
        (repo, remote, push)
    }

    async fn seed(repo: &SqliteLibraryRepository, media_id: i64, status: SyncStatus) {
        repo.upsert(
            LIST,
            &LibraryItem::new(media_id, MediaType::Movie, "Local", "").into_entry(status, 1),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_push_visible_item_marks_synced() {
        let (repo, remote, push) = setup(MemoryRemote::default()).await;
        seed(&repo, 550, SyncStatus::PendingPush).await;

        let action = push.push_item(LIST, 550, MediaType::Movie, true).await.unwrap();

        assert_eq!(action, PushAction::Added);
        assert_eq!(
            repo.sync_status_of(LIST, 550, MediaType::Movie).await.unwrap(),
            Some(SyncStatus::Synced)
        );
        assert!(remote.items.lock().await.contains(&(LIST, EntryKey::new(550, MediaType::Movie))));

        // Idempotent
        push.push_item(LIST, 550, MediaType::Movie, true).await.unwrap();
        assert_eq!(repo.count_all(LIST).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_pending_delete_removes_row() {
        let (repo, remote, push) = setup(MemoryRemote::default()).await;
        remote
            .items
            .lock()
            .await
            .insert((LIST, EntryKey::new(7, MediaType::Movie)));
        seed(&repo, 7, SyncStatus::PendingDelete).await;

        let action = push.push_item(LIST, 7, MediaType::Movie, false).await.unwrap();

        assert_eq!(action, PushAction::Removed);
        assert_eq!(repo.count_all(LIST).await.unwrap(), 0);
        assert!(remote.items.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_current_local_state_wins_over_hint() {
        let (repo, remote, push) = setup(MemoryRemote::default()).await;
        seed(&repo, 8, SyncStatus::PendingPush).await;

        let action = push.push_item(LIST, 8, MediaType::Movie, false).await.unwrap();

        assert_eq!(action, PushAction::Added);
        assert_eq!(remote.items.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_push_leaves_row_pending() {
        let (repo, _remote, push) = setup(MemoryRemote { fail: true, ..Default::default() }).await;
        seed(&repo, 9, SyncStatus::PendingDelete).await;

        assert!(push.push_item(LIST, 9, MediaType::Movie, false).await.is_err());
        assert_eq!(
            repo.sync_status_of(LIST, 9, MediaType::Movie).await.unwrap(),
            Some(SyncStatus::PendingDelete)
        );
    }

    #[tokio::test]
    async fn test_push_pending_skips_guest_rows() {
        let (repo, remote, push) = setup(MemoryRemote::default()).await;
        seed(&repo, 1, SyncStatus::LocalOnly).await;
        seed(&repo, 2, SyncStatus::PendingPush).await;
        seed(&repo, 3, SyncStatus::PendingDelete).await;
        seed(&repo, 4, SyncStatus::Synced).await;

        let result = push.push_pending(LIST).await.unwrap();

        assert_eq!(result.pushed, 2);
        assert_eq!(result.errors, 0);
        assert_eq!(
            repo.sync_status_of(LIST, 1, MediaType::Movie).await.unwrap(),
            Some(SyncStatus::LocalOnly)
        );
        assert_eq!(repo.sync_status_of(LIST, 3, MediaType::Movie).await.unwrap(), None);
        let remote_items = remote.items.lock().await;
        assert_eq!(remote_items.len(), 1);
        assert!(remote_items.contains(&(LIST, EntryKey::new(2, MediaType::Movie))));
    }

    #[tokio::test]
    async fn test_push_guest_items_on_request() {
        let (repo, _remote, push) = setup(MemoryRemote::default()).await;
        seed(&repo, 1, SyncStatus::LocalOnly).await;
        seed(&repo, 2, SyncStatus::LocalOnly).await;

        let result = push.push_guest_items(LIST).await.unwrap();

        assert_eq!(result.pushed, 2);
        assert_eq!(
            repo.get_by_status(LIST, SyncStatus::Synced).await.unwrap().len(),
            2
        );
    }
}
