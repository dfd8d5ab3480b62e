//! # Library Service
//!
//! UI-facing operations on favorites and watchlist.
//!
//! ## Overview
//!
//! A toggle is applied in two phases:
//!
//! 1. **Local**: the store changes immediately and observers see it.
//! 2. **Durable confirmation**: when signed in, a library task is enqueued to
//!    confirm the change remotely.
//!
//! If phase 2 cannot be enqueued, phase 1 is reverted and the error returned,
//! so a signed-in user never has a local change that nothing will push.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let outcome = service.toggle(LibraryList::Favorites, item).await?;
//! if outcome.added {
//!     println!("added to favorites");
//! }
//!
//! let mut favorites = service.observe(LibraryList::Favorites, MediaType::Movie);
//! while let Some(entries) = favorites.next().await {
//!     render(entries?);
//! }
//! ```

use crate::error::{Result, SyncError};
use crate::push::PushOperation;
use crate::reconcile::SyncResult;
use crate::scheduler::{LibrarySyncScheduler, LibraryTask};
use crate::state::{self, SyncTransition};
use bridge_traits::background::TaskId;
use bridge_traits::time::Clock;
use core_auth::SessionManager;
use core_library::{
    EntryKey, LibraryEntry, LibraryItem, LibraryList, LibraryRepository, MediaType, SyncStatus,
};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of a toggle, enough to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub key: EntryKey,
    /// Whether the item is now in the list
    pub added: bool,
    /// The row as it was before the toggle, pending deletion included
    pub previous: Option<LibraryEntry>,
    pub task_scheduled: bool,
}

pub struct LibraryService {
    repository: Arc<dyn LibraryRepository>,
    session: Arc<SessionManager>,
    scheduler: Arc<LibrarySyncScheduler>,
    pusher: Arc<PushOperation>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl LibraryService {
    pub fn new(
        repository: Arc<dyn LibraryRepository>,
        session: Arc<SessionManager>,
        scheduler: Arc<LibrarySyncScheduler>,
        pusher: Arc<PushOperation>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            session,
            scheduler,
            pusher,
            clock,
            event_bus,
        }
    }

    /// Add the item if it is not visible in `list`, remove it otherwise.
    ///
    /// # Errors
    /// - Local store failures, with nothing changed
    /// - [`SyncError::Scheduling`] after the local change has been reverted
    #[instrument(skip(self, item), fields(list = %list, key = %item.key()))]
    pub async fn toggle(&self, list: LibraryList, item: LibraryItem) -> Result<ToggleOutcome> {
        let key = item.key();
        let authenticated = self.session.is_authenticated().await;
        let previous = self
            .repository
            .get_raw_entry(list, key.media_id, key.media_type)
            .await?;
        let visible = previous
            .as_ref()
            .map(|entry| state::is_visible(entry.sync_status))
            .unwrap_or(false);

        let mut outcome = ToggleOutcome {
            key,
            added: !visible,
            previous,
            task_scheduled: false,
        };

        if visible {
            self.remove_locally(list, &outcome, authenticated).await?;
        } else {
            self.add_locally(list, item, authenticated).await?;
        }

        if !authenticated {
            return Ok(outcome);
        }

        let task = LibraryTask::new(list, key.media_id, key.media_type, outcome.added);
        match self.scheduler.schedule_library_task(&task).await {
            Ok(_) => {
                outcome.task_scheduled = true;
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Reverting toggle, confirmation could not be scheduled");
                if let Err(revert_err) = self.revert(list, &outcome).await {
                    warn!(error = %revert_err, "Failed to revert toggle");
                }
                Err(e)
            }
        }
    }

    async fn remove_locally(
        &self,
        list: LibraryList,
        outcome: &ToggleOutcome,
        authenticated: bool,
    ) -> Result<()> {
        let key = outcome.key;
        let status = outcome
            .previous
            .as_ref()
            .map(|entry| entry.sync_status)
            .unwrap_or(SyncStatus::LocalOnly);

        // Rows the remote never saw, and any row while signed out, go away for good.
        if status == SyncStatus::LocalOnly || !authenticated {
            self.repository
                .delete(list, key.media_id, key.media_type)
                .await?;
            let _ = self.event_bus.emit(CoreEvent::Library(LibraryEvent::EntryRemoved {
                list: list.to_string(),
                media_id: key.media_id,
                media_type: key.media_type.to_string(),
            }));
            debug!(status = %status, "Entry deleted");
            return Ok(());
        }

        state::next(status, SyncTransition::DeleteRequested)?;
        self.repository
            .mark_for_deletion(list, key.media_id, key.media_type)
            .await?;
        let _ = self
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::EntryMarkedForDeletion {
                list: list.to_string(),
                media_id: key.media_id,
                media_type: key.media_type.to_string(),
            }));
        debug!(status = %status, "Entry marked for deletion");
        Ok(())
    }

    async fn add_locally(&self, list: LibraryList, item: LibraryItem, authenticated: bool) -> Result<()> {
        let status = state::initial_status(authenticated);
        let entry = item.into_entry(status, self.clock.unix_timestamp_millis());

        self.repository.upsert(list, &entry).await?;
        let _ = self.event_bus.emit(CoreEvent::Library(LibraryEvent::EntryAdded {
            list: list.to_string(),
            media_id: entry.media_id,
            media_type: entry.media_type.to_string(),
            sync_status: status.to_string(),
        }));
        debug!(status = %status, "Entry added");
        Ok(())
    }

    /// Restore the row as it was before `outcome`'s toggle.
    #[instrument(skip(self, outcome), fields(list = %list, key = %outcome.key))]
    pub async fn revert(&self, list: LibraryList, outcome: &ToggleOutcome) -> Result<()> {
        match &outcome.previous {
            Some(previous) => self.repository.upsert(list, previous).await?,
            None => {
                self.repository
                    .delete(list, outcome.key.media_id, outcome.key.media_type)
                    .await?;
            }
        }
        debug!("Toggle reverted");
        Ok(())
    }

    /// Upload the guest's entries of `list` to the signed-in account.
    pub async fn upload_guest_items(&self, list: LibraryList) -> Result<SyncResult> {
        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }
        self.pusher.push_guest_items(list).await
    }

    pub async fn is_favorite(&self, media_id: i64, media_type: MediaType) -> Result<bool> {
        Ok(self
            .repository
            .exists(LibraryList::Favorites, media_id, media_type)
            .await?)
    }

    pub async fn is_in_watchlist(&self, media_id: i64, media_type: MediaType) -> Result<bool> {
        Ok(self
            .repository
            .exists(LibraryList::Watchlist, media_id, media_type)
            .await?)
    }

    pub fn observe(
        &self,
        list: LibraryList,
        media_type: MediaType,
    ) -> BoxStream<'static, core_library::Result<Vec<LibraryEntry>>> {
        self.repository.observe(list, media_type)
    }

    pub async fn entries(&self, list: LibraryList, media_type: MediaType) -> Result<Vec<LibraryEntry>> {
        Ok(self.repository.get_entries(list, media_type).await?)
    }

    /// Row count per sync status, pending deletions included.
    pub async fn sync_status(&self, list: LibraryList) -> Result<HashMap<SyncStatus, u64>> {
        Ok(self.repository.count_by_status(list).await?)
    }

    /// Ask for a background reconciliation of both lists.
    pub async fn request_sync(&self) -> Result<TaskId> {
        if !self.session.is_authenticated().await {
            return Err(SyncError::NotAuthenticated);
        }
        self.scheduler.schedule_library_sync().await
    }
}
