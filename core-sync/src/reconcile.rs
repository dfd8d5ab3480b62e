//! # Reconciliation Engine
//!
//! Brings one local list in line with the account's remote list.
//!
//! ## Workflow
//!
//! 1. Note which rows are `SYNCED`, then fetch the complete remote list. A
//!    failure aborts before any local write.
//! 2. Take the write gate and check the session that started the pass is
//!    still active. Logout holds the same gate while purging, so a pass that
//!    outlives its session writes nothing.
//! 3. Upsert every remote item as `SYNCED`, skipping keys the user removed
//!    locally whose removal is not yet confirmed (`PENDING_DELETE`).
//! 4. Select local `SYNCED` rows the remote no longer has, limited to rows
//!    that were already `SYNCED` before the fetch.
//! 5. Delete exactly those rows.
//!
//! Per-row failures are counted and do not abort the pass. Guest rows
//! (`LOCAL_ONLY`) and unconfirmed adds (`PENDING_PUSH`) are never deleted here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = ReconciliationEngine::new(repository, remote, session, event_bus, clock);
//! let result = engine.reconcile(LibraryList::Favorites).await?;
//! println!("pulled {} removed {}", result.pulled, result.removed);
//! ```

use crate::error::{Result, SyncError};
use crate::remote::RemoteLibrary;
use crate::state::{self, SyncTransition, Transition};
use bridge_traits::time::Clock;
use core_auth::SessionManager;
use core_library::{EntryKey, LibraryList, LibraryRepository, SyncStatus};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Counters reported by reconciliation and push passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub pushed: u64,
    pub pulled: u64,
    pub removed: u64,
    /// Keys skipped because local and remote intent disagree
    pub conflicts: u64,
    pub errors: u64,
}

impl SyncResult {
    pub fn merge(&mut self, other: SyncResult) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.removed += other.removed;
        self.conflicts += other.conflicts;
        self.errors += other.errors;
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

impl std::ops::Add for SyncResult {
    type Output = SyncResult;

    fn add(mut self, other: SyncResult) -> SyncResult {
        self.merge(other);
        self
    }
}

/// What started a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Login,
    Background,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Login => "login",
            SyncTrigger::Background => "background",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ReconciliationEngine {
    repository: Arc<dyn LibraryRepository>,
    remote: Arc<dyn RemoteLibrary>,
    session: Arc<SessionManager>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    write_gate: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        repository: Arc<dyn LibraryRepository>,
        remote: Arc<dyn RemoteLibrary>,
        session: Arc<SessionManager>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            remote,
            session,
            event_bus,
            clock,
            write_gate: Mutex::new(()),
        }
    }

    /// Block reconciliation writes until the guard is dropped.
    ///
    /// A pass waiting on the gate re-checks its session once it gets through.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Reconcile `list` on explicit request.
    pub async fn reconcile(&self, list: LibraryList) -> Result<SyncResult> {
        self.reconcile_for(list, SyncTrigger::Manual).await
    }

    /// Reconcile `list`, tagging emitted events with `trigger`.
    #[instrument(skip(self), fields(list = %list, trigger = %trigger))]
    pub async fn reconcile_for(&self, list: LibraryList, trigger: SyncTrigger) -> Result<SyncResult> {
        let job_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Started {
            job_id: job_id.clone(),
            list: list.to_string(),
            trigger: trigger.to_string(),
        }));

        match self.run(list).await {
            Ok(result) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    pulled = result.pulled,
                    removed = result.removed,
                    conflicts = result.conflicts,
                    errors = result.errors,
                    duration_ms,
                    "Reconciliation completed"
                );
                let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Completed {
                    job_id,
                    list: list.to_string(),
                    pulled: result.pulled,
                    pushed: result.pushed,
                    removed: result.removed,
                    conflicts: result.conflicts,
                    errors: result.errors,
                    duration_ms,
                }));
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed");
                let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Failed {
                    job_id,
                    list: list.to_string(),
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                }));
                Err(e)
            }
        }
    }

    async fn run(&self, list: LibraryList) -> Result<SyncResult> {
        let started_by = self
            .session
            .current_session()
            .await
            .ok_or(SyncError::NotAuthenticated)?
            .session_id;

        let synced_before: HashSet<EntryKey> = self
            .repository
            .get_by_status(list, SyncStatus::Synced)
            .await?
            .iter()
            .map(|entry| entry.key())
            .collect();

        let remote_items = self.remote.fetch_list(list).await?;
        debug!(remote_items = remote_items.len(), "Remote list fetched");

        let _writes = self.write_gate.lock().await;
        let still_signed_in = self
            .session
            .current_session()
            .await
            .is_some_and(|session| session.session_id == started_by);
        if !still_signed_in {
            info!("Session ended during fetch, discarding remote list");
            return Err(SyncError::NotAuthenticated);
        }

        let mut result = SyncResult::default();
        let mut remote_keys: HashSet<EntryKey> = HashSet::with_capacity(remote_items.len());
        let now = self.clock.unix_timestamp_millis();

        for item in remote_items {
            let key = item.key();
            if !remote_keys.insert(key) {
                continue;
            }

            let current = match self
                .repository
                .sync_status_of(list, key.media_id, key.media_type)
                .await
            {
                Ok(current) => current,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read local status");
                    result.errors += 1;
                    continue;
                }
            };

            if let Some(status) = current {
                if state::next(status, SyncTransition::PulledFromRemote).is_err() {
                    debug!(key = %key, status = %status, "Local removal pending, not pulling");
                    result.conflicts += 1;
                    continue;
                }
            }

            match self
                .repository
                .upsert(list, &item.into_entry(SyncStatus::Synced, now))
                .await
            {
                Ok(()) => result.pulled += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to apply remote item");
                    result.errors += 1;
                }
            }
        }

        let stale = self.repository.select_stale(list, &remote_keys).await?;
        for entry in stale {
            let key = entry.key();
            if !synced_before.contains(&key) {
                debug!(key = %key, "Confirmed during fetch, keeping until next pass");
                continue;
            }
            match state::next(entry.sync_status, SyncTransition::AbsentFromRemote) {
                Ok(Transition::Removed) => {}
                _ => {
                    result.conflicts += 1;
                    continue;
                }
            }

            match self
                .repository
                .delete(list, key.media_id, key.media_type)
                .await
            {
                Ok(true) => result.removed += 1,
                Ok(false) => debug!(key = %key, "Stale entry already gone"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete stale entry");
                    result.errors += 1;
                }
            }
        }

        Ok(result)
    }
}
