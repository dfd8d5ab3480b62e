//! # Session Transitions
//!
//! What happens to the local library when the user signs in or out.
//!
//! ## Login
//!
//! 1. Establish the session.
//! 2. Reconcile both lists immediately. If that fails, fall back to the
//!    `sync_library` background work.
//! 3. Push unconfirmed adds and removals (`PENDING_PUSH`, `PENDING_DELETE`).
//!    Guest rows (`LOCAL_ONLY`) stay local.
//!
//! ## Logout
//!
//! 1. Cancel the pending `sync_library` work.
//! 2. Drop the session.
//! 3. Purge rows owned by the account (`SYNCED`, `PENDING_PUSH`) while holding
//!    the reconciliation write gate. Guest rows and unconfirmed removals
//!    survive for the next session.

use crate::error::Result;
use crate::push::PushOperation;
use crate::reconcile::{ReconciliationEngine, SyncResult, SyncTrigger};
use crate::scheduler::{LibrarySyncScheduler, SYNC_LIBRARY_WORK_NAME};
use core_auth::{Session, SessionManager};
use core_library::{LibraryList, LibraryRepository};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct SessionTransitionHandler {
    session: Arc<SessionManager>,
    repository: Arc<dyn LibraryRepository>,
    reconciler: Arc<ReconciliationEngine>,
    pusher: Arc<PushOperation>,
    scheduler: Arc<LibrarySyncScheduler>,
    event_bus: EventBus,
}

impl SessionTransitionHandler {
    pub fn new(
        session: Arc<SessionManager>,
        repository: Arc<dyn LibraryRepository>,
        reconciler: Arc<ReconciliationEngine>,
        pusher: Arc<PushOperation>,
        scheduler: Arc<LibrarySyncScheduler>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            session,
            repository,
            reconciler,
            pusher,
            scheduler,
            event_bus,
        }
    }

    /// Sign in and bring the local library up to date with the account.
    ///
    /// Only a failure to establish the session is returned. Reconciliation and
    /// push problems are logged and left to background retries.
    #[instrument(skip(self, session), fields(account_id = session.account_id))]
    pub async fn on_login(&self, session: Session) -> Result<SyncResult> {
        self.session.sign_in(session).await?;

        let (favorites, watchlist) = futures::join!(
            self.reconciler
                .reconcile_for(LibraryList::Favorites, SyncTrigger::Login),
            self.reconciler
                .reconcile_for(LibraryList::Watchlist, SyncTrigger::Login),
        );

        let mut result = SyncResult::default();
        let mut needs_retry = false;
        for outcome in [favorites, watchlist] {
            match outcome {
                Ok(pass) => result.merge(pass),
                Err(e) => {
                    warn!(error = %e, "Login reconciliation failed");
                    needs_retry = true;
                }
            }
        }

        if needs_retry {
            if let Err(e) = self.scheduler.schedule_library_sync().await {
                warn!(error = %e, "Could not schedule library sync retry");
            }
        }

        for list in LibraryList::ALL {
            match self.pusher.push_pending(list).await {
                Ok(pushed) => result.merge(pushed),
                Err(e) => {
                    warn!(list = %list, error = %e, "Pushing pending changes failed");
                    result.errors += 1;
                }
            }
        }

        info!(
            pulled = result.pulled,
            pushed = result.pushed,
            removed = result.removed,
            errors = result.errors,
            "Login sync finished"
        );
        Ok(result)
    }

    /// Sign out and purge the account's rows. Returns the number removed.
    ///
    /// The purge runs even if erasing the persisted session fails; that error
    /// is returned afterwards.
    #[instrument(skip(self))]
    pub async fn on_logout(&self) -> Result<u64> {
        if let Err(e) = self.scheduler.cancel(SYNC_LIBRARY_WORK_NAME).await {
            debug!(error = %e, "No library sync work to cancel");
        }

        let signed_out = self.session.sign_out().await;

        // A pass already past its session check finishes before the purge.
        let _writes = self.reconciler.lock_writes().await;
        let mut removed = 0;
        for list in LibraryList::ALL {
            let purged = self.repository.delete_synced_for_logout(list).await?;
            let _ = self.event_bus.emit(CoreEvent::Library(LibraryEvent::LogoutPurged {
                list: list.to_string(),
                removed: purged,
            }));
            removed += purged;
        }

        signed_out?;
        info!(removed, "Account entries purged");
        Ok(removed)
    }
}
