//! # Library Work Scheduling
//!
//! Turns library changes into durable background work on the host
//! [`WorkScheduler`].
//!
//! ## Work kinds
//!
//! - **Library task** (`library_task`): confirms one toggle remotely. Unique
//!   name `{favorites|watchlist}-{media_id}-{MEDIATYPE}`, e.g.
//!   `favorites-550-MOVIE`. A newer toggle of the same key replaces the
//!   queued one, so only the latest intent is pushed.
//! - **Library sync** (`library_sync`): reconciles both lists. Unique name
//!   `sync_library`.
//!
//! Both kinds require network connectivity and back off linearly. A handler
//! error asks the scheduler to retry; remote failures never reach the UI.

use crate::error::{Result, SyncError};
use crate::push::PushOperation;
use crate::reconcile::{ReconciliationEngine, SyncTrigger};
use async_trait::async_trait;
use bridge_traits::background::{
    BackoffPolicy, ExistingWorkPolicy, TaskConstraints, TaskId, WorkContext, WorkHandler,
    WorkRequest, WorkScheduler,
};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use core_auth::SessionManager;
use core_library::{LibraryList, MediaType};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const LIBRARY_TASK_KIND: &str = "library_task";
pub const LIBRARY_SYNC_KIND: &str = "library_sync";
/// Unique work name of the full reconciliation.
pub const SYNC_LIBRARY_WORK_NAME: &str = "sync_library";

/// Payload of a per-item confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTask {
    pub media_id: i64,
    pub media_type: MediaType,
    pub list: LibraryList,
    /// Whether the entry was visible locally when the work was scheduled
    pub item_exists_locally: bool,
}

impl LibraryTask {
    pub fn new(list: LibraryList, media_id: i64, media_type: MediaType, item_exists_locally: bool) -> Self {
        Self {
            media_id,
            media_type,
            list,
            item_exists_locally,
        }
    }

    pub fn unique_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.list.as_str(),
            self.media_id,
            self.media_type.as_str().to_ascii_uppercase()
        )
    }
}

/// Schedules library work and owns its handlers.
pub struct LibrarySyncScheduler {
    scheduler: Arc<dyn WorkScheduler>,
    event_bus: EventBus,
    backoff: Duration,
}

impl LibrarySyncScheduler {
    pub fn new(scheduler: Arc<dyn WorkScheduler>, event_bus: EventBus, backoff: Duration) -> Self {
        Self {
            scheduler,
            event_bus,
            backoff,
        }
    }

    /// Register the handlers for both work kinds.
    pub async fn register_handlers(
        &self,
        session: Arc<SessionManager>,
        pusher: Arc<PushOperation>,
        reconciler: Arc<ReconciliationEngine>,
    ) -> Result<()> {
        self.scheduler
            .register_handler(
                LIBRARY_TASK_KIND,
                Arc::new(LibraryTaskHandler {
                    session: session.clone(),
                    pusher,
                }),
            )
            .await
            .map_err(|e| SyncError::Scheduling(e.to_string()))?;

        self.scheduler
            .register_handler(
                LIBRARY_SYNC_KIND,
                Arc::new(LibrarySyncHandler {
                    session,
                    reconciler,
                }),
            )
            .await
            .map_err(|e| SyncError::Scheduling(e.to_string()))?;

        debug!("Library work handlers registered");
        Ok(())
    }

    fn request(&self, unique_name: String, kind: &str) -> WorkRequest {
        WorkRequest::new(unique_name, kind)
            .with_constraints(TaskConstraints::default())
            .with_backoff(BackoffPolicy::Linear(self.backoff))
    }

    async fn enqueue(&self, request: WorkRequest) -> Result<TaskId> {
        let unique_name = request.unique_name.clone();
        let task_id = self
            .scheduler
            .enqueue_unique(request, ExistingWorkPolicy::Replace)
            .await
            .map_err(|e| {
                warn!(unique_name = %unique_name, error = %e, "Failed to enqueue work");
                SyncError::Scheduling(e.to_string())
            })?;

        let _ = self
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::WorkScheduled { unique_name }));
        Ok(task_id)
    }

    /// Enqueue remote confirmation of one toggle, replacing any queued one.
    #[instrument(skip(self), fields(unique_name = %task.unique_name()))]
    pub async fn schedule_library_task(&self, task: &LibraryTask) -> Result<TaskId> {
        let request = self
            .request(task.unique_name(), LIBRARY_TASK_KIND)
            .with_payload(task)
            .map_err(|e| SyncError::Scheduling(e.to_string()))?;

        let task_id = self.enqueue(request).await?;
        debug!("Library task scheduled");
        Ok(task_id)
    }

    /// Enqueue reconciliation of both lists, replacing any queued run.
    #[instrument(skip(self))]
    pub async fn schedule_library_sync(&self) -> Result<TaskId> {
        let task_id = self
            .enqueue(self.request(SYNC_LIBRARY_WORK_NAME.to_string(), LIBRARY_SYNC_KIND))
            .await?;
        info!("Library sync scheduled");
        Ok(task_id)
    }

    /// True when no run of `unique_name` is queued, blocked, running or retrying.
    pub async fn is_work_not_scheduled(&self, unique_name: &str) -> Result<bool> {
        let pending = self
            .scheduler
            .is_pending(&TaskId::new(unique_name))
            .await
            .map_err(|e| SyncError::Scheduling(e.to_string()))?;
        Ok(!pending)
    }

    pub async fn cancel(&self, unique_name: &str) -> Result<()> {
        self.scheduler
            .cancel_task(&TaskId::new(unique_name))
            .await
            .map_err(|e| SyncError::Scheduling(e.to_string()))
    }
}

fn retry_error(e: SyncError) -> BridgeError {
    BridgeError::OperationFailed(e.to_string())
}

struct LibraryTaskHandler {
    session: Arc<SessionManager>,
    pusher: Arc<PushOperation>,
}

#[async_trait]
impl WorkHandler for LibraryTaskHandler {
    async fn run(&self, context: WorkContext) -> BridgeResult<()> {
        let task: LibraryTask = context.payload()?;

        // Signed out since scheduling: logout already purged account rows and
        // unconfirmed removals are pushed again after the next login.
        if !self.session.is_authenticated().await {
            debug!(unique_name = %context.unique_name, "No session, dropping library task");
            return Ok(());
        }

        self.pusher
            .push_item(task.list, task.media_id, task.media_type, task.item_exists_locally)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(
                    unique_name = %context.unique_name,
                    attempt = context.attempt,
                    error = %e,
                    "Library task failed, will retry"
                );
                retry_error(e)
            })
    }
}

struct LibrarySyncHandler {
    session: Arc<SessionManager>,
    reconciler: Arc<ReconciliationEngine>,
}

#[async_trait]
impl WorkHandler for LibrarySyncHandler {
    async fn run(&self, context: WorkContext) -> BridgeResult<()> {
        if !self.session.is_authenticated().await {
            debug!("No session, nothing to reconcile");
            return Ok(());
        }

        let (favorites, watchlist) = futures::join!(
            self.reconciler
                .reconcile_for(LibraryList::Favorites, SyncTrigger::Background),
            self.reconciler
                .reconcile_for(LibraryList::Watchlist, SyncTrigger::Background),
        );

        match (favorites, watchlist) {
            (Ok(_), Ok(_)) => Ok(()),
            (Err(SyncError::NotAuthenticated), _) | (_, Err(SyncError::NotAuthenticated)) => {
                debug!("Session ended during library sync, dropping work");
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(attempt = context.attempt, error = %e, "Library sync failed, will retry");
                Err(retry_error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::background::TaskStatus;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Records enqueued requests without running them.
    #[derive(Default)]
    struct RecordingScheduler {
        queued: Mutex<HashMap<String, WorkRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl WorkScheduler for RecordingScheduler {
        async fn register_handler(&self, _kind: &str, _handler: Arc<dyn WorkHandler>) -> BridgeResult<()> {
            Ok(())
        }

        async fn enqueue_unique(
            &self,
            request: WorkRequest,
            _policy: ExistingWorkPolicy,
        ) -> BridgeResult<TaskId> {
            if self.reject {
                return Err(BridgeError::Scheduling("queue full".to_string()));
            }
            let id = TaskId::new(request.unique_name.clone());
            self.queued
                .lock()
                .await
                .insert(request.unique_name.clone(), request);
            Ok(id)
        }

        async fn cancel_task(&self, task_id: &TaskId) -> BridgeResult<()> {
            self.queued.lock().await.remove(task_id.as_str());
            Ok(())
        }

        async fn get_task_status(&self, task_id: &TaskId) -> BridgeResult<Option<TaskStatus>> {
            Ok(self
                .queued
                .lock()
                .await
                .get(task_id.as_str())
                .map(|_| TaskStatus::Scheduled))
        }

        async fn list_tasks(&self) -> BridgeResult<Vec<TaskId>> {
            Ok(self.queued.lock().await.keys().map(TaskId::new).collect())
        }

        async fn next_execution_time(&self, _task_id: &TaskId) -> BridgeResult<Option<Duration>> {
            Ok(None)
        }
    }

    #[test]
    fn test_unique_names() {
        assert_eq!(
            LibraryTask::new(LibraryList::Favorites, 550, MediaType::Movie, true).unique_name(),
            "favorites-550-MOVIE"
        );
        assert_eq!(
            LibraryTask::new(LibraryList::Watchlist, 1399, MediaType::Tv, false).unique_name(),
            "watchlist-1399-TV"
        );
    }

    #[tokio::test]
    async fn test_library_task_request_shape() {
        let backend = Arc::new(RecordingScheduler::default());
        let event_bus = EventBus::new(10);
        let mut events = event_bus.subscribe();
        let scheduler = LibrarySyncScheduler::new(backend.clone(), event_bus, Duration::from_secs(10));
        let task = LibraryTask::new(LibraryList::Favorites, 550, MediaType::Movie, true);

        scheduler.schedule_library_task(&task).await.unwrap();

        let queued = backend.queued.lock().await;
        let request = &queued["favorites-550-MOVIE"];
        assert_eq!(request.kind, LIBRARY_TASK_KIND);
        assert!(request.constraints.requires_network);
        assert_eq!(request.backoff, BackoffPolicy::Linear(Duration::from_secs(10)));
        assert_eq!(request.max_attempts, None);
        assert_eq!(serde_json::from_value::<LibraryTask>(request.payload.clone()).unwrap(), task);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::WorkScheduled {
                unique_name: "favorites-550-MOVIE".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sync_work_pending_state() {
        let backend = Arc::new(RecordingScheduler::default());
        let scheduler = LibrarySyncScheduler::new(backend, EventBus::new(10), Duration::from_secs(10));

        assert!(scheduler.is_work_not_scheduled(SYNC_LIBRARY_WORK_NAME).await.unwrap());
        scheduler.schedule_library_sync().await.unwrap();
        assert!(!scheduler.is_work_not_scheduled(SYNC_LIBRARY_WORK_NAME).await.unwrap());

        scheduler.cancel(SYNC_LIBRARY_WORK_NAME).await.unwrap();
        assert!(scheduler.is_work_not_scheduled(SYNC_LIBRARY_WORK_NAME).await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_scheduling_error() {
        let backend = Arc::new(RecordingScheduler {
            reject: true,
            ..Default::default()
        });
        let scheduler = LibrarySyncScheduler::new(backend, EventBus::new(10), Duration::from_secs(10));

        let result = scheduler.schedule_library_sync().await;

        assert!(matches!(result, Err(SyncError::Scheduling(_))));
    }
}
