//! Background Work Scheduler Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{
        ExistingWorkPolicy, TaskConstraints, TaskId, TaskStatus, WorkContext, WorkHandler,
        WorkRequest, WorkScheduler,
    },
    error::{BridgeError, Result},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
    time::{Clock, SystemClock},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default interval between constraint checks while work is blocked.
const DEFAULT_CONSTRAINT_POLL: Duration = Duration::from_secs(5);

/// How long completed or failed work stays visible before it is pruned.
const DEFAULT_FINISHED_RETENTION: Duration = Duration::from_secs(60 * 60);

type TaskTable = Arc<RwLock<HashMap<TaskId, TaskInfo>>>;

/// Tokio-based unique work scheduler for desktop.
///
/// Work runs on spawned Tokio tasks. Each unique name owns at most one live
/// runner; a `Replace` enqueue cancels the previous runner before spawning the
/// new one.
pub struct TokioWorkScheduler {
    tasks: TaskTable,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn WorkHandler>>>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    constraint_poll: Duration,
    finished_retention: Duration,
    generations: AtomicU64,
}

struct TaskInfo {
    status: TaskStatus,
    /// Distinguishes the runner that owns this entry from replaced ones
    generation: u64,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
    attempts: u32,
    last_run: Option<i64>,
    next_run: Option<i64>,
}

impl TaskInfo {
    fn finished_before(&self, cutoff: i64) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
            && self.last_run.is_some_and(|last| last < cutoff)
    }
}

/// Everything a spawned runner needs, detached from `&self`.
struct Runner {
    tasks: TaskTable,
    id: TaskId,
    generation: u64,
    handler: Arc<dyn WorkHandler>,
    request: WorkRequest,
    monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    constraint_poll: Duration,
}

impl TokioWorkScheduler {
    /// Create a new scheduler with no network monitoring.
    pub fn new() -> Self {
        Self::with_network_monitor_and_clock(None, Arc::new(SystemClock))
    }

    /// Create a scheduler with an optional network monitor.
    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        Self::with_network_monitor_and_clock(monitor, Arc::new(SystemClock))
    }

    /// Create a scheduler with an optional network monitor and custom clock.
    pub fn with_network_monitor_and_clock(
        monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            network_monitor: monitor,
            clock,
            constraint_poll: DEFAULT_CONSTRAINT_POLL,
            finished_retention: DEFAULT_FINISHED_RETENTION,
            generations: AtomicU64::new(0),
        }
    }

    /// Override how often blocked work re-checks its constraints.
    pub fn with_constraint_poll_interval(mut self, interval: Duration) -> Self {
        self.constraint_poll = interval;
        self
    }

    /// Override how long finished work is kept before pruning.
    pub fn with_finished_retention(mut self, retention: Duration) -> Self {
        self.finished_retention = retention;
        self
    }

    /// Number of attempts made so far for the given work.
    pub async fn attempts(&self, task_id: &TaskId) -> Option<u32> {
        let tasks = self.tasks.read().await;
        tasks.get(task_id).map(|info| info.attempts)
    }

    fn duration_to_millis(duration: Duration) -> i64 {
        duration.as_millis().min(i64::MAX as u128) as i64
    }

    fn millis_to_duration(millis: i64) -> Duration {
        if millis <= 0 {
            Duration::from_secs(0)
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    async fn handler_for(&self, kind: &str) -> Option<Arc<dyn WorkHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(kind).cloned()
    }

    async fn constraints_satisfied(
        monitor: Option<&Arc<dyn NetworkMonitor>>,
        constraints: &TaskConstraints,
    ) -> bool {
        if !(constraints.requires_network || constraints.requires_wifi) {
            return true;
        }

        if let Some(monitor) = monitor {
            match monitor.get_network_info().await {
                Ok(NetworkInfo {
                    status: NetworkStatus::Connected,
                    network_type,
                    ..
                }) => {
                    if constraints.requires_wifi {
                        matches!(network_type, Some(NetworkType::WiFi))
                    } else {
                        true
                    }
                }
                Ok(_) => false,
                Err(err) => {
                    warn!("Network monitor error: {}", err);
                    false
                }
            }
        } else {
            warn!(
                "Network constraints requested but no monitor provided; assuming constraint satisfied"
            );
            true
        }
    }
}

impl Runner {
    /// Apply `update` only while this runner still owns the entry.
    async fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut TaskInfo),
    {
        let mut tasks = self.tasks.write().await;
        if let Some(info) = tasks.get_mut(&self.id) {
            if info.generation == self.generation {
                update(info);
            }
        }
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    /// Sleep for `delay`, returning `false` if cancelled first.
    async fn wait(delay: Duration, cancel_rx: &mut oneshot::Receiver<()>) -> bool {
        let delay_sleep = sleep(delay);
        tokio::pin!(delay_sleep);
        tokio::select! {
            _ = cancel_rx => false,
            _ = delay_sleep.as_mut() => true,
        }
    }

    async fn run(self, mut cancel_rx: oneshot::Receiver<()>) {
        if !self.request.initial_delay.is_zero()
            && !Self::wait(self.request.initial_delay, &mut cancel_rx).await
        {
            debug!(task_id = %self.id, "Work cancelled before first run");
            return;
        }

        let mut attempt = 0u32;
        loop {
            while !TokioWorkScheduler::constraints_satisfied(
                self.monitor.as_ref(),
                &self.request.constraints,
            )
            .await
            {
                let next = self
                    .now()
                    .saturating_add(TokioWorkScheduler::duration_to_millis(self.constraint_poll));
                self.update(|info| {
                    info.status = TaskStatus::Blocked;
                    info.next_run = Some(next);
                })
                .await;
                debug!(task_id = %self.id, "Constraints not satisfied; waiting");
                if !Self::wait(self.constraint_poll, &mut cancel_rx).await {
                    return;
                }
            }

            attempt += 1;
            self.update(|info| {
                info.status = TaskStatus::Running;
                info.attempts = attempt;
                info.next_run = None;
            })
            .await;

            let context = WorkContext {
                unique_name: self.request.unique_name.clone(),
                attempt,
                payload: self.request.payload.clone(),
            };
            let result = self.handler.run(context).await;
            let now = self.now();

            match result {
                Ok(()) => {
                    debug!(task_id = %self.id, attempt, "Work completed");
                    self.update(|info| {
                        info.status = TaskStatus::Completed;
                        info.last_run = Some(now);
                    })
                    .await;
                    return;
                }
                Err(err) => {
                    if self
                        .request
                        .max_attempts
                        .is_some_and(|max| attempt >= max)
                    {
                        warn!(task_id = %self.id, attempt, error = %err, "Work failed; giving up");
                        self.update(|info| {
                            info.status = TaskStatus::Failed;
                            info.last_run = Some(now);
                        })
                        .await;
                        return;
                    }

                    let delay = self.request.backoff.delay_for(attempt);
                    warn!(
                        task_id = %self.id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Work failed; retrying"
                    );
                    self.update(|info| {
                        info.status = TaskStatus::Retrying { attempt };
                        info.last_run = Some(now);
                        info.next_run = Some(
                            now.saturating_add(TokioWorkScheduler::duration_to_millis(delay)),
                        );
                    })
                    .await;

                    if !Self::wait(delay, &mut cancel_rx).await {
                        return;
                    }
                }
            }
        }
    }
}

impl Default for TokioWorkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkScheduler for TokioWorkScheduler {
    async fn register_handler(&self, kind: &str, handler: Arc<dyn WorkHandler>) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        handlers.insert(kind.to_string(), handler);
        debug!(kind, "Registered work handler");
        Ok(())
    }

    async fn enqueue_unique(
        &self,
        request: WorkRequest,
        policy: ExistingWorkPolicy,
    ) -> Result<TaskId> {
        let id = TaskId::new(request.unique_name.clone());

        let handler = self.handler_for(&request.kind).await.ok_or_else(|| {
            BridgeError::Scheduling(format!("No handler registered for kind: {}", request.kind))
        })?;

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let now = self.clock.unix_timestamp_millis();
            let mut tasks = self.tasks.write().await;
            let cutoff = now.saturating_sub(Self::duration_to_millis(self.finished_retention));
            let before = tasks.len();
            tasks.retain(|_, info| !info.finished_before(cutoff));
            if tasks.len() < before {
                debug!(pruned = before - tasks.len(), "Pruned finished work");
            }

            if let Some(existing) = tasks.get_mut(&id) {
                if existing.status.is_pending() {
                    match policy {
                        ExistingWorkPolicy::Keep => {
                            debug!(task_id = %id, "Work already pending; keeping existing");
                            return Ok(id);
                        }
                        ExistingWorkPolicy::Replace => {
                            debug!(task_id = %id, "Replacing pending work");
                            if let Some(cancel) = existing.cancel.take() {
                                let _ = cancel.send(());
                            }
                            if let Some(handle) = existing.handle.take() {
                                handle.abort();
                            }
                        }
                    }
                }
            }

            tasks.insert(
                id.clone(),
                TaskInfo {
                    status: TaskStatus::Scheduled,
                    generation,
                    handle: None,
                    cancel: Some(cancel_tx),
                    attempts: 0,
                    last_run: None,
                    next_run: Some(
                        now.saturating_add(Self::duration_to_millis(request.initial_delay)),
                    ),
                },
            );
        }

        info!(
            task_id = %id,
            kind = %request.kind,
            delay_ms = request.initial_delay.as_millis() as u64,
            "Enqueued unique work"
        );

        let runner = Runner {
            tasks: Arc::clone(&self.tasks),
            id: id.clone(),
            generation,
            handler,
            request,
            monitor: self.network_monitor.clone(),
            clock: Arc::clone(&self.clock),
            constraint_poll: self.constraint_poll,
        };
        let handle = tokio::spawn(runner.run(cancel_rx));

        let mut tasks = self.tasks.write().await;
        if let Some(info) = tasks.get_mut(&id) {
            if info.generation == generation {
                info.handle = Some(handle);
            }
        }

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id, "Cancelling work");

        let removed = {
            let mut tasks = self.tasks.write().await;
            tasks.remove(task_id)
        };

        if let Some(mut info) = removed {
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
            return Ok(());
        }

        Err(BridgeError::Scheduling(format!(
            "Task not found: {}",
            task_id
        )))
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).map(|info| info.status.clone()))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        let tasks = self.tasks.read().await;
        let mut ids: Vec<TaskId> = tasks.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>> {
        let tasks = self.tasks.read().await;
        let info = tasks
            .get(task_id)
            .ok_or_else(|| BridgeError::Scheduling(format!("Task not found: {}", task_id)))?;
        Ok(info.next_run.map(|next| {
            let remaining = next - self.clock.unix_timestamp_millis();
            Self::millis_to_duration(remaining)
        }))
    }
}
