//! Background Work Scheduling
//!
//! Host facility for durable, de-duplicated background work.
//!
//! ## Overview
//!
//! A unit of work is described by a [`WorkRequest`]:
//! - a stable `unique_name` used for de-duplication
//! - a handler `kind` selecting the registered [`WorkHandler`]
//! - a JSON payload handed to the handler
//! - [`TaskConstraints`] (network connectivity)
//! - a [`BackoffPolicy`] applied between failed attempts
//!
//! Execution is at-least-once. There is no ordering guarantee between work
//! items with different unique names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Upper bound applied to any computed backoff delay (5 hours).
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

/// Task execution constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConstraints {
    /// Require WiFi connection
    pub requires_wifi: bool,
    /// Require any network connection
    pub requires_network: bool,
}

impl TaskConstraints {
    /// No preconditions at all.
    pub fn none() -> Self {
        Self {
            requires_wifi: false,
            requires_network: false,
        }
    }
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_wifi: false,
            requires_network: true,
        }
    }
}

/// Delay policy between failed attempts of the same work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffPolicy {
    /// `base * attempt`
    Linear(Duration),
    /// `base * 2^(attempt - 1)`
    Exponential(Duration),
}

impl BackoffPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self {
            BackoffPolicy::Linear(base) => base.saturating_mul(attempt),
            BackoffPolicy::Exponential(base) => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        };
        delay.min(MAX_BACKOFF_DELAY)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear(Duration::from_secs(10))
    }
}

/// What to do when work with the same unique name is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the queued work and enqueue the new request.
    Replace,
    /// Leave the queued work alone and drop the new request.
    Keep,
}

/// Scheduled work identifier (the unique work name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for its initial delay
    Scheduled,
    /// Waiting for constraints (e.g. network) to be satisfied
    Blocked,
    Running,
    /// Last attempt failed; waiting out the backoff before `attempt + 1`
    Retrying { attempt: u32 },
    Completed,
    /// Gave up after `max_attempts`
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the work still has a run ahead of it.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TaskStatus::Scheduled
                | TaskStatus::Blocked
                | TaskStatus::Running
                | TaskStatus::Retrying { .. }
        )
    }
}

/// Description of a unit of background work.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub unique_name: String,
    /// Registered handler that executes this work
    pub kind: String,
    pub payload: serde_json::Value,
    pub constraints: TaskConstraints,
    pub backoff: BackoffPolicy,
    pub initial_delay: Duration,
    /// `None` retries until the handler succeeds
    pub max_attempts: Option<u32>,
}

impl WorkRequest {
    pub fn new(unique_name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            kind: kind.into(),
            payload: serde_json::Value::Null,
            constraints: TaskConstraints::default(),
            backoff: BackoffPolicy::default(),
            initial_delay: Duration::ZERO,
            max_attempts: None,
        }
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = serde_json::to_value(payload).map_err(|e| {
            crate::BridgeError::Scheduling(format!("Payload serialization failed: {}", e))
        })?;
        Ok(self)
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Context handed to a [`WorkHandler`] for one attempt.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub unique_name: String,
    /// 1-based attempt counter
    pub attempt: u32,
    pub payload: serde_json::Value,
}

impl WorkContext {
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            crate::BridgeError::Scheduling(format!(
                "Invalid payload for {}: {}",
                self.unique_name, e
            ))
        })
    }
}

/// Executes one kind of background work.
///
/// Returning `Err` asks the scheduler to retry with the request's backoff.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn run(&self, context: WorkContext) -> Result<()>;
}

/// Background work scheduler trait
///
/// Abstracts platform work-scheduling facilities:
/// - **Android**: WorkManager unique work
/// - **iOS**: BGTaskScheduler
/// - **Desktop**: in-process Tokio tasks
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{ExistingWorkPolicy, WorkRequest, WorkScheduler};
///
/// async fn schedule_sync(scheduler: &dyn WorkScheduler) -> Result<()> {
///     let request = WorkRequest::new("sync_library", "library_sync");
///     scheduler.enqueue_unique(request, ExistingWorkPolicy::Replace).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait WorkScheduler: Send + Sync {
    /// Register the handler executing work of the given `kind`.
    async fn register_handler(&self, kind: &str, handler: Arc<dyn WorkHandler>) -> Result<()>;

    /// Enqueue work de-duplicated by `request.unique_name`.
    async fn enqueue_unique(
        &self,
        request: WorkRequest,
        policy: ExistingWorkPolicy,
    ) -> Result<TaskId>;

    /// Cancel queued or running work.
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Status of the work, `None` if it was never enqueued or was cancelled.
    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>>;

    /// List all known work
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;

    /// Whether the work is queued, blocked, running, or waiting to retry.
    async fn is_pending(&self, task_id: &TaskId) -> Result<bool> {
        Ok(self
            .get_task_status(task_id)
            .await?
            .map(|status| status.is_pending())
            .unwrap_or(false))
    }

    /// Estimated time until the next attempt, if one is scheduled.
    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>>;
}
