//! # Library Sync Module
//!
//! Keeps the local favorites and watchlist in step with the account's remote
//! lists while staying usable offline and signed out.
//!
//! ## Overview
//!
//! Every row carries a sync status. User toggles change the local store first
//! and enqueue background confirmation; reconciliation pulls the remote lists
//! after login and on retry; logout purges what belongs to the account and
//! keeps what belongs to the guest.
//!
//! ## Components
//!
//! - **State machine** (`state`): legal sync status transitions
//! - **Remote catalog** (`remote`): `RemoteLibrary` and the TMDB client
//! - **Reconciliation** (`reconcile`): pull remote lists, drop stale synced rows
//! - **Push** (`push`): confirm local adds and removals remotely
//! - **Scheduling** (`scheduler`): unique background work with linear backoff
//! - **Session transitions** (`session`): login and logout handling
//! - **Library service** (`service`): UI-facing toggles and queries

pub mod error;
pub mod push;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod state;

pub use error::{Result, SyncError};
pub use push::{PushAction, PushOperation};
pub use reconcile::{ReconciliationEngine, SyncResult, SyncTrigger};
pub use remote::{RemoteLibrary, TmdbRemoteLibrary};
pub use scheduler::{
    LibrarySyncScheduler, LibraryTask, LIBRARY_SYNC_KIND, LIBRARY_TASK_KIND,
    SYNC_LIBRARY_WORK_NAME,
};
pub use service::{LibraryService, ToggleOutcome};
pub use session::SessionTransitionHandler;
pub use state::{SyncTransition, Transition};
