//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the library sync core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations against the remote catalog
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection
//!
//! ### Background Work
//! - [`WorkScheduler`](background::WorkScheduler) - Unique, constrained, retried work
//! - [`WorkHandler`](background::WorkHandler) - Executes one kind of work
//!
//! ### Security
//! - [`SecureStore`](storage::SecureStore) - Session persistence (Keychain/Keystore)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform-specific errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind `Arc`.

pub mod background;
pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use background::{
    BackoffPolicy, ExistingWorkPolicy, TaskConstraints, TaskId, TaskStatus, WorkContext,
    WorkHandler, WorkRequest, WorkScheduler,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::SecureStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
