//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `NetworkMonitor` using a TCP reachability probe
//! - `WorkScheduler` using Tokio tasks
//! - `SecureStore` using the `keyring` crate
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, TokioWorkScheduler};
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let monitor = Arc::new(DesktopNetworkMonitor::new());
//! let scheduler = TokioWorkScheduler::with_network_monitor(Some(monitor));
//! ```

mod background;
mod http;
mod network;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use background::TokioWorkScheduler;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
