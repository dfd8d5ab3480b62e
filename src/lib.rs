//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature so host applications can depend on a
//! single crate and get the favorites and watchlist sync core wired with the
//! desktop bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, CoreService, Result};
