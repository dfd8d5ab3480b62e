//! # Authentication Module
//!
//! Account session management for the library sync core.
//!
//! ## Overview
//!
//! The remote catalog login handshake happens outside the core. This crate
//! receives its outcome as a [`Session`], persists it through the host
//! `SecureStore`, and answers the one question the library needs on every
//! write: is there a signed-in account?
//!
//! ## Features
//!
//! - Session persistence across restarts
//! - Guest / signed-in state tracking
//! - Auth event emission on the core event bus

pub mod error;
pub mod manager;
pub mod session_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::SessionManager;
pub use session_store::SessionStore;
pub use types::{AuthState, Session};
