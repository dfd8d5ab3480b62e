//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the library sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, the configuration builder, and the
//! event broadcasting used by the auth, library, and sync crates.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
