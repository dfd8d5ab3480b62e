//! # Library Management Module
//!
//! Owns the local favorites and watchlist database.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema and migrations, including the sync-tracking columns
//! - The favorites/watchlist data model and its sync status
//! - The `LibraryRepository`, the single source of truth observers read from
//!
//! All writes are local. Talking to the remote catalog is `core-sync`'s job.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{EntryKey, LibraryEntry, LibraryItem, LibraryList, MediaType, SyncStatus};
pub use repositories::{LibraryRepository, SqliteLibraryRepository};
