//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for data access.
//!
//! ## Architecture
//!
//! - Traits define the interface so services can be tested against mocks
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>`
//!
//! ## Available Repositories
//!
//! - `LibraryRepository` - Favorites and watchlist entries with per-row sync status

pub mod library;

pub use library::{LibraryRepository, SqliteLibraryRepository};
