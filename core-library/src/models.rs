//! Domain models for the local library
//!
//! This module contains the favorites/watchlist row model with validation and
//! database mapping.

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Enumerations
// =============================================================================

/// Category of a catalog item.
///
/// Canonical form is lowercase (`"movie"`, `"tv"`); parsing ignores case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Movie, MediaType::Tv];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            _ => Err(LibraryError::invalid(
                "media_type",
                format!("unknown media type '{}'", s),
            )),
        }
    }
}

/// Per-row synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Created while signed out; owned by the guest
    LocalOnly,
    /// Created while signed in; awaiting remote confirmation
    PendingPush,
    /// Matches the remote list
    Synced,
    /// Removed by the user; awaiting remote confirmation
    PendingDelete,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 4] = [
        SyncStatus::LocalOnly,
        SyncStatus::PendingPush,
        SyncStatus::Synced,
        SyncStatus::PendingDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::LocalOnly => "LOCAL_ONLY",
            SyncStatus::PendingPush => "PENDING_PUSH",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::PendingDelete => "PENDING_DELETE",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                LibraryError::invalid("sync_status", format!("unknown sync status '{}'", s))
            })
    }
}

/// The two user lists, each backed by its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryList {
    Favorites,
    Watchlist,
}

impl LibraryList {
    pub const ALL: [LibraryList; 2] = [LibraryList::Favorites, LibraryList::Watchlist];

    pub fn table_name(&self) -> &'static str {
        match self {
            LibraryList::Favorites => "favorite_content",
            LibraryList::Watchlist => "watchlist_content",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryList::Favorites => "favorites",
            LibraryList::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for LibraryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryList {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "favorites" | "favorite" => Ok(LibraryList::Favorites),
            "watchlist" => Ok(LibraryList::Watchlist),
            _ => Err(LibraryError::invalid(
                "list",
                format!("unknown library list '{}'", s),
            )),
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Identity of an item within a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub media_id: i64,
    pub media_type: MediaType,
}

impl EntryKey {
    pub fn new(media_id: i64, media_type: MediaType) -> Self {
        Self {
            media_id,
            media_type,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.media_type, self.media_id)
    }
}

/// One row of `favorite_content` or `watchlist_content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Surrogate key; 0 for rows not yet inserted
    pub id: i64,
    pub media_id: i64,
    pub media_type: MediaType,
    pub name: String,
    pub image_path: String,
    pub sync_status: SyncStatus,
    /// Unix milliseconds of local creation; 0 for rows from before sync tracking
    pub added_at: i64,
}

impl LibraryEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.media_id, self.media_type)
    }

    /// Validate entry data
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.media_id <= 0 {
            return Err(format!("media_id must be positive, got {}", self.media_id));
        }

        if self.name.trim().is_empty() {
            return Err("Entry name cannot be empty".to_string());
        }

        Ok(())
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = status;
        self
    }
}

impl<'r> FromRow<'r, SqliteRow> for LibraryEntry {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let media_type: String = row.try_get("media_type")?;
        let sync_status: String = row.try_get("sync_status")?;

        Ok(Self {
            id: row.try_get("id")?,
            media_id: row.try_get("media_id")?,
            media_type: media_type
                .parse()
                .map_err(|e: LibraryError| sqlx::Error::Decode(Box::new(e)))?,
            name: row.try_get("name")?,
            image_path: row.try_get("image_path")?,
            sync_status: sync_status
                .parse()
                .map_err(|e: LibraryError| sqlx::Error::Decode(Box::new(e)))?,
            added_at: row.try_get("added_at")?,
        })
    }
}

/// Caller-facing description of an item to add to a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub media_id: i64,
    pub media_type: MediaType,
    pub name: String,
    pub image_path: String,
}

impl LibraryItem {
    pub fn new(
        media_id: i64,
        media_type: MediaType,
        name: impl Into<String>,
        image_path: impl Into<String>,
    ) -> Self {
        Self {
            media_id,
            media_type,
            name: name.into(),
            image_path: image_path.into(),
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.media_id, self.media_type)
    }

    /// Builds a not-yet-inserted row.
    pub fn into_entry(self, status: SyncStatus, added_at: i64) -> LibraryEntry {
        LibraryEntry {
            id: 0,
            media_id: self.media_id,
            media_type: self.media_type,
            name: self.name,
            image_path: self.image_path,
            sync_status: status,
            added_at,
        }
    }
}

impl From<&LibraryEntry> for LibraryItem {
    fn from(entry: &LibraryEntry) -> Self {
        Self {
            media_id: entry.media_id,
            media_type: entry.media_type,
            name: entry.name.clone(),
            image_path: entry.image_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parsing_ignores_case() {
        assert_eq!("movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("MOVIE".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("Tv".parse::<MediaType>().unwrap(), MediaType::Tv);
        assert!(matches!(
            "person".parse::<MediaType>(),
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_media_type_canonical_form() {
        assert_eq!(MediaType::Movie.to_string(), "movie");
        assert_eq!(serde_json::to_string(&MediaType::Tv).unwrap(), "\"tv\"");
    }

    #[test]
    fn test_sync_status_storage_names() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert_eq!(SyncStatus::PendingDelete.as_str(), "PENDING_DELETE");
        assert_eq!(
            serde_json::to_string(&SyncStatus::LocalOnly).unwrap(),
            "\"LOCAL_ONLY\""
        );
    }

    #[test]
    fn test_list_tables() {
        assert_eq!(LibraryList::Favorites.table_name(), "favorite_content");
        assert_eq!(LibraryList::Watchlist.table_name(), "watchlist_content");
        assert_eq!("watchlist".parse::<LibraryList>().unwrap(), LibraryList::Watchlist);
    }

    #[test]
    fn test_entry_validation() {
        let valid = LibraryItem::new(550, MediaType::Movie, "Fight Club", "/poster.jpg")
            .into_entry(SyncStatus::LocalOnly, 1);
        assert!(valid.validate().is_ok());

        let mut bad_id = valid.clone();
        bad_id.media_id = 0;
        assert!(bad_id.validate().is_err());

        let mut bad_name = valid;
        bad_name.name = "   ".to_string();
        assert!(bad_name.validate().is_err());
    }

    #[test]
    fn test_item_round_trip_through_entry() {
        let item = LibraryItem::new(1399, MediaType::Tv, "Game of Thrones", "/got.jpg");
        let entry = item.clone().into_entry(SyncStatus::PendingPush, 42);

        assert_eq!(entry.id, 0);
        assert_eq!(entry.key(), EntryKey::new(1399, MediaType::Tv));
        assert_eq!(LibraryItem::from(&entry), item);
    }
}
