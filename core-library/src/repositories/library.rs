//! Favorites and watchlist repository
//!
//! Both lists share one schema and one implementation; every operation takes
//! the [`LibraryList`] it applies to. `media_type` is matched with
//! `LOWER(media_type)` so rows written with a non-canonical case by older
//! clients are still found.

use crate::error::{LibraryError, Result};
use crate::models::{EntryKey, LibraryEntry, LibraryList, MediaType, SyncStatus};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::{query, query_as, query_scalar, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tracing::{debug, instrument};

const COLUMNS: &str = "id, media_id, media_type, name, image_path, sync_status, added_at";

/// Local item store interface
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Stream of the visible entries of one category, newest first.
    ///
    /// The current snapshot is emitted immediately and again after every
    /// write to `list`. Dropping the stream ends the observation.
    fn observe(
        &self,
        list: LibraryList,
        media_type: MediaType,
    ) -> BoxStream<'static, Result<Vec<LibraryEntry>>>;

    /// Visible entries of one category, newest first
    async fn get_entries(&self, list: LibraryList, media_type: MediaType)
        -> Result<Vec<LibraryEntry>>;

    /// Find a visible entry by key
    ///
    /// # Returns
    /// - `Ok(Some(entry))` if found and not pending deletion
    /// - `Ok(None)` otherwise
    async fn get_entry(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<LibraryEntry>>;

    /// Whether a visible entry exists for the key
    async fn exists(&self, list: LibraryList, media_id: i64, media_type: MediaType)
        -> Result<bool>;

    /// Insert or replace the entry with the same key
    ///
    /// # Errors
    /// Returns error if:
    /// - Entry validation fails
    /// - Database error occurs
    async fn upsert(&self, list: LibraryList, entry: &LibraryEntry) -> Result<()>;

    /// Physically delete by key
    ///
    /// # Returns
    /// - `Ok(true)` if a row was deleted
    /// - `Ok(false)` if no row matched
    async fn delete(&self, list: LibraryList, media_id: i64, media_type: MediaType)
        -> Result<bool>;

    /// Delete every row of the list, returning the count
    async fn delete_all(&self, list: LibraryList) -> Result<u64>;

    async fn get_by_status(&self, list: LibraryList, status: SyncStatus)
        -> Result<Vec<LibraryEntry>>;

    /// Rows in `LOCAL_ONLY` or `PENDING_PUSH`
    async fn get_pending_sync(&self, list: LibraryList) -> Result<Vec<LibraryEntry>>;

    /// Rows in `PENDING_DELETE`
    async fn get_pending_delete(&self, list: LibraryList) -> Result<Vec<LibraryEntry>>;

    /// Mark every key as `SYNCED` in one transaction
    ///
    /// Rows pending deletion are left untouched. Returns the rows updated.
    async fn mark_as_synced(&self, list: LibraryList, keys: &[EntryKey]) -> Result<u64>;

    /// Soft delete: set `PENDING_DELETE`
    async fn mark_for_deletion(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<bool>;

    async fn update_sync_status(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
        status: SyncStatus,
    ) -> Result<bool>;

    /// Delete rows owned by the signed-out account (`SYNCED`, `PENDING_PUSH`)
    async fn delete_synced_for_logout(&self, list: LibraryList) -> Result<u64>;

    /// `SYNCED` rows whose key is absent from `remote_keys`
    async fn select_stale(
        &self,
        list: LibraryList,
        remote_keys: &HashSet<EntryKey>,
    ) -> Result<Vec<LibraryEntry>>;

    /// Apply upserts then deletes in a single transaction
    async fn sync_items(
        &self,
        list: LibraryList,
        upserts: &[LibraryEntry],
        deletes: &[EntryKey],
    ) -> Result<()>;

    /// Raw row count, including rows pending deletion
    async fn count_all(&self, list: LibraryList) -> Result<u64>;

    /// Row count per sync status
    async fn count_by_status(&self, list: LibraryList) -> Result<HashMap<SyncStatus, u64>>;

    /// Row with the key regardless of status
    async fn get_raw_entry(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<LibraryEntry>>;

    /// Status of the row with the key, including `PENDING_DELETE`
    async fn sync_status_of(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<SyncStatus>>;
}

/// SQLite implementation of LibraryRepository
pub struct SqliteLibraryRepository {
    pool: SqlitePool,
    favorites_changes: watch::Sender<u64>,
    watchlist_changes: watch::Sender<u64>,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let (favorites_changes, _) = watch::channel(0);
        let (watchlist_changes, _) = watch::channel(0);

        Self {
            pool,
            favorites_changes,
            watchlist_changes,
        }
    }

    fn changes(&self, list: LibraryList) -> &watch::Sender<u64> {
        match list {
            LibraryList::Favorites => &self.favorites_changes,
            LibraryList::Watchlist => &self.watchlist_changes,
        }
    }

    fn notify(&self, list: LibraryList) {
        self.changes(list).send_modify(|version| *version += 1);
    }

    fn validate(entry: &LibraryEntry) -> Result<()> {
        entry.validate().map_err(|e| LibraryError::InvalidInput {
            field: "LibraryEntry".to_string(),
            message: e,
        })
    }
}

async fn fetch_visible(
    pool: &SqlitePool,
    list: LibraryList,
    media_type: MediaType,
) -> Result<Vec<LibraryEntry>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM {} \
         WHERE LOWER(media_type) = ? AND sync_status != 'PENDING_DELETE' \
         ORDER BY id DESC",
        list.table_name()
    );

    let entries = query_as::<_, LibraryEntry>(&sql)
        .bind(media_type.as_str())
        .fetch_all(pool)
        .await?;

    Ok(entries)
}

/// Canonical-case upsert on an open connection.
///
/// Differently-cased duplicates of the key are removed first so the unique
/// index on `(media_id, media_type)` sees a single row. `added_at` keeps its
/// first non-zero value.
async fn upsert_on(conn: &mut SqliteConnection, list: LibraryList, entry: &LibraryEntry) -> Result<()> {
    let table = list.table_name();

    query(&format!(
        "DELETE FROM {table} WHERE media_id = ? AND LOWER(media_type) = ? AND media_type != ?"
    ))
    .bind(entry.media_id)
    .bind(entry.media_type.as_str())
    .bind(entry.media_type.as_str())
    .execute(&mut *conn)
    .await?;

    query(&format!(
        r#"
        INSERT INTO {table} (media_id, media_type, image_path, name, sync_status, added_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(media_id, media_type) DO UPDATE SET
            image_path = excluded.image_path,
            name = excluded.name,
            sync_status = excluded.sync_status,
            added_at = COALESCE(NULLIF({table}.added_at, 0), excluded.added_at)
        "#
    ))
    .bind(entry.media_id)
    .bind(entry.media_type.as_str())
    .bind(&entry.image_path)
    .bind(&entry.name)
    .bind(entry.sync_status.as_str())
    .bind(entry.added_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_on(conn: &mut SqliteConnection, list: LibraryList, key: &EntryKey) -> Result<u64> {
    let result = query(&format!(
        "DELETE FROM {} WHERE media_id = ? AND LOWER(media_type) = ?",
        list.table_name()
    ))
    .bind(key.media_id)
    .bind(key.media_type.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    fn observe(
        &self,
        list: LibraryList,
        media_type: MediaType,
    ) -> BoxStream<'static, Result<Vec<LibraryEntry>>> {
        let pool = self.pool.clone();
        let receiver = self.changes(list).subscribe();

        stream::unfold(
            (pool, receiver, true),
            move |(pool, mut receiver, first)| async move {
                if !first && receiver.changed().await.is_err() {
                    return None;
                }
                let snapshot = fetch_visible(&pool, list, media_type).await;
                Some((snapshot, (pool, receiver, false)))
            },
        )
        .boxed()
    }

    async fn get_entries(
        &self,
        list: LibraryList,
        media_type: MediaType,
    ) -> Result<Vec<LibraryEntry>> {
        fetch_visible(&self.pool, list, media_type).await
    }

    async fn get_entry(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<LibraryEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} \
             WHERE media_id = ? AND LOWER(media_type) = ? AND sync_status != 'PENDING_DELETE' \
             LIMIT 1",
            list.table_name()
        );

        let entry = query_as::<_, LibraryEntry>(&sql)
            .bind(media_id)
            .bind(media_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn exists(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} \
             WHERE media_id = ? AND LOWER(media_type) = ? AND sync_status != 'PENDING_DELETE')",
            list.table_name()
        );

        let found = query_scalar::<_, i64>(&sql)
            .bind(media_id)
            .bind(media_type.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(found != 0)
    }

    #[instrument(skip(self, entry), fields(list = %list, key = %entry.key(), status = %entry.sync_status))]
    async fn upsert(&self, list: LibraryList, entry: &LibraryEntry) -> Result<()> {
        Self::validate(entry)?;

        let mut tx = self.pool.begin().await?;
        upsert_on(&mut tx, list, entry).await?;
        tx.commit().await?;

        debug!("Entry upserted");
        self.notify(list);
        Ok(())
    }

    async fn delete(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let removed = delete_on(&mut conn, list, &EntryKey::new(media_id, media_type)).await?;

        if removed > 0 {
            self.notify(list);
        }
        Ok(removed > 0)
    }

    async fn delete_all(&self, list: LibraryList) -> Result<u64> {
        let result = query(&format!("DELETE FROM {}", list.table_name()))
            .execute(&self.pool)
            .await?;

        self.notify(list);
        Ok(result.rows_affected())
    }

    async fn get_by_status(
        &self,
        list: LibraryList,
        status: SyncStatus,
    ) -> Result<Vec<LibraryEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE sync_status = ? ORDER BY id DESC",
            list.table_name()
        );

        let entries = query_as::<_, LibraryEntry>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    async fn get_pending_sync(&self, list: LibraryList) -> Result<Vec<LibraryEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} \
             WHERE sync_status IN ('LOCAL_ONLY', 'PENDING_PUSH') ORDER BY id DESC",
            list.table_name()
        );

        Ok(query_as::<_, LibraryEntry>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_pending_delete(&self, list: LibraryList) -> Result<Vec<LibraryEntry>> {
        self.get_by_status(list, SyncStatus::PendingDelete).await
    }

    #[instrument(skip(self, keys), fields(list = %list, keys = keys.len()))]
    async fn mark_as_synced(&self, list: LibraryList, keys: &[EntryKey]) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET sync_status = 'SYNCED' \
             WHERE media_id = ? AND LOWER(media_type) = ? AND sync_status != 'PENDING_DELETE'",
            list.table_name()
        );

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for key in keys {
            updated += query(&sql)
                .bind(key.media_id)
                .bind(key.media_type.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        if updated > 0 {
            self.notify(list);
        }
        Ok(updated)
    }

    async fn mark_for_deletion(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<bool> {
        self.update_sync_status(list, media_id, media_type, SyncStatus::PendingDelete)
            .await
    }

    async fn update_sync_status(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
        status: SyncStatus,
    ) -> Result<bool> {
        let result = query(&format!(
            "UPDATE {} SET sync_status = ? WHERE media_id = ? AND LOWER(media_type) = ?",
            list.table_name()
        ))
        .bind(status.as_str())
        .bind(media_id)
        .bind(media_type.as_str())
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            self.notify(list);
        }
        Ok(updated)
    }

    #[instrument(skip(self), fields(list = %list))]
    async fn delete_synced_for_logout(&self, list: LibraryList) -> Result<u64> {
        let result = query(&format!(
            "DELETE FROM {} WHERE sync_status IN ('SYNCED', 'PENDING_PUSH')",
            list.table_name()
        ))
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        debug!(removed, "Account-owned rows deleted");
        if removed > 0 {
            self.notify(list);
        }
        Ok(removed)
    }

    async fn select_stale(
        &self,
        list: LibraryList,
        remote_keys: &HashSet<EntryKey>,
    ) -> Result<Vec<LibraryEntry>> {
        let synced = self.get_by_status(list, SyncStatus::Synced).await?;

        Ok(synced
            .into_iter()
            .filter(|entry| !remote_keys.contains(&entry.key()))
            .collect())
    }

    #[instrument(skip(self, upserts, deletes), fields(list = %list, upserts = upserts.len(), deletes = deletes.len()))]
    async fn sync_items(
        &self,
        list: LibraryList,
        upserts: &[LibraryEntry],
        deletes: &[EntryKey],
    ) -> Result<()> {
        for entry in upserts {
            Self::validate(entry)?;
        }

        let mut tx = self.pool.begin().await?;
        for entry in upserts {
            upsert_on(&mut tx, list, entry).await?;
        }
        for key in deletes {
            delete_on(&mut tx, list, key).await?;
        }
        tx.commit().await?;

        self.notify(list);
        Ok(())
    }

    async fn count_all(&self, list: LibraryList) -> Result<u64> {
        let count = query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", list.table_name()))
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn count_by_status(&self, list: LibraryList) -> Result<HashMap<SyncStatus, u64>> {
        let rows = query_as::<_, (String, i64)>(&format!(
            "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
            list.table_name()
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            *counts.entry(status.parse::<SyncStatus>()?).or_insert(0) += count as u64;
        }
        Ok(counts)
    }

    async fn get_raw_entry(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<LibraryEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE media_id = ? AND LOWER(media_type) = ? LIMIT 1",
            list.table_name()
        );

        let entry = query_as::<_, LibraryEntry>(&sql)
            .bind(media_id)
            .bind(media_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn sync_status_of(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<Option<SyncStatus>> {
        let status = query_scalar::<_, String>(&format!(
            "SELECT sync_status FROM {} WHERE media_id = ? AND LOWER(media_type) = ? LIMIT 1",
            list.table_name()
        ))
        .bind(media_id)
        .bind(media_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        status.map(|s| s.parse()).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::LibraryItem;
    use std::time::Duration;

    async fn setup() -> SqliteLibraryRepository {
        SqliteLibraryRepository::new(create_test_pool().await.unwrap())
    }

    fn entry(media_id: i64, media_type: MediaType, status: SyncStatus) -> LibraryEntry {
        LibraryItem::new(media_id, media_type, format!("Title {}", media_id), "/p.jpg")
            .into_entry(status, 1_000 + media_id)
    }

    async fn insert_raw(repo: &SqliteLibraryRepository, table: &str, media_id: i64, media_type: &str, status: &str) {
        query(&format!(
            "INSERT INTO {table} (media_id, media_type, image_path, name, sync_status, added_at) VALUES (?, ?, '', 'raw', ?, 0)"
        ))
        .bind(media_id)
        .bind(media_type)
        .bind(status)
        .execute(&repo.pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_entries_are_newest_first_and_hide_pending_delete() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(2, MediaType::Movie, SyncStatus::PendingPush)).await.unwrap();
        repo.upsert(list, &entry(3, MediaType::Movie, SyncStatus::PendingDelete)).await.unwrap();
        repo.upsert(list, &entry(4, MediaType::Tv, SyncStatus::Synced)).await.unwrap();

        let movies = repo.get_entries(list, MediaType::Movie).await.unwrap();
        let ids: Vec<i64> = movies.iter().map(|e| e.media_id).collect();

        assert_eq!(ids, vec![2, 1]);
        assert!(!repo.exists(list, 3, MediaType::Movie).await.unwrap());
        assert!(repo.get_entry(list, 3, MediaType::Movie).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_keeps_latest_fields() {
        let repo = setup().await;
        let list = LibraryList::Watchlist;
        let first = entry(550, MediaType::Movie, SyncStatus::PendingPush);
        repo.upsert(list, &first).await.unwrap();

        let mut second = first.clone().with_status(SyncStatus::Synced);
        second.name = "Fight Club".to_string();
        second.added_at = 99_999;
        repo.upsert(list, &second).await.unwrap();
        repo.upsert(list, &second).await.unwrap();

        assert_eq!(repo.count_all(list).await.unwrap(), 1);
        let stored = repo.get_entry(list, 550, MediaType::Movie).await.unwrap().unwrap();
        assert_eq!(stored.name, "Fight Club");
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.added_at, first.added_at);
    }

    #[tokio::test]
    async fn test_media_type_matching_ignores_case() {
        let repo = setup().await;

        for list in LibraryList::ALL {
            insert_raw(&repo, list.table_name(), 77, "MOVIE", "SYNCED").await;

            assert!(repo.exists(list, 77, MediaType::Movie).await.unwrap());
            let entries = repo.get_entries(list, MediaType::Movie).await.unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].media_type, MediaType::Movie);

            repo.upsert(list, &entry(77, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
            assert_eq!(repo.count_all(list).await.unwrap(), 1);

            assert!(repo.delete(list, 77, MediaType::Movie).await.unwrap());
            assert_eq!(repo.count_all(list).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(10, MediaType::Tv, SyncStatus::Synced)).await.unwrap();

        assert!(repo.mark_for_deletion(list, 10, MediaType::Tv).await.unwrap());

        assert!(!repo.exists(list, 10, MediaType::Tv).await.unwrap());
        assert_eq!(repo.count_all(list).await.unwrap(), 1);
        assert_eq!(
            repo.sync_status_of(list, 10, MediaType::Tv).await.unwrap(),
            Some(SyncStatus::PendingDelete)
        );
        assert_eq!(repo.get_pending_delete(list).await.unwrap().len(), 1);
        let raw = repo.get_raw_entry(list, 10, MediaType::Tv).await.unwrap().unwrap();
        assert_eq!(raw.sync_status, SyncStatus::PendingDelete);
    }

    #[tokio::test]
    async fn test_logout_deletion_keeps_guest_and_pending_delete_rows() {
        let repo = setup().await;
        let list = LibraryList::Watchlist;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::LocalOnly)).await.unwrap();
        repo.upsert(list, &entry(2, MediaType::Movie, SyncStatus::PendingPush)).await.unwrap();
        repo.upsert(list, &entry(3, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(4, MediaType::Movie, SyncStatus::PendingDelete)).await.unwrap();

        let removed = repo.delete_synced_for_logout(list).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(repo.sync_status_of(list, 1, MediaType::Movie).await.unwrap(), Some(SyncStatus::LocalOnly));
        assert_eq!(repo.sync_status_of(list, 4, MediaType::Movie).await.unwrap(), Some(SyncStatus::PendingDelete));
        assert_eq!(repo.count_all(list).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_select_stale_only_returns_synced_rows() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(2, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(3, MediaType::Movie, SyncStatus::LocalOnly)).await.unwrap();
        repo.upsert(list, &entry(4, MediaType::Movie, SyncStatus::PendingPush)).await.unwrap();
        repo.upsert(list, &entry(5, MediaType::Movie, SyncStatus::PendingDelete)).await.unwrap();

        let remote: HashSet<EntryKey> = [EntryKey::new(1, MediaType::Movie)].into_iter().collect();
        let stale = repo.select_stale(list, &remote).await.unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].media_id, 2);
    }

    #[tokio::test]
    async fn test_mark_as_synced_skips_pending_delete() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::PendingPush)).await.unwrap();
        repo.upsert(list, &entry(2, MediaType::Tv, SyncStatus::PendingDelete)).await.unwrap();

        let updated = repo
            .mark_as_synced(
                list,
                &[EntryKey::new(1, MediaType::Movie), EntryKey::new(2, MediaType::Tv)],
            )
            .await
            .unwrap();

        assert_eq!(updated, 1);
        assert_eq!(repo.sync_status_of(list, 1, MediaType::Movie).await.unwrap(), Some(SyncStatus::Synced));
        assert_eq!(repo.sync_status_of(list, 2, MediaType::Tv).await.unwrap(), Some(SyncStatus::PendingDelete));
    }

    #[tokio::test]
    async fn test_sync_items_applies_upserts_then_deletes() {
        let repo = setup().await;
        let list = LibraryList::Watchlist;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::Synced)).await.unwrap();

        repo.sync_items(
            list,
            &[entry(2, MediaType::Movie, SyncStatus::Synced), entry(3, MediaType::Tv, SyncStatus::Synced)],
            &[EntryKey::new(1, MediaType::Movie), EntryKey::new(3, MediaType::Tv)],
        )
        .await
        .unwrap();

        let remaining: Vec<i64> = repo
            .get_by_status(list, SyncStatus::Synced)
            .await
            .unwrap()
            .iter()
            .map(|e| e.media_id)
            .collect();
        assert_eq!(remaining, vec![2]);
    }

    #[tokio::test]
    async fn test_sync_items_rejects_invalid_batch_without_writing() {
        let repo = setup().await;
        let list = LibraryList::Watchlist;
        let mut invalid = entry(9, MediaType::Movie, SyncStatus::Synced);
        invalid.name = String::new();

        let result = repo
            .sync_items(list, &[entry(8, MediaType::Movie, SyncStatus::Synced), invalid], &[])
            .await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
        assert_eq!(repo.count_all(list).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lists_are_independent() {
        let repo = setup().await;
        repo.upsert(LibraryList::Favorites, &entry(1, MediaType::Movie, SyncStatus::Synced))
            .await
            .unwrap();

        assert!(repo.exists(LibraryList::Favorites, 1, MediaType::Movie).await.unwrap());
        assert!(!repo.exists(LibraryList::Watchlist, 1, MediaType::Movie).await.unwrap());

        assert_eq!(repo.delete_all(LibraryList::Watchlist).await.unwrap(), 0);
        assert_eq!(repo.count_all(LibraryList::Favorites).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(2, MediaType::Movie, SyncStatus::Synced)).await.unwrap();
        repo.upsert(list, &entry(3, MediaType::Tv, SyncStatus::LocalOnly)).await.unwrap();

        let counts = repo.count_by_status(list).await.unwrap();

        assert_eq!(counts.get(&SyncStatus::Synced), Some(&2));
        assert_eq!(counts.get(&SyncStatus::LocalOnly), Some(&1));
        assert_eq!(counts.get(&SyncStatus::PendingDelete), None);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_entry() {
        let repo = setup().await;
        let invalid = entry(0, MediaType::Movie, SyncStatus::LocalOnly);

        let result = repo.upsert(LibraryList::Favorites, &invalid).await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_observe_emits_snapshot_then_changes() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        repo.upsert(list, &entry(1, MediaType::Movie, SyncStatus::Synced)).await.unwrap();

        let mut updates = repo.observe(list, MediaType::Movie);
        let initial = updates.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        repo.mark_for_deletion(list, 1, MediaType::Movie).await.unwrap();
        let after_delete = tokio::time::timeout(Duration::from_secs(1), updates.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(after_delete.is_empty());

        repo.upsert(list, &entry(2, MediaType::Movie, SyncStatus::LocalOnly)).await.unwrap();
        let after_add = tokio::time::timeout(Duration::from_secs(1), updates.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(after_add.iter().map(|e| e.media_id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_get_pending_sync_returns_unconfirmed_rows() {
        let repo = setup().await;
        let list = LibraryList::Watchlist;
        for (media_id, status) in [
            (1, SyncStatus::LocalOnly),
            (2, SyncStatus::PendingPush),
            (3, SyncStatus::Synced),
            (4, SyncStatus::PendingDelete),
        ] {
            repo.upsert(list, &entry(media_id, MediaType::Movie, status)).await.unwrap();
        }

        let pending = repo.get_pending_sync(list).await.unwrap();

        let mut keys: Vec<(i64, SyncStatus)> =
            pending.iter().map(|e| (e.media_id, e.sync_status)).collect();
        keys.sort_by_key(|(media_id, _)| *media_id);
        assert_eq!(
            keys,
            vec![(1, SyncStatus::LocalOnly), (2, SyncStatus::PendingPush)]
        );
    }

    #[tokio::test]
    async fn test_update_sync_status_matches_any_case() {
        let repo = setup().await;
        let list = LibraryList::Favorites;
        insert_raw(&repo, list.table_name(), 42, "TV", "LOCAL_ONLY").await;

        for status in SyncStatus::ALL {
            assert!(repo
                .update_sync_status(list, 42, MediaType::Tv, status)
                .await
                .unwrap());
            assert_eq!(
                repo.sync_status_of(list, 42, MediaType::Tv).await.unwrap(),
                Some(status)
            );
        }

        assert!(!repo
            .update_sync_status(list, 43, MediaType::Tv, SyncStatus::Synced)
            .await
            .unwrap());
        assert_eq!(repo.count_all(list).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_clears_only_its_list() {
        let repo = setup().await;
        for (media_id, status) in [
            (1, SyncStatus::LocalOnly),
            (2, SyncStatus::Synced),
            (3, SyncStatus::PendingDelete),
        ] {
            repo.upsert(LibraryList::Favorites, &entry(media_id, MediaType::Movie, status))
                .await
                .unwrap();
        }
        repo.upsert(
            LibraryList::Watchlist,
            &entry(1, MediaType::Movie, SyncStatus::Synced),
        )
        .await
        .unwrap();

        let removed = repo.delete_all(LibraryList::Favorites).await.unwrap();

        assert_eq!(removed, 3);
        assert_eq!(repo.count_all(LibraryList::Favorites).await.unwrap(), 0);
        assert_eq!(repo.count_all(LibraryList::Watchlist).await.unwrap(), 1);
        assert!(repo
            .exists(LibraryList::Watchlist, 1, MediaType::Movie)
            .await
            .unwrap());
    }
}
