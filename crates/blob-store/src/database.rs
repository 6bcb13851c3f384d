//! SQLite database for blob metadata storage.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};

use crate::blob::{BlobHeaders, BlobMetrics};
use crate::error::Result;
use crate::hashing::HashAlgorithm;

/// Blob metadata stored in SQLite.
#[derive(Debug, Clone)]
pub(crate) struct BlobRecord {
    pub headers: BlobHeaders,
    pub metrics: BlobMetrics,
    pub state: BlobState,
}

/// State of a blob in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BlobState {
    /// Written but not yet committed by a transaction; invisible to readers
    #[default]
    Pending,
    /// Blob is committed and readable
    Complete,
    /// Blob is being deleted
    Deleting,
}

impl BlobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobState::Pending => "pending",
            BlobState::Complete => "complete",
            BlobState::Deleting => "deleting",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "complete" => BlobState::Complete,
            "deleting" => BlobState::Deleting,
            _ => BlobState::Pending,
        }
    }
}

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // A single connection that never expires, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Record a new blob in the pending state before its content is uploaded.
    pub async fn insert_pending(&self, blob_id: &str, headers: &BlobHeaders) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO blobs (blob_id, name, created_by, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(blob_id)
        .bind(&headers.name)
        .bind(&headers.created_by)
        .bind(BlobState::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store size and digests once the content upload finished.
    pub async fn record_upload(
        &self,
        blob_id: &str,
        size: u64,
        hashes: &BTreeMap<HashAlgorithm, String>,
    ) -> Result<()> {
        let encoded: BTreeMap<&str, &str> = hashes
            .iter()
            .map(|(algorithm, hex)| (algorithm.name(), hex.as_str()))
            .collect();
        sqlx::query(
            r#"
            UPDATE blobs SET size = ?, hashes = ?, updated_at = ?
            WHERE blob_id = ?
            "#,
        )
        .bind(size as i64)
        .bind(serde_json::to_string(&encoded)?)
        .bind(Utc::now().timestamp_millis())
        .bind(blob_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip pending blobs to complete atomically. Returns how many changed.
    pub async fn mark_complete(&self, blob_ids: &[&str]) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for blob_id in blob_ids {
            let result = sqlx::query(
                r#"
                UPDATE blobs SET state = ?, updated_at = ?
                WHERE blob_id = ? AND state = ?
                "#,
            )
            .bind(BlobState::Complete.as_str())
            .bind(now)
            .bind(*blob_id)
            .bind(BlobState::Pending.as_str())
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn set_state(&self, blob_id: &str, state: BlobState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE blobs SET state = ?, updated_at = ? WHERE blob_id = ?
            "#,
        )
        .bind(state.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(blob_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get blob metadata by id, in any state.
    pub async fn get_blob(&self, blob_id: &str) -> Result<Option<BlobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT name, created_by, size, hashes, state, created_at
            FROM blobs
            WHERE blob_id = ?
            "#,
        )
        .bind(blob_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Delete a blob record.
    pub async fn delete_blob(&self, blob_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM blobs WHERE blob_id = ?
            "#,
        )
        .bind(blob_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of blobs left pending or half-deleted since before `cutoff`.
    pub async fn abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT blob_id FROM blobs
            WHERE state != ? AND updated_at < ?
            ORDER BY created_at
            "#,
        )
        .bind(BlobState::Complete.as_str())
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("blob_id")).collect())
    }
}

fn record_from_row(r: &SqliteRow) -> Result<BlobRecord> {
    let encoded: BTreeMap<String, String> = serde_json::from_str(r.get("hashes"))?;
    let mut hashes = BTreeMap::new();
    for (name, hex) in encoded {
        hashes.insert(name.parse::<HashAlgorithm>()?, hex);
    }
    let created_at: i64 = r.get("created_at");
    let size: i64 = r.get("size");

    Ok(BlobRecord {
        headers: BlobHeaders::new(r.get::<String, _>("name"), r.get::<String, _>("created_by")),
        metrics: BlobMetrics {
            created: Utc
                .timestamp_millis_opt(created_at)
                .single()
                .unwrap_or_default(),
            content_size: size.max(0) as u64,
            hashes,
        },
        state: BlobState::parse(r.get("state")),
    })
}

#[cfg(test)]
impl Database {
    pub async fn count_blobs(&self, state: BlobState) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM blobs WHERE state = ?
            "#,
        )
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_lifecycle() {
        let db = Database::in_memory().await.unwrap();
        let headers = BlobHeaders::new("/org/foo/1.0/foo-1.0.jar", "admin");

        db.insert_pending("b1", &headers).await.unwrap();
        let record = db.get_blob("b1").await.unwrap().unwrap();
        assert_eq!(record.state, BlobState::Pending);
        assert_eq!(record.headers, headers);

        let mut hashes = BTreeMap::new();
        hashes.insert(HashAlgorithm::Sha1, "aa".to_string());
        hashes.insert(HashAlgorithm::Md5, "bb".to_string());
        db.record_upload("b1", 1024, &hashes).await.unwrap();

        assert_eq!(db.mark_complete(&["b1"]).await.unwrap(), 1);
        // Already complete
        assert_eq!(db.mark_complete(&["b1"]).await.unwrap(), 0);

        let record = db.get_blob("b1").await.unwrap().unwrap();
        assert_eq!(record.state, BlobState::Complete);
        assert_eq!(record.metrics.content_size, 1024);
        assert_eq!(record.metrics.hash(HashAlgorithm::Md5), Some("bb"));
        assert_eq!(db.count_blobs(BlobState::Complete).await.unwrap(), 1);

        assert!(db.delete_blob("b1").await.unwrap());
        assert!(!db.delete_blob("b1").await.unwrap());
        assert!(db.get_blob("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_before() {
        let db = Database::in_memory().await.unwrap();
        let headers = BlobHeaders::new("a", "unknown");

        db.insert_pending("pending", &headers).await.unwrap();
        db.insert_pending("done", &headers).await.unwrap();
        db.mark_complete(&["done"]).await.unwrap();

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(db.abandoned_before(future).await.unwrap(), vec!["pending"]);

        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(db.abandoned_before(past).await.unwrap().is_empty());
    }
}
