use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};

use super::{
    GraphError, MetadataStore, MetadataTx, UniqueIndexes, Vertex, VertexClass, VertexId,
    P_REPOSITORY_NAME,
};

/// SQLite backed metadata store.
///
/// The pool holds a single connection, so transactions run one at a time
/// and each sees everything committed before it began.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    unique: UniqueIndexes,
}

impl SqliteMetadataStore {
    /// Open (or create) a metadata database at `path`.
    pub async fn new(path: &Path) -> Result<Self, GraphError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self, GraphError> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, GraphError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            unique: UniqueIndexes::default(),
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn begin(&self) -> Result<Box<dyn MetadataTx>, GraphError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx {
            tx,
            unique: self.unique.clone(),
        }))
    }

    fn ensure_unique_index(&self, class: VertexClass, key: &str) {
        self.unique.insert(class, key);
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    unique: UniqueIndexes,
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn vertex_from_row(r: &SqliteRow) -> Result<Vertex, GraphError> {
    Ok(Vertex::from_parts(
        r.get::<&str, _>("id").parse()?,
        r.get::<&str, _>("class").parse()?,
        r.get::<&str, _>("bucket_id").parse()?,
        serde_json::from_str(r.get("properties"))?,
        serde_json::from_str(r.get("attributes"))?,
        millis_to_datetime(r.get("created_at")),
        millis_to_datetime(r.get("updated_at")),
    ))
}

async fn insert_vertex(conn: &mut SqliteConnection, vertex: &Vertex) -> Result<(), GraphError> {
    sqlx::query(
        r#"
        INSERT INTO vertices (id, class, bucket_id, properties, attributes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(vertex.id().to_string())
    .bind(vertex.class().as_str())
    .bind(vertex.bucket().to_string())
    .bind(serde_json::to_string(vertex.properties())?)
    .bind(serde_json::to_string(vertex.attributes())?)
    .bind(vertex.created().timestamp_millis())
    .bind(vertex.last_updated().timestamp_millis())
    .execute(conn)
    .await?;
    Ok(())
}

/// Replace the index rows of `vertex` with its current entries.
async fn write_index(conn: &mut SqliteConnection, vertex: &Vertex) -> Result<(), GraphError> {
    let id = vertex.id().to_string();
    sqlx::query("DELETE FROM vertex_index WHERE vertex_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;

    let bucket = vertex.bucket().to_string();
    for (key, value) in vertex.index_entries() {
        sqlx::query(
            r#"
            INSERT INTO vertex_index (vertex_id, bucket_id, class, key, value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&bucket)
        .bind(vertex.class().as_str())
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

impl SqliteTx {
    async fn exists(&mut self, id: VertexId) -> Result<bool, GraphError> {
        let row = sqlx::query("SELECT 1 FROM vertices WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn require(&mut self, id: VertexId) -> Result<(), GraphError> {
        if self.exists(id).await? {
            Ok(())
        } else {
            Err(GraphError::VertexNotFound(id))
        }
    }
}

#[async_trait]
impl MetadataTx for SqliteTx {
    async fn bucket(&mut self, repository: &str) -> Result<Vertex, GraphError> {
        let row = sqlx::query(
            r#"
            SELECT v.id, v.class, v.bucket_id, v.properties, v.attributes, v.created_at, v.updated_at
            FROM vertex_index i
            JOIN vertices v ON v.id = i.vertex_id
            WHERE i.class = ? AND i.key = ? AND i.value = ?
            ORDER BY v.created_at, v.rowid
            LIMIT 1
            "#,
        )
        .bind(VertexClass::Bucket.as_str())
        .bind(P_REPOSITORY_NAME)
        .bind(repository)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return vertex_from_row(&row);
        }

        let id = VertexId::generate();
        let mut bucket = Vertex::new(id, VertexClass::Bucket, id);
        bucket.set_property(P_REPOSITORY_NAME, repository);
        insert_vertex(&mut self.tx, &bucket).await?;
        write_index(&mut self.tx, &bucket).await?;
        Ok(bucket)
    }

    async fn create_vertex(
        &mut self,
        class: VertexClass,
        bucket: VertexId,
    ) -> Result<Vertex, GraphError> {
        self.require(bucket).await?;
        let vertex = Vertex::new(VertexId::generate(), class, bucket);
        insert_vertex(&mut self.tx, &vertex).await?;
        Ok(vertex)
    }

    async fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>, GraphError> {
        let row = sqlx::query(
            r#"
            SELECT id, class, bucket_id, properties, attributes, created_at, updated_at
            FROM vertices
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|r| vertex_from_row(&r)).transpose()
    }

    async fn save_vertex(&mut self, vertex: &mut Vertex) -> Result<(), GraphError> {
        let id = vertex.id().to_string();
        for (key, value) in self.unique.unique_entries(vertex) {
            let clash = sqlx::query(
                r#"
                SELECT vertex_id FROM vertex_index
                WHERE bucket_id = ? AND class = ? AND key = ? AND value = ? AND vertex_id != ?
                LIMIT 1
                "#,
            )
            .bind(vertex.bucket().to_string())
            .bind(vertex.class().as_str())
            .bind(&key)
            .bind(&value)
            .bind(&id)
            .fetch_optional(&mut *self.tx)
            .await?;

            if clash.is_some() {
                return Err(GraphError::DuplicateKey {
                    class: vertex.class(),
                    key,
                    value,
                });
            }
        }

        vertex.touch();
        let result = sqlx::query(
            r#"
            UPDATE vertices SET properties = ?, attributes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(vertex.properties())?)
        .bind(serde_json::to_string(vertex.attributes())?)
        .bind(vertex.last_updated().timestamp_millis())
        .bind(&id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GraphError::VertexNotFound(vertex.id()));
        }

        write_index(&mut self.tx, vertex).await
    }

    async fn delete_vertex(&mut self, id: VertexId) -> Result<bool, GraphError> {
        let id = id.to_string();
        let result = sqlx::query("DELETE FROM vertices WHERE id = ?")
            .bind(&id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM vertex_index WHERE vertex_id = ?")
            .bind(&id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM edges WHERE out_id = ? OR in_id = ?")
            .bind(&id)
            .bind(&id)
            .execute(&mut *self.tx)
            .await?;
        Ok(true)
    }

    async fn find_with_property(
        &mut self,
        class: VertexClass,
        key: &str,
        value: &str,
        bucket: VertexId,
    ) -> Result<Option<Vertex>, GraphError> {
        let row = sqlx::query(
            r#"
            SELECT v.id, v.class, v.bucket_id, v.properties, v.attributes, v.created_at, v.updated_at
            FROM vertex_index i
            JOIN vertices v ON v.id = i.vertex_id
            WHERE i.bucket_id = ? AND i.class = ? AND i.key = ? AND i.value = ?
            ORDER BY v.created_at, v.rowid
            LIMIT 1
            "#,
        )
        .bind(bucket.to_string())
        .bind(class.as_str())
        .bind(key)
        .bind(value)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|r| vertex_from_row(&r)).transpose()
    }

    async fn add_edge(
        &mut self,
        from: VertexId,
        label: &str,
        to: VertexId,
    ) -> Result<(), GraphError> {
        self.require(from).await?;
        self.require(to).await?;
        sqlx::query("INSERT OR IGNORE INTO edges (out_id, label, in_id) VALUES (?, ?, ?)")
            .bind(from.to_string())
            .bind(label)
            .bind(to.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn in_vertices(&mut self, to: VertexId, label: &str) -> Result<Vec<Vertex>, GraphError> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.class, v.bucket_id, v.properties, v.attributes, v.created_at, v.updated_at
            FROM edges e
            JOIN vertices v ON v.id = e.out_id
            WHERE e.in_id = ? AND e.label = ?
            ORDER BY e.seq
            "#,
        )
        .bind(to.to_string())
        .bind(label)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(vertex_from_row).collect()
    }

    async fn out_vertices(
        &mut self,
        from: VertexId,
        label: &str,
    ) -> Result<Vec<Vertex>, GraphError> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.class, v.bucket_id, v.properties, v.attributes, v.created_at, v.updated_at
            FROM edges e
            JOIN vertices v ON v.id = e.in_id
            WHERE e.out_id = ? AND e.label = ?
            ORDER BY e.seq
            "#,
        )
        .bind(from.to_string())
        .bind(label)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(vertex_from_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), GraphError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::exercise_store;

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_is_durable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("metadata.db");

        let asset_id = {
            let store = SqliteMetadataStore::new(&path).await.unwrap();
            let mut tx = store.begin().await.unwrap();
            let bucket = tx.bucket("releases").await.unwrap();
            let mut asset = tx.create_vertex(VertexClass::Asset, bucket.id()).await.unwrap();
            asset
                .attributes_mut()
                .child_mut("checksum")
                .unwrap()
                .set("sha1", "0123")
                .unwrap();
            tx.save_vertex(&mut asset).await.unwrap();
            tx.commit().await.unwrap();
            asset.id()
        };

        let store = SqliteMetadataStore::new(&path).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let asset = tx.vertex(asset_id).await.unwrap().unwrap();
        assert_eq!(
            asset.attributes().child("checksum").get_str("sha1"),
            Some("0123")
        );
        let bucket = tx.bucket("releases").await.unwrap();
        assert_eq!(asset.bucket(), bucket.id());
    }
}
