//! Process-wide registry of per-column value collections.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::Schema;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{self, ValueRecord};
use super::COLUMN_VECTOR;
use crate::config::VectorConfig;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::services::llm::EmbeddingBackend;

/// A nearest-neighbour hit from one collection.
#[derive(Debug, Clone, Serialize)]
pub struct ValueMatch {
    pub value: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub key: String,
    pub row_count: usize,
}

/// Lazily built ANN collections, one per (table, column) key.
///
/// Everything lives behind one mutex: the registry lookup, the lazy LanceDB
/// connection, and the build itself. Holding the lock across a build is the
/// single-flight guarantee that a key is embedded at most once per process,
/// no matter how requests interleave.
pub struct EmbeddingIndex {
    pool: DbPool,
    backend: Arc<dyn EmbeddingBackend>,
    lancedb_path: String,
    value_cap: usize,
    schema: Arc<Schema>,
    state: Mutex<IndexState>,
}

struct IndexState {
    connection: Option<Connection>,
    collections: HashMap<String, Table>,
}

impl EmbeddingIndex {
    pub fn new(
        pool: DbPool,
        backend: Arc<dyn EmbeddingBackend>,
        vector: &VectorConfig,
    ) -> AppResult<Self> {
        if backend.dimensions() != vector.embedding_dimensions {
            return Err(AppError::Config(format!(
                "embedding backend produces {}-dimensional vectors, config expects {}",
                backend.dimensions(),
                vector.embedding_dimensions
            )));
        }
        let schema = store::build_schema(vector.embedding_dimensions)?;
        Ok(Self {
            pool,
            backend,
            lancedb_path: vector.lancedb_path.clone(),
            value_cap: vector.value_cap,
            schema,
            state: Mutex::new(IndexState {
                connection: None,
                collections: HashMap::new(),
            }),
        })
    }

    /// Normalized collection identity for a (table, column) pair.
    pub fn collection_key(table: &str, column: &str) -> String {
        format!("{}_{}", table, column).replace(' ', "_").to_lowercase()
    }

    /// Idempotent get-or-create. Returns the collection's row count.
    pub async fn get_or_build(&self, table: &str, column: &str) -> AppResult<usize> {
        let collection = self.collection(table, column).await?;
        Ok(collection.count_rows(None).await?)
    }

    /// Embeds the mention and scans the pair's collection, best match first.
    /// `top_k` is clamped to the collection size; an empty collection
    /// answers with no matches and no mention embedding.
    pub async fn search(
        &self,
        table: &str,
        column: &str,
        mention: &str,
        top_k: usize,
    ) -> AppResult<Vec<ValueMatch>> {
        let collection = self.collection(table, column).await?;
        let available = collection.count_rows(None).await?;
        let limit = top_k.min(available);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.backend.embed_one(mention).await?;
        let stream = collection
            .query()
            .nearest_to(vector)?
            .column(COLUMN_VECTOR)
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await?;

        store::collect_matches(stream).await
    }

    /// Drops every collection on disk and forgets the registry. The next
    /// `get_or_build` per key rebuilds from scratch; collections are never
    /// patched in place.
    pub async fn clear(&self) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let conn = self.connect_locked(&mut state).await?;

        let names = conn.table_names().execute().await?;
        for name in &names {
            conn.drop_table(name).await?;
        }
        state.collections.clear();

        tracing::info!(dropped = names.len(), "Cleared value collections");
        Ok(names.len())
    }

    /// Collections currently on disk with their row counts.
    pub async fn list_collections(&self) -> AppResult<Vec<CollectionInfo>> {
        let mut state = self.state.lock().await;
        let conn = self.connect_locked(&mut state).await?;

        let mut infos = Vec::new();
        for key in conn.table_names().execute().await? {
            let table = match state.collections.get(&key) {
                Some(table) => table.clone(),
                None => conn.open_table(&key).execute().await?,
            };
            let row_count = table.count_rows(None).await?;
            infos.push(CollectionInfo { key, row_count });
        }
        Ok(infos)
    }

    async fn collection(&self, table: &str, column: &str) -> AppResult<Table> {
        let key = Self::collection_key(table, column);

        let mut state = self.state.lock().await;
        if let Some(existing) = state.collections.get(&key) {
            return Ok(existing.clone());
        }

        let conn = self.connect_locked(&mut state).await?;

        // A collection persisted by an earlier run is reused as-is, without
        // re-embedding anything.
        if let Some(handle) = store::try_open_table(&conn, &key).await? {
            tracing::debug!(collection = %key, "Opened existing value collection");
            state.collections.insert(key, handle.clone());
            return Ok(handle);
        }

        let handle = self.build_collection(&conn, &key, table, column).await?;
        state.collections.insert(key, handle.clone());
        Ok(handle)
    }

    async fn connect_locked(&self, state: &mut IndexState) -> AppResult<Connection> {
        if let Some(conn) = &state.connection {
            return Ok(conn.clone());
        }
        std::fs::create_dir_all(&self.lancedb_path)?;
        let conn = connect(&self.lancedb_path).execute().await?;
        state.connection = Some(conn.clone());
        Ok(conn)
    }

    async fn build_collection(
        &self,
        conn: &Connection,
        key: &str,
        table: &str,
        column: &str,
    ) -> AppResult<Table> {
        let values = db::distinct_values(&self.pool, table, column, self.value_cap).await?;

        // Embed before creating the table, so a failed embedding call
        // leaves no half-built collection behind for later runs to trust.
        let vectors = if values.is_empty() {
            Vec::new()
        } else {
            self.backend.embed_batch(&values).await?
        };
        if vectors.len() != values.len() {
            return Err(AppError::Embedding(format!(
                "embedding count mismatch: {} values, {} vectors",
                values.len(),
                vectors.len()
            )));
        }

        let handle = store::create_table(conn, key, self.schema.clone()).await?;
        if values.is_empty() {
            tracing::debug!(collection = %key, "Created empty value collection");
            return Ok(handle);
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let rows: Vec<ValueRecord> = values
            .into_iter()
            .zip(vectors)
            .map(|(value_text, vector)| ValueRecord {
                value_id: Uuid::new_v4().to_string(),
                source_table: table.to_string(),
                source_column: column.to_string(),
                value_hash: store::compute_value_hash(&value_text),
                value_text,
                created_at: created_at.clone(),
                vector,
            })
            .collect();

        store::append_rows(&handle, self.schema.clone(), &rows).await?;
        tracing::info!(collection = %key, rows = rows.len(), "Built value collection");
        Ok(handle)
    }
}
