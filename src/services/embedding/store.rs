//! LanceDB storage operations for value collections.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures_util::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::{Connection, Error as LanceError, Table};

use super::index::ValueMatch;
use super::{
    COLUMN_CREATED_AT, COLUMN_DISTANCE, COLUMN_SOURCE_COLUMN, COLUMN_SOURCE_TABLE, COLUMN_VALUE_HASH,
    COLUMN_VALUE_ID, COLUMN_VALUE_TEXT, COLUMN_VECTOR,
};
use crate::error::{AppError, AppResult};
use crate::utils::compute_sha256;

/// One stored distinct value with its provenance.
#[derive(Debug, Clone)]
pub(crate) struct ValueRecord {
    pub value_id: String,
    pub source_table: String,
    pub source_column: String,
    pub value_text: String,
    pub value_hash: String,
    pub created_at: String,
    pub vector: Vec<f32>,
}

pub(crate) fn build_schema(dimensions: usize) -> AppResult<Arc<Schema>> {
    let dim = i32::try_from(dimensions)
        .map_err(|_| AppError::Config(format!("embedding dimensions overflow: {dimensions}")))?;

    let vector = DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim);

    Ok(Arc::new(Schema::new(vec![
        Field::new(COLUMN_VALUE_ID, DataType::Utf8, false),
        Field::new(COLUMN_SOURCE_TABLE, DataType::Utf8, false),
        Field::new(COLUMN_SOURCE_COLUMN, DataType::Utf8, false),
        Field::new(COLUMN_VALUE_TEXT, DataType::Utf8, false),
        Field::new(COLUMN_VALUE_HASH, DataType::Utf8, false),
        Field::new(COLUMN_CREATED_AT, DataType::Utf8, false),
        Field::new(COLUMN_VECTOR, vector, true),
    ])))
}

/// Ok(None) when the collection does not exist yet.
pub(crate) async fn try_open_table(conn: &Connection, name: &str) -> AppResult<Option<Table>> {
    match conn.open_table(name).execute().await {
        Ok(table) => Ok(Some(table)),
        Err(LanceError::TableNotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Creates an empty collection table. No vector index is built: collections
/// are capped small and a flat scan keeps nearest-neighbour search exact.
pub(crate) async fn create_table(
    conn: &Connection,
    name: &str,
    schema: Arc<Schema>,
) -> AppResult<Table> {
    Ok(conn.create_empty_table(name, schema).execute().await?)
}

pub(crate) fn build_record_batch(
    schema: Arc<Schema>,
    rows: &[ValueRecord],
) -> AppResult<RecordBatch> {
    let value_ids = StringArray::from_iter_values(rows.iter().map(|r| r.value_id.as_str()));
    let source_tables = StringArray::from_iter_values(rows.iter().map(|r| r.source_table.as_str()));
    let source_columns =
        StringArray::from_iter_values(rows.iter().map(|r| r.source_column.as_str()));
    let value_texts = StringArray::from_iter_values(rows.iter().map(|r| r.value_text.as_str()));
    let value_hashes = StringArray::from_iter_values(rows.iter().map(|r| r.value_hash.as_str()));
    let created_ats = StringArray::from_iter_values(rows.iter().map(|r| r.created_at.as_str()));

    let dim = match schema.field_with_name(COLUMN_VECTOR)?.data_type() {
        DataType::FixedSizeList(_, size) => *size as usize,
        _ => {
            return Err(AppError::Config(
                "vector column is not a fixed size list".to_string(),
            ))
        }
    };

    let mut builder = FixedSizeListBuilder::with_capacity(
        Float32Builder::with_capacity(rows.len() * dim),
        dim as i32,
        rows.len(),
    );
    for row in rows {
        if row.vector.len() != dim {
            return Err(AppError::Embedding(format!(
                "embedding vector size mismatch: expected {dim}, got {}",
                row.vector.len()
            )));
        }
        builder.values().append_slice(&row.vector);
        builder.append(true);
    }
    let vectors = builder.finish();

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(value_ids),
            Arc::new(source_tables),
            Arc::new(source_columns),
            Arc::new(value_texts),
            Arc::new(value_hashes),
            Arc::new(created_ats),
            Arc::new(vectors),
        ],
    )?)
}

pub(crate) async fn append_rows(
    table: &Table,
    schema: Arc<Schema>,
    rows: &[ValueRecord],
) -> AppResult<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let batch = build_record_batch(schema.clone(), rows)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
    table.add(batches).execute().await?;
    Ok(())
}

/// Drains a search stream into matches, best first.
pub(crate) async fn collect_matches(
    mut stream: SendableRecordBatchStream,
) -> AppResult<Vec<ValueMatch>> {
    let mut matches = Vec::new();

    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| AppError::Embedding(format!("value collection scan failed: {e}")))?
    {
        if batch.num_rows() == 0 {
            continue;
        }

        let values = batch
            .column_by_name(COLUMN_VALUE_TEXT)
            .and_then(|column| column.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| {
                AppError::Embedding("search result missing value_text column".to_string())
            })?;
        let distances = batch
            .column_by_name(COLUMN_DISTANCE)
            .and_then(|column| column.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| {
                AppError::Embedding("search result missing _distance column".to_string())
            })?;

        for row_idx in 0..batch.num_rows() {
            matches.push(ValueMatch {
                value: values.value(row_idx).to_string(),
                score: similarity_from_distance(distances.value(row_idx) as f64),
            });
        }
    }

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Ok(matches)
}

/// Similarity from vector distance: strictly decreasing, in (0, 1].
pub(crate) fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

pub(crate) fn compute_value_hash(value: &str) -> String {
    let hash = compute_sha256(value.as_bytes());
    hash.chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_monotone_and_bounded() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        let distances = [0.0, 0.1, 0.5, 1.0, 25.0, 1e9];
        for pair in distances.windows(2) {
            let (closer, farther) = (pair[0], pair[1]);
            assert!(similarity_from_distance(closer) > similarity_from_distance(farther));
        }
        for d in distances {
            let score = similarity_from_distance(d);
            assert!(score > 0.0 && score <= 1.0);
        }
    }

    #[test]
    fn record_batch_rejects_mismatched_vectors() {
        let schema = build_schema(4).unwrap();
        let row = ValueRecord {
            value_id: "v1".to_string(),
            source_table: "artists".to_string(),
            source_column: "name".to_string(),
            value_text: "AC/DC".to_string(),
            value_hash: compute_value_hash("AC/DC"),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            vector: vec![0.0; 3],
        };
        assert!(build_record_batch(schema, &[row]).is_err());
    }

    #[test]
    fn value_hash_is_stable_and_short() {
        let hash = compute_value_hash("AC/DC");
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, compute_value_hash("AC/DC"));
        assert_ne!(hash, compute_value_hash("ACDC"));
    }
}
