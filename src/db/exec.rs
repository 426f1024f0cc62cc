//! Read-only query execution.
//!
//! Success and failure are separated structurally: `Ok` carries a typed
//! result set, `Err` carries the database's own message verbatim because
//! that text is what the error classifier consumes. Nothing downstream
//! should ever have to sniff a payload string to learn whether a query
//! worked.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::DbPool;

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// Empty when the result set has zero rows.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
}

/// Runs a query and renders every cell as text.
pub async fn execute_select(pool: &DbPool, sql: &str) -> Result<QueryOutput, String> {
    let fetched = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(raw_message)?;

    let columns = fetched
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut rows = Vec::with_capacity(fetched.len());
    for row in &fetched {
        let mut rendered = Vec::with_capacity(row.columns().len());
        for index in 0..row.columns().len() {
            rendered.push(render_value(row, index).map_err(raw_message)?);
        }
        rows.push(rendered);
    }

    let row_count = rows.len();
    Ok(QueryOutput {
        columns,
        rows,
        row_count,
    })
}

/// Compiles the statement with EXPLAIN without running it.
pub async fn validate(pool: &DbPool, sql: &str) -> Result<(), String> {
    sqlx::query(&format!("EXPLAIN {}", sql))
        .fetch_all(pool)
        .await
        .map(|_| ())
        .map_err(raw_message)
}

/// Renders one cell by its runtime storage class. NULL renders as `NULL`.
pub(crate) fn render_value(row: &SqliteRow, index: usize) -> Result<String, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok("NULL".to_string());
    }

    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Ok(row.try_get::<i64, _>(index)?.to_string()),
        "REAL" => Ok(row.try_get::<f64, _>(index)?.to_string()),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Ok(format!("<blob {} bytes>", bytes.len()))
        }
        _ => row.try_get::<String, _>(index),
    }
}

/// Unwraps a sqlx error to the underlying database message when there is
/// one, e.g. `no such table: Artists`.
fn raw_message(e: sqlx::Error) -> String {
    match e.as_database_error() {
        Some(db_err) => db_err.message().to_string(),
        None => e.to_string(),
    }
}
