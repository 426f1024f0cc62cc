//! Distinct value extraction for collection builds.

use super::exec::render_value;
use super::DbPool;
use crate::utils::quote_ident;

/// Fetches distinct non-NULL values of one column, capped. Values are
/// rendered as text regardless of storage class so the embedding input is
/// exactly what a query result would show.
pub async fn distinct_values(
    pool: &DbPool,
    table: &str,
    column: &str,
    cap: usize,
) -> Result<Vec<String>, sqlx::Error> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL LIMIT {cap}",
        col = quote_ident(column),
        table = quote_ident(table),
        cap = cap
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        values.push(render_value(row, 0)?);
    }
    Ok(values)
}
