//! Column cardinality profiling.

use serde::Serialize;

use super::DbPool;
use crate::config::DisambiguatorConfig;
use crate::utils::quote_ident;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub table: String,
    pub column: String,
    pub declared_type: String,
    pub distinct_count: i64,
    pub total_count: i64,
}

impl ColumnProfile {
    /// Share of rows carrying a distinct value. Total for empty tables.
    pub fn distinct_ratio(&self) -> f64 {
        self.distinct_count as f64 / self.total_count.max(1) as f64
    }

    /// A column is worth indexing when it is textual, has strictly more
    /// distinct values than the floor, and those values are mostly unique.
    /// Ten distinct values is not enough; eleven is.
    pub fn is_eligible(&self, config: &DisambiguatorConfig) -> bool {
        is_textual(&self.declared_type)
            && self.distinct_count > config.min_distinct_values
            && self.distinct_ratio() > config.min_distinct_ratio
    }
}

/// Declared-type check covering TEXT, CHAR, VARCHAR, NVARCHAR and CLOB.
pub fn is_textual(declared_type: &str) -> bool {
    let upper = declared_type.to_uppercase();
    upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB")
}

pub async fn profile_column(
    pool: &DbPool,
    table: &str,
    column: &str,
    declared_type: &str,
) -> Result<ColumnProfile, sqlx::Error> {
    let distinct_count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT {}) FROM {}",
        quote_ident(column),
        quote_ident(table)
    ))
    .fetch_one(pool)
    .await?;

    let total_count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(pool)
            .await?;

    Ok(ColumnProfile {
        table: table.to_string(),
        column: column.to_string(),
        declared_type: declared_type.to_string(),
        distinct_count,
        total_count,
    })
}
