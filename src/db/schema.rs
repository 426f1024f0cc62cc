//! Schema introspection over the target database.

use serde::Serialize;
use sqlx::Row;

use super::DbPool;
use crate::error::{AppError, AppResult};
use crate::utils::quote_ident;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyInfo {
    pub from_column: String,
    pub references_table: String,
    /// SQLite leaves this empty when the key targets an implicit primary key.
    pub references_column: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Lists user tables, skipping SQLite internals.
pub async fn list_tables(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Introspects one table. PRAGMA cannot bind identifiers, so the name is
/// quoted and interpolated. An unknown table yields zero PRAGMA rows and is
/// reported as an introspection error, not an empty schema.
pub async fn table_schema(pool: &DbPool, table: &str) -> AppResult<TableSchema> {
    match read_table_schema(pool, table).await {
        Ok(Some(schema)) => Ok(schema),
        Ok(None) => Err(AppError::Introspection {
            table: table.to_string(),
            detail: "no such table".to_string(),
        }),
        Err(e) => Err(AppError::Introspection {
            table: table.to_string(),
            detail: e.to_string(),
        }),
    }
}

async fn read_table_schema(pool: &DbPool, table: &str) -> Result<Option<TableSchema>, sqlx::Error> {
    let pragma = format!("PRAGMA table_info({})", quote_ident(table));
    let rows = sqlx::query(&pragma).fetch_all(pool).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(ColumnInfo {
            name: row.try_get("name")?,
            declared_type: row.try_get("type")?,
        });
    }

    let pragma = format!("PRAGMA foreign_key_list({})", quote_ident(table));
    let rows = sqlx::query(&pragma).fetch_all(pool).await?;
    let mut foreign_keys = Vec::with_capacity(rows.len());
    for row in &rows {
        foreign_keys.push(ForeignKeyInfo {
            from_column: row.try_get("from")?,
            references_table: row.try_get("table")?,
            references_column: row.try_get("to")?,
        });
    }

    Ok(Some(TableSchema {
        name: table.to_string(),
        columns,
        foreign_keys,
    }))
}

/// Introspects the named tables, skipping any table that fails rather than
/// aborting the batch.
pub async fn load_schemas(pool: &DbPool, tables: &[String]) -> AppResult<Vec<TableSchema>> {
    let mut schemas = Vec::new();
    for table in tables {
        match table_schema(pool, table).await {
            Ok(schema) => schemas.push(schema),
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Skipping table during introspection")
            }
        }
    }
    Ok(schemas)
}

/// Renders schemas the way the synthesis prompts expect them.
pub fn format_schemas(schemas: &[TableSchema]) -> String {
    let mut lines = Vec::new();
    for schema in schemas {
        lines.push(format!("\nTable: {}", schema.name));
        let columns = schema
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.declared_type))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("  Columns: {}", columns));
        if !schema.foreign_keys.is_empty() {
            let fks = schema
                .foreign_keys
                .iter()
                .map(|fk| match &fk.references_column {
                    Some(to) => {
                        format!("{} -> {}({})", fk.from_column, fk.references_table, to)
                    }
                    None => format!("{} -> {}", fk.from_column, fk.references_table),
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("  Foreign Keys: {}", fks));
        }
    }
    lines.join("\n")
}
