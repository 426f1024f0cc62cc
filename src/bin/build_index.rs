//! Pre-builds the value collections for every eligible column of a
//! database, so the first interactive question pays no embedding cost.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sqlpilot::config::AppConfig;
use sqlpilot::db;
use sqlpilot::error::{AppError, AppResult};
use sqlpilot::services::{EmbeddingIndex, GeminiClient, ValueDisambiguator};

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlpilot=info")),
        )
        .init();

    let db_path = std::env::args().nth(1).map(PathBuf::from).ok_or_else(|| {
        AppError::Config("usage: build_index <database.sqlite>".to_string())
    })?;

    let config = AppConfig::load()?;
    let pool = db::init_pool(&db_path).await?;
    let client = Arc::new(GeminiClient::from_config(&config)?);
    let index = Arc::new(EmbeddingIndex::new(pool.clone(), client, &config.vector)?);
    let disambiguator = ValueDisambiguator::new(pool.clone(), index.clone(), config.disambiguator);

    let tables = db::list_tables(&pool).await?;
    let candidates = disambiguator.candidate_columns(&tables).await?;
    if candidates.is_empty() {
        println!("no eligible columns in {}", db_path.display());
        return Ok(());
    }

    for profile in &candidates {
        let rows = index.get_or_build(&profile.table, &profile.column).await?;
        println!(
            "{} ({} values, {} distinct of {} rows)",
            EmbeddingIndex::collection_key(&profile.table, &profile.column),
            rows,
            profile.distinct_count,
            profile.total_count
        );
    }

    println!("\ncollections on disk:");
    for info in index.list_collections().await? {
        println!("  {} [{} rows]", info.key, info.row_count);
    }
    Ok(())
}
