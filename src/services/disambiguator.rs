//! Resolves fuzzy value mentions against high-cardinality text columns.
//!
//! A question like "songs by ACDC" only works as SQL once "ACDC" becomes
//! the stored spelling "AC/DC". The disambiguator profiles the selected
//! tables for columns worth searching, scans each pair's vector collection
//! and keeps the single best match across all of them.

use std::sync::Arc;

use serde::Serialize;

use crate::config::DisambiguatorConfig;
use crate::db::{self, ColumnProfile, DbPool};
use crate::error::AppResult;
use crate::services::embedding::EmbeddingIndex;

/// A mention mapped to the exact value stored in the database.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedValue {
    pub mention: String,
    pub table: String,
    pub column: String,
    pub value: String,
    pub score: f64,
}

pub struct ValueDisambiguator {
    pool: DbPool,
    index: Arc<EmbeddingIndex>,
    config: DisambiguatorConfig,
}

impl ValueDisambiguator {
    pub fn new(pool: DbPool, index: Arc<EmbeddingIndex>, config: DisambiguatorConfig) -> Self {
        Self {
            pool,
            index,
            config,
        }
    }

    /// Profiles every column of the given tables and keeps the eligible
    /// ones. A table that fails introspection is skipped, as is a column
    /// that fails profiling; one bad object never sinks the scan.
    pub async fn candidate_columns(&self, tables: &[String]) -> AppResult<Vec<ColumnProfile>> {
        let mut candidates = Vec::new();
        for table in tables {
            let schema = match db::table_schema(&self.pool, table).await {
                Ok(schema) => schema,
                Err(error) => {
                    tracing::warn!(table = %table, error = %error, "Skipping table in candidate scan");
                    continue;
                }
            };
            for column in &schema.columns {
                if !db::is_textual(&column.declared_type) {
                    continue;
                }
                let profile = match db::profile_column(
                    &self.pool,
                    table,
                    &column.name,
                    &column.declared_type,
                )
                .await
                {
                    Ok(profile) => profile,
                    Err(error) => {
                        tracing::warn!(
                            table = %table,
                            column = %column.name,
                            error = %error,
                            "Skipping column in candidate scan"
                        );
                        continue;
                    }
                };
                if profile.is_eligible(&self.config) {
                    candidates.push(profile);
                }
            }
        }
        tracing::debug!(count = candidates.len(), "Collected disambiguation candidates");
        Ok(candidates)
    }

    /// Finds the best stored value for one mention across every candidate
    /// column. Every pair is scanned before deciding; ties keep the
    /// earlier candidate. A pair whose search fails counts as no match.
    /// Returns `None` only when no pair produced any match; judging the
    /// winner against the acceptance threshold is the caller's job.
    pub async fn resolve(
        &self,
        mention: &str,
        candidates: &[ColumnProfile],
    ) -> Option<ResolvedValue> {
        let mut best: Option<ResolvedValue> = None;
        for profile in candidates {
            let matches = match self
                .index
                .search(&profile.table, &profile.column, mention, self.config.top_k)
                .await
            {
                Ok(matches) => matches,
                Err(error) => {
                    tracing::warn!(
                        table = %profile.table,
                        column = %profile.column,
                        error = %error,
                        "Value search failed, treating as no match"
                    );
                    continue;
                }
            };
            for candidate in matches {
                if best.as_ref().map_or(true, |held| candidate.score > held.score) {
                    best = Some(ResolvedValue {
                        mention: mention.to_string(),
                        table: profile.table.clone(),
                        column: profile.column.clone(),
                        value: candidate.value,
                        score: candidate.score,
                    });
                }
            }
        }

        best
    }

    /// Resolves each mention against the selected tables, keeping only the
    /// matches whose score strictly clears the acceptance threshold. An
    /// empty mention list returns immediately, before any profiling or
    /// embedding.
    pub async fn resolve_all(
        &self,
        mentions: &[String],
        tables: &[String],
    ) -> AppResult<Vec<ResolvedValue>> {
        if mentions.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.candidate_columns(tables).await?;
        if candidates.is_empty() {
            tracing::debug!("No disambiguation candidates among selected tables");
            return Ok(Vec::new());
        }

        let mut resolved = Vec::new();
        for mention in mentions {
            if mention.trim().is_empty() {
                continue;
            }
            match self.resolve(mention, &candidates).await {
                Some(winner) if winner.score > self.config.acceptance_threshold => {
                    tracing::info!(
                        mention = %winner.mention,
                        value = %winner.value,
                        table = %winner.table,
                        column = %winner.column,
                        score = winner.score,
                        "Resolved value mention"
                    );
                    resolved.push(winner);
                }
                Some(winner) => {
                    tracing::debug!(
                        mention = %winner.mention,
                        value = %winner.value,
                        score = winner.score,
                        "Best match below acceptance threshold"
                    );
                }
                None => {}
            }
        }
        Ok(resolved)
    }
}
