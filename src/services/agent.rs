//! End-to-end pipeline from a natural-language question to executed SQL.
//!
//! The stages run in a fixed order: parse intent, select tables, resolve
//! value mentions, synthesize SQL, then hand execution to the repair loop.
//! Each stage leaves a line in the step trace so the final report shows
//! how the answer came about.

use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::services::disambiguator::{ResolvedValue, ValueDisambiguator};
use crate::services::embedding::EmbeddingIndex;
use crate::services::llm::LanguageModel;
use crate::services::repair::{RepairLoop, RepairReport};
use crate::services::synthesis::{self, LlmRepairer, QueryIntent};

/// Everything produced while answering one question.
#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub question: String,
    pub intent: QueryIntent,
    pub tables: Vec<String>,
    pub resolved_values: Vec<ResolvedValue>,
    pub report: RepairReport,
    pub steps: Vec<String>,
}

pub struct SqlAgent {
    pool: DbPool,
    llm: Arc<dyn LanguageModel>,
    disambiguator: ValueDisambiguator,
    repair: RepairLoop,
}

impl SqlAgent {
    pub fn new(
        pool: DbPool,
        llm: Arc<dyn LanguageModel>,
        index: Arc<EmbeddingIndex>,
        config: &AppConfig,
    ) -> Self {
        let disambiguator = ValueDisambiguator::new(pool.clone(), index, config.disambiguator);
        let repairer = Arc::new(LlmRepairer::new(llm.clone()));
        let repair = RepairLoop::new(pool.clone(), repairer, config.repair);
        Self {
            pool,
            llm,
            disambiguator,
            repair,
        }
    }

    pub async fn answer(&self, question: &str) -> AppResult<QueryReport> {
        let mut steps = Vec::new();
        tracing::info!(question = %question, "Answering question");

        let all_tables = db::list_tables(&self.pool).await?;
        if all_tables.is_empty() {
            return Err(AppError::Config("database contains no tables".to_string()));
        }

        let intent = synthesis::parse_intent(self.llm.as_ref(), question).await?;
        steps.push(format!("intent: {}", intent.intent));
        if !intent.entities.is_empty() {
            steps.push(format!("entities: {}", intent.entities.join(", ")));
        }

        let tables =
            synthesis::select_tables(self.llm.as_ref(), question, &intent, &all_tables).await?;
        steps.push(format!("tables: {}", tables.join(", ")));

        let schemas = db::load_schemas(&self.pool, &tables).await?;
        let schema_text = db::format_schemas(&schemas);

        let resolved_values = self
            .disambiguator
            .resolve_all(&intent.entities, &tables)
            .await?;
        for value in &resolved_values {
            steps.push(format!(
                "resolved '{}' to '{}' ({}.{}, score {:.3})",
                value.mention, value.value, value.table, value.column, value.score
            ));
        }

        let sql = synthesis::synthesize_sql(
            self.llm.as_ref(),
            question,
            &intent,
            &schema_text,
            &resolved_values,
        )
        .await?;
        steps.push(format!("sql: {}", sql));

        match db::validate(&self.pool, &sql).await {
            Ok(()) => steps.push("validation: ok".to_string()),
            Err(error) => {
                tracing::warn!(error = %error, "Statement failed validation, executing anyway");
                steps.push(format!("validation: {}", error));
            }
        }

        let report = self.repair.run(question, &schema_text, sql).await?;
        steps.push(format!(
            "attempts: {}, repair calls: {}",
            report.attempts.len(),
            report.repair_calls
        ));

        Ok(QueryReport {
            question: question.to_string(),
            intent,
            tables,
            resolved_values,
            report,
            steps,
        })
    }
}
