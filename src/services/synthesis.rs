//! Prompt construction and the LLM-backed pipeline steps: intent parsing,
//! table selection, SQL synthesis and query repair.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ResultExt};
use crate::services::disambiguator::ResolvedValue;
use crate::services::llm::LanguageModel;
use crate::services::repair::{AttemptOutcome, QueryRepairer, RepairRequest};
use crate::utils::strip_sql_markdown;

use async_trait::async_trait;

/// What the user wants, plus every literal value mention worth resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Asks the model for the question's intent and its value mentions as
/// structured JSON.
pub async fn parse_intent(llm: &dyn LanguageModel, question: &str) -> AppResult<QueryIntent> {
    let prompt = format!(
        "Analyze this question about a SQL database.\n\
         Question: {question}\n\n\
         Extract:\n\
         - intent: one short sentence stating what the user wants\n\
         - entities: every literal value mentioned that could be stored as data \
         (names, titles, cities, genres). Do not include table or column names."
    );
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "intent": { "type": "string" },
            "entities": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["intent", "entities"]
    });

    let raw = llm.generate_json(&prompt, schema).await?;
    let parsed: QueryIntent =
        serde_json::from_str(raw.trim()).llm_err("intent response was not valid JSON")?;
    tracing::debug!(intent = %parsed.intent, entities = parsed.entities.len(), "Parsed question intent");
    Ok(parsed)
}

/// Picks the tables relevant to the question. The model answers one name
/// per line; anything that is not a real table is dropped, and an empty
/// selection falls back to every table.
pub async fn select_tables(
    llm: &dyn LanguageModel,
    question: &str,
    intent: &QueryIntent,
    all_tables: &[String],
) -> AppResult<Vec<String>> {
    let prompt = format!(
        "Database tables: {}\n\n\
         Question: {}\n\
         Intent: {}\n\n\
         Which tables are needed to answer this question? \
         Respond with only the table names, one per line.",
        all_tables.join(", "),
        question,
        intent.intent
    );
    let raw = llm.generate(&prompt).await?;

    let mut selected = Vec::new();
    for line in raw.lines() {
        let name = line.trim().trim_matches('`');
        if name.is_empty() {
            continue;
        }
        let canonical = all_tables.iter().find(|t| t.eq_ignore_ascii_case(name));
        match canonical {
            Some(table) if !selected.contains(table) => selected.push(table.clone()),
            Some(_) => {}
            None => tracing::debug!(name = %name, "Dropping hallucinated table from selection"),
        }
    }

    if selected.is_empty() {
        tracing::debug!("Table selection came back empty, using all tables");
        return Ok(all_tables.to_vec());
    }
    Ok(selected)
}

/// Builds the synthesis prompt and returns the model's SELECT statement
/// with any markdown fences removed.
pub async fn synthesize_sql(
    llm: &dyn LanguageModel,
    question: &str,
    intent: &QueryIntent,
    schema_text: &str,
    hints: &[ResolvedValue],
) -> AppResult<String> {
    let mut prompt = format!(
        "You translate questions into SQLite SQL.\n\
         Schema:{schema_text}\n\n\
         Question: {question}\n\
         Intent: {}\n",
        intent.intent
    );
    if !hints.is_empty() {
        prompt.push_str("\nExact stored values (use these verbatim in comparisons):\n");
        prompt.push_str(&value_hints(hints));
    }
    prompt.push_str(
        "\nRespond with a single SQLite SELECT statement and nothing else. \
         No explanations, no markdown.",
    );

    let raw = llm.generate(&prompt).await?;
    let sql = strip_sql_markdown(&raw);
    if sql.is_empty() {
        return Err(AppError::Llm("model returned no SQL".to_string()));
    }
    tracing::debug!(sql = %sql, "Synthesized SQL");
    Ok(sql)
}

fn value_hints(hints: &[ResolvedValue]) -> String {
    let mut text = String::new();
    for hint in hints {
        let _ = writeln!(
            text,
            "- the user said '{}'; the stored value in {}.{} is '{}'",
            hint.mention, hint.table, hint.column, hint.value
        );
    }
    text
}

/// Repairs failed statements by prompting the model with the current error
/// and the recent attempt history.
pub struct LlmRepairer {
    llm: Arc<dyn LanguageModel>,
}

impl LlmRepairer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryRepairer for LlmRepairer {
    async fn fix_query(&self, request: &RepairRequest<'_>) -> AppResult<String> {
        let prompt = repair_prompt(request);
        let raw = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| AppError::Repair(e.to_string()))?;
        let sql = strip_sql_markdown(&raw);
        if sql.is_empty() {
            return Err(AppError::Repair("model returned no SQL".to_string()));
        }
        Ok(sql)
    }
}

fn repair_prompt(request: &RepairRequest<'_>) -> String {
    let mut prompt = format!(
        "This SQLite query failed and must be fixed.\n\
         Question: {}\n\
         Schema:{}\n\n\
         Failing SQL: {}\n\
         Error ({}): {}\n",
        request.question,
        request.schema,
        request.failing_sql,
        request.error_kind,
        request.error_message
    );
    if !request.history.is_empty() {
        prompt.push_str("\nRecent attempts:\n");
        for attempt in request.history {
            let ordinal = attempt.index + 1;
            match &attempt.outcome {
                AttemptOutcome::Failed { error, .. } => {
                    let _ = writeln!(prompt, "{}. {} -> {}", ordinal, attempt.sql, error);
                }
                AttemptOutcome::Succeeded { row_count } => {
                    let _ = writeln!(
                        prompt,
                        "{}. {} -> {} rows",
                        ordinal, attempt.sql, row_count
                    );
                }
            }
        }
    }
    prompt.push_str(
        "\nRespond with a single corrected SQLite SELECT statement and nothing else. \
         No explanations, no markdown.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier::ErrorKind;
    use crate::services::testing::ScriptedModel;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn intent_parsing_reads_the_structured_reply() {
        let model = ScriptedModel::new(&[
            r#"{"intent": "count tracks by an artist", "entities": ["ACDC"]}"#,
        ]);
        let intent = parse_intent(&model, "how many songs does ACDC have?")
            .await
            .unwrap();
        assert_eq!(intent.intent, "count tracks by an artist");
        assert_eq!(intent.entities, vec!["ACDC"]);
    }

    #[tokio::test]
    async fn malformed_intent_json_is_an_llm_error() {
        let model = ScriptedModel::new(&["not json at all"]);
        let result = parse_intent(&model, "anything").await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn table_selection_drops_unknown_names_and_dedupes() {
        let model = ScriptedModel::new(&["artists\nArtists\ninvoices\nunicorns\n"]);
        let intent = QueryIntent {
            intent: "x".to_string(),
            entities: vec![],
        };
        let selected = select_tables(
            &model,
            "q",
            &intent,
            &tables(&["artists", "albums", "invoices"]),
        )
        .await
        .unwrap();
        assert_eq!(selected, tables(&["artists", "invoices"]));
    }

    #[tokio::test]
    async fn empty_table_selection_falls_back_to_all_tables() {
        let model = ScriptedModel::new(&["\n\n"]);
        let intent = QueryIntent {
            intent: "x".to_string(),
            entities: vec![],
        };
        let selected = select_tables(&model, "q", &intent, &tables(&["artists", "albums"]))
            .await
            .unwrap();
        assert_eq!(selected, tables(&["artists", "albums"]));
    }

    #[tokio::test]
    async fn synthesis_strips_fences_and_injects_value_hints() {
        let model = ScriptedModel::new(&["```sql\nSELECT * FROM artists\n```"]);
        let intent = QueryIntent {
            intent: "list artists".to_string(),
            entities: vec!["ACDC".to_string()],
        };
        let hints = vec![ResolvedValue {
            mention: "ACDC".to_string(),
            table: "artists".to_string(),
            column: "name".to_string(),
            value: "AC/DC".to_string(),
            score: 0.93,
        }];

        let sql = synthesize_sql(&model, "songs by ACDC", &intent, "\nTable: artists", &hints)
            .await
            .unwrap();

        assert_eq!(sql, "SELECT * FROM artists");
        let prompts = model.prompts();
        assert!(prompts[0].contains("the stored value in artists.name is 'AC/DC'"));
    }

    #[tokio::test]
    async fn repairer_prompt_carries_the_current_error_and_history() {
        let model = Arc::new(ScriptedModel::new(&["SELECT name FROM artists"]));
        let repairer = LlmRepairer::new(model.clone());
        let history = vec![crate::services::repair::SqlAttempt {
            index: 0,
            sql: "SELEC name FROM artists".to_string(),
            outcome: AttemptOutcome::Failed {
                error: "near \"SELEC\": syntax error".to_string(),
                kind: ErrorKind::Syntax,
            },
            executed_at: "2026-01-01T00:00:00Z".to_string(),
        }];
        let request = RepairRequest {
            question: "list artists",
            schema: "\nTable: artists",
            failing_sql: "SELEC name FROM artists",
            error_message: "near \"SELEC\": syntax error",
            error_kind: ErrorKind::Syntax,
            history: &history,
        };

        let fixed = repairer.fix_query(&request).await.unwrap();
        assert_eq!(fixed, "SELECT name FROM artists");

        let prompts = model.prompts();
        assert!(prompts[0].contains("Error (syntax): near \"SELEC\": syntax error"));
        assert!(prompts[0].contains("1. SELEC name FROM artists ->"));
    }

    #[tokio::test]
    async fn blank_repair_output_is_a_repair_error() {
        let model = Arc::new(ScriptedModel::new(&["```sql\n```"]));
        let repairer = LlmRepairer::new(model);
        let request = RepairRequest {
            question: "q",
            schema: "",
            failing_sql: "SELECT 1",
            error_message: "x",
            error_kind: ErrorKind::Other,
            history: &[],
        };
        let result = repairer.fix_query(&request).await;
        assert!(matches!(result, Err(AppError::Repair(_))));
    }
}
