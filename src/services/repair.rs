//! Bounded execute-classify-repair loop around SELECT statements.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::RepairConfig;
use crate::db::{self, DbPool, QueryOutput};
use crate::error::AppResult;
use crate::services::classifier::{classify, ErrorKind};

/// Context handed to a repairer. `error_message` and `error_kind` always
/// describe the most recent failure, never an earlier one.
pub struct RepairRequest<'a> {
    pub question: &'a str,
    pub schema: &'a str,
    pub failing_sql: &'a str,
    pub error_message: &'a str,
    pub error_kind: ErrorKind,
    pub history: &'a [SqlAttempt],
}

/// Produces a corrected statement for a failed one.
#[async_trait]
pub trait QueryRepairer: Send + Sync {
    async fn fix_query(&self, request: &RepairRequest<'_>) -> AppResult<String>;
}

/// One executed statement and what came of it. Attempts are numbered from
/// zero in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct SqlAttempt {
    pub index: usize,
    pub sql: String,
    pub outcome: AttemptOutcome,
    pub executed_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { row_count: usize },
    Failed { error: String, kind: ErrorKind },
}

/// Final verdict of a loop run, with the full ordered attempt trail.
#[derive(Debug, Serialize)]
pub struct RepairReport {
    pub outcome: RepairOutcome,
    pub attempts: Vec<SqlAttempt>,
    pub repair_calls: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    Succeeded { sql: String, output: QueryOutput },
    Exhausted { sql: String, error: String, kind: ErrorKind },
}

impl RepairReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RepairOutcome::Succeeded { .. })
    }
}

enum LoopState {
    PendingExecution {
        sql: String,
        retries_used: usize,
    },
    FailedRetryable {
        sql: String,
        error: String,
        kind: ErrorKind,
        retries_used: usize,
    },
    Succeeded {
        sql: String,
        output: QueryOutput,
    },
    FailedTerminal {
        sql: String,
        error: String,
        kind: ErrorKind,
    },
}

/// Runs statements against the database, asking the repairer for a fix
/// after each failure until the retry budget is spent.
pub struct RepairLoop {
    pool: DbPool,
    repairer: Arc<dyn QueryRepairer>,
    config: RepairConfig,
}

impl RepairLoop {
    pub fn new(pool: DbPool, repairer: Arc<dyn QueryRepairer>, config: RepairConfig) -> Self {
        Self {
            pool,
            repairer,
            config,
        }
    }

    /// Executes `initial_sql` and up to `max_retries` repaired statements.
    /// A failed repair request consumes a retry just like a failed
    /// execution does, so the loop always terminates within the budget.
    pub async fn run(
        &self,
        question: &str,
        schema: &str,
        initial_sql: String,
    ) -> AppResult<RepairReport> {
        let mut attempts: Vec<SqlAttempt> = Vec::new();
        let mut repair_calls = 0usize;
        let mut state = LoopState::PendingExecution {
            sql: initial_sql,
            retries_used: 0,
        };

        loop {
            state = match state {
                LoopState::PendingExecution { sql, retries_used } => {
                    match db::execute_select(&self.pool, &sql).await {
                        Ok(output) => {
                            attempts.push(SqlAttempt {
                                index: attempts.len(),
                                sql: sql.clone(),
                                outcome: AttemptOutcome::Succeeded {
                                    row_count: output.row_count,
                                },
                                executed_at: chrono::Utc::now().to_rfc3339(),
                            });
                            LoopState::Succeeded { sql, output }
                        }
                        Err(error) => {
                            let kind = classify(&error);
                            attempts.push(SqlAttempt {
                                index: attempts.len(),
                                sql: sql.clone(),
                                outcome: AttemptOutcome::Failed {
                                    error: error.clone(),
                                    kind,
                                },
                                executed_at: chrono::Utc::now().to_rfc3339(),
                            });
                            tracing::warn!(
                                attempt = attempts.len(),
                                kind = %kind,
                                error = %error,
                                "SQL execution failed"
                            );
                            if retries_used < self.config.max_retries {
                                LoopState::FailedRetryable {
                                    sql,
                                    error,
                                    kind,
                                    retries_used,
                                }
                            } else {
                                LoopState::FailedTerminal { sql, error, kind }
                            }
                        }
                    }
                }
                LoopState::FailedRetryable {
                    sql,
                    error,
                    kind,
                    retries_used,
                } => {
                    let window_start = attempts.len().saturating_sub(self.config.history_window);
                    let request = RepairRequest {
                        question,
                        schema,
                        failing_sql: &sql,
                        error_message: &error,
                        error_kind: kind,
                        history: &attempts[window_start..],
                    };
                    repair_calls += 1;
                    match self.repairer.fix_query(&request).await {
                        Ok(fixed) => LoopState::PendingExecution {
                            sql: fixed,
                            retries_used: retries_used + 1,
                        },
                        Err(repair_error) => {
                            tracing::warn!(error = %repair_error, "Repair request failed");
                            let consumed = retries_used + 1;
                            if consumed < self.config.max_retries {
                                LoopState::FailedRetryable {
                                    sql,
                                    error,
                                    kind,
                                    retries_used: consumed,
                                }
                            } else {
                                LoopState::FailedTerminal { sql, error, kind }
                            }
                        }
                    }
                }
                LoopState::Succeeded { sql, output } => {
                    tracing::debug!(
                        attempts = attempts.len(),
                        rows = output.row_count,
                        "Query succeeded"
                    );
                    return Ok(RepairReport {
                        outcome: RepairOutcome::Succeeded { sql, output },
                        attempts,
                        repair_calls,
                    });
                }
                LoopState::FailedTerminal { sql, error, kind } => {
                    tracing::error!(
                        attempts = attempts.len(),
                        kind = %kind,
                        "Retry budget exhausted"
                    );
                    return Ok(RepairReport {
                        outcome: RepairOutcome::Exhausted { sql, error, kind },
                        attempts,
                        repair_calls,
                    });
                }
            };
        }
    }
}
