//! Shared test doubles for the service layer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::llm::{EmbeddingBackend, LanguageModel};

/// Embedding backend with preset vectors. Text without a preset gets a
/// fixed far-away default, so tests control every distance that matters.
pub(crate) struct StaticBackend {
    vectors: HashMap<String, Vec<f32>>,
    fail_queries: bool,
    batch: AtomicUsize,
    single: AtomicUsize,
}

impl StaticBackend {
    pub(crate) fn new(entries: &[(&str, [f32; 4])]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.to_vec()))
                .collect(),
            fail_queries: false,
            batch: AtomicUsize::new(0),
            single: AtomicUsize::new(0),
        }
    }

    /// Variant whose single-text lookups fail, for exercising the
    /// treat-as-no-match paths.
    pub(crate) fn failing_queries(entries: &[(&str, [f32; 4])]) -> Self {
        Self {
            fail_queries: true,
            ..Self::new(entries)
        }
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch.load(Ordering::SeqCst)
    }

    pub(crate) fn single_calls(&self) -> usize {
        self.single.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0, 0.0, 1.0])
    }
}

#[async_trait]
impl EmbeddingBackend for StaticBackend {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.batch.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        self.single.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(AppError::Embedding("embedding service offline".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// Language model that replays canned replies in order and records every
/// prompt it was given.
pub(crate) struct ScriptedModel {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| AppError::Llm("scripted model ran out of replies".to_string()))
    }

    async fn generate_json(&self, prompt: &str, _schema: serde_json::Value) -> AppResult<String> {
        self.generate(prompt).await
    }
}

/// File-backed SQLite database seeded with the given statements.
pub(crate) async fn seed_pool<S: AsRef<str>>(path: &Path, statements: &[S]) -> DbPool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in statements {
        sqlx::query(statement.as_ref()).execute(&pool).await.unwrap();
    }
    pool
}
