//! Runtime configuration.
//!
//! Loaded from a JSON file under the platform config directory when present,
//! otherwise built from defaults. The API key can always be supplied through
//! the environment, which takes precedence over the file.

use std::fs;
use std::path::Path;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ResultExt};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Directory holding the LanceDB value collections. Empty means
    /// "derive from the platform data dir".
    pub lancedb_path: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// Distinct values fetched per column when building a collection.
    pub value_cap: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            lancedb_path: String::new(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimensions: 768,
            value_cap: 10_000,
        }
    }
}

impl VectorConfig {
    fn apply_defaults(&mut self, data_dir: &Path) {
        if self.lancedb_path.trim().is_empty() {
            self.lancedb_path = data_dir.join("lancedb").to_string_lossy().to_string();
        }
    }
}

/// Tunable knobs for column eligibility and mention acceptance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisambiguatorConfig {
    /// A column qualifies only with strictly more distinct values than this.
    pub min_distinct_values: i64,
    /// Minimum distinct/total ratio, exclusive.
    pub min_distinct_ratio: f64,
    /// A resolved value is kept only when its score strictly exceeds this.
    pub acceptance_threshold: f64,
    /// Neighbours requested per column scan.
    pub top_k: usize,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        Self {
            min_distinct_values: 10,
            min_distinct_ratio: 0.5,
            acceptance_threshold: 0.7,
            top_k: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Repair requests allowed after the first execution, so the loop runs
    /// at most `max_retries + 1` executions.
    pub max_retries: usize,
    /// Prior attempts included in each repair prompt.
    pub history_window: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            history_window: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub disambiguator: DisambiguatorConfig,
    #[serde(default)]
    pub repair: RepairConfig,
}

fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            provider: ProviderConfig::default(),
            generation_model: default_generation_model(),
            vector: VectorConfig::default(),
            disambiguator: DisambiguatorConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config file if present, fills path defaults, then lets the
    /// environment override the API key.
    pub fn load() -> AppResult<Self> {
        let dirs = ProjectDirs::from("com", "sqlpilot", "sqlpilot")
            .ok_or_else(|| AppError::Config("no home directory available".to_string()))?;

        let mut config = Self::read_file(&dirs.config_dir().join("config.json"))?;
        config.apply_defaults(dirs.data_dir());
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).config_err("invalid config file")
    }

    fn apply_defaults(&mut self, data_dir: &Path) {
        self.vector.apply_defaults(data_dir);
    }

    fn apply_env_overrides(&mut self) {
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    self.provider.api_key = key;
                    break;
                }
            }
        }
    }

    pub fn base_url(&self) -> &str {
        self.provider
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_GEMINI_BASE_URL)
    }

    /// The configured API key, or a config error naming the expected
    /// environment variables.
    pub fn require_api_key(&self) -> AppResult<&str> {
        let key = self.provider.api_key.trim();
        if key.is_empty() {
            return Err(AppError::Config(
                "no API key configured; set GOOGLE_API_KEY or GEMINI_API_KEY".to_string(),
            ));
        }
        Ok(key)
    }
}
