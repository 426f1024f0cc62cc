//! Gemini REST client and the model seams it implements.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult, ResultExt};

/// Text generation seam. The pipeline depends on this, not on a concrete
/// HTTP client.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;
    /// Structured output: the model must answer with JSON matching `schema`.
    async fn generate_json(&self, prompt: &str, schema: serde_json::Value) -> AppResult<String>;
}

/// Embedding seam used by the value index. Batch results come back in input
/// order, one vector per input.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;
    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// batchEmbedContents refuses more inputs than this per call.
const EMBED_BATCH_LIMIT: usize = 100;

const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl GeminiClient {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .config_err("http client init failed")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            generation_model: config.generation_model.clone(),
            embedding_model: config.vector.embedding_model.clone(),
            embedding_dimensions: config.vector.embedding_dimensions,
        })
    }

    async fn generate_content(
        &self,
        prompt: &str,
        generation_config: GeminiGenerationConfig,
    ) -> AppResult<String> {
        let request = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config,
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.generation_model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .llm_err("gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "gemini request failed: {status} {body}"
            )));
        }

        let response: GeminiGenerateResponse =
            response.json().await.llm_err("gemini response invalid")?;
        let output = extract_text(response);
        if output.trim().is_empty() {
            return Err(AppError::Llm("gemini response missing text".to_string()));
        }
        Ok(output)
    }

    async fn embed_chunk(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let model = format!("models/{}", self.embedding_model);
        let request = GeminiBatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| GeminiEmbedRequest {
                    model: model.clone(),
                    content: GeminiEmbedContent {
                        parts: vec![GeminiPart { text: text.clone() }],
                    },
                })
                .collect(),
        };

        let url = format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url, self.embedding_model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .embedding_err("gemini embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "gemini embed request failed: {status} {body}"
            )));
        }

        let response: GeminiBatchEmbedResponse = response
            .json()
            .await
            .embedding_err("gemini embed response invalid")?;

        if response.embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        let mut vectors = Vec::with_capacity(response.embeddings.len());
        for embedding in response.embeddings {
            self.check_dimensions(&embedding.values)?;
            vectors.push(embedding.values);
        }
        Ok(vectors)
    }

    fn check_dimensions(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.embedding_dimensions {
            return Err(AppError::Embedding(format!(
                "embedding dimension mismatch: expected {}, received {}",
                self.embedding_dimensions,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.generate_content(prompt, GeminiGenerationConfig::deterministic())
            .await
    }

    async fn generate_json(&self, prompt: &str, schema: serde_json::Value) -> AppResult<String> {
        let mut config = GeminiGenerationConfig::deterministic();
        config.response_mime_type = Some("application/json".to_string());
        config.response_json_schema = Some(schema);
        self.generate_content(prompt, config).await
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiClient {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBED_BATCH_LIMIT) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let request = GeminiEmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: GeminiEmbedContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.embedding_model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .embedding_err("gemini embed request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "gemini embed request failed: {status} {body}"
            )));
        }

        let response: GeminiEmbedResponse = response
            .json()
            .await
            .embedding_err("gemini embed response invalid")?;
        self.check_dimensions(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

fn extract_text(response: GeminiGenerateResponse) -> String {
    let mut output = String::new();
    if let Some(candidate) = response.candidates.and_then(|list| list.into_iter().next()) {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    output.push_str(&text);
                }
            }
        }
    }
    output
}

#[derive(Serialize)]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(rename = "responseJsonSchema", skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<serde_json::Value>,
}

impl GeminiGenerationConfig {
    /// Temperature zero keeps repeated runs over the same prompt aligned.
    fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            response_mime_type: None,
            response_json_schema: None,
        }
    }
}

#[derive(Deserialize)]
struct GeminiGenerateResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct GeminiBatchEmbedRequest {
    requests: Vec<GeminiEmbedRequest>,
}

#[derive(Serialize)]
struct GeminiEmbedRequest {
    model: String,
    content: GeminiEmbedContent,
}

#[derive(Serialize)]
struct GeminiEmbedContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiBatchEmbedResponse {
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_is_concatenated_across_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "parts": [{"text": "SELECT "}, {"text": "1"}]
                }
            }]
        }"#;
        let response: GeminiGenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(response), "SELECT 1");
    }

    #[test]
    fn missing_candidates_extract_to_empty() {
        let response: GeminiGenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_text(response), "");
    }
}
