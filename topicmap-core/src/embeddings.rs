//! Embeddings — turns a topic label into a fixed-dimension vector.
//!
//! The `EmbeddingBackend` trait is the seam the session pipeline depends on;
//! `GeminiEmbeddingClient` is the production implementation. A backend either
//! returns a complete vector of the configured dimension or an error, never
//! a partial vector.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Default Gemini embedding dimensions
pub const GEMINI_DIMENSIONS: usize = 768;

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Returns the embedding dimension (e.g., 768).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Task type hint for the embedding API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    SemanticSimilarity,
    Clustering,
}

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} attempts failed, last error: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl EmbeddingError {
    /// Transport failures, rate limits and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Http(_) => true,
            EmbeddingError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Gemini embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl EmbeddingClientConfig {
    /// Builds the client config from settings, falling back to `GOOGLE_API_KEY`.
    pub fn from_settings(settings: &crate::config::EmbeddingConfig) -> Self {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: settings.model.clone(),
            dimensions: settings.dimensions as usize,
            max_retries: settings.max_retries as usize,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    model: String,
    content: GeminiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    embedding: Option<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorResponse {
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) code: u16,
    pub(crate) message: String,
}

/// Extracts `(code, message)` from a Gemini error body, falling back to the HTTP status.
pub(crate) fn parse_api_error(status: reqwest::StatusCode, body: String) -> (u16, String) {
    serde_json::from_str::<GeminiErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| (e.code, e.message))
        .unwrap_or((status.as_u16(), body))
}

// ============================================================================
// GeminiEmbeddingClient
// ============================================================================

/// Gemini embedding client — calls the Gemini Embeddings API.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: EmbeddingClientConfig,
        base_url: String,
    ) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Generate an embedding with a specific task type
    pub async fn embed_with_task(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.embed_once(text, task_type),
            |e: &EmbeddingError| e.is_retryable(),
        )
        .await;

        match result {
            Ok(vec) => Ok(vec),
            Err(e) if e.is_retryable() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts, error = %e, "All embedding attempts failed");
                Err(EmbeddingError::RetryExhausted {
                    attempts,
                    last: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn embed_once(
        &self,
        text: &str,
        task_type: TaskType,
    ) -> Result<Vec<f32>, EmbeddingError> {
        // Key travels in a header so it never shows up in a logged URL.
        let url = format!("{}/models/{}:embedContent", self.base_url, self.config.model);

        let request = GeminiRequest {
            model: format!("models/{}", self.config.model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            task_type: Some(task_type),
            output_dimensionality: Some(self.config.dimensions),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = parse_api_error(status, error_body);

            tracing::warn!(code, message = %message, "Gemini embedding API error");

            return Err(EmbeddingError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let values = gemini_response
            .embedding
            .ok_or(EmbeddingError::MissingEmbedding)?
            .values;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_task(text, TaskType::SemanticSimilarity).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> EmbeddingClientConfig {
        EmbeddingClientConfig {
            api_key: api_key.to_string(),
            model: "gemini-embedding-001".to_string(),
            dimensions: GEMINI_DIMENSIONS,
            max_retries: 2,
            retry_delay_ms: 10,
        }
    }

    fn mock_embedding_response() -> serde_json::Value {
        let values: Vec<f32> = (0..768).map(|i| (i as f32) / 768.0).collect();
        serde_json::json!({
            "embedding": {
                "values": values
            }
        })
    }

    #[tokio::test]
    async fn test_embed_calls_api_and_returns_768_dim_vector() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "model": "models/gemini-embedding-001",
                "content": { "parts": [{ "text": "Logarithms" }] },
                "taskType": "SEMANTIC_SIMILARITY",
                "outputDimensionality": 768
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .mount(&mock_server)
            .await;

        let result = client.embed("Logarithms").await;

        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert_eq!(result.unwrap().len(), 768, "Expected 768 dimensions");
    }

    #[tokio::test]
    async fn test_api_key_sent_as_header_not_query() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(header("x-goog-api-key", "test-api-key"))
            .and(query_param_is_missing("key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(client.embed("Logarithms").await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        // Nothing listens on port 1.
        let client = GeminiEmbeddingClient::with_base_url(
            test_config("test-api-key"),
            "http://127.0.0.1:1".to_string(),
        )
        .expect("Failed to create client");

        let err = client.embed("Logarithms").await.unwrap_err();

        assert!(matches!(err, EmbeddingError::RetryExhausted { .. }), "got {:?}", err);
        assert!(!err.to_string().contains("test-api-key"), "key leaked: {}", err);
        assert!(!format!("{:?}", err).contains("test-api-key"), "key leaked: {:?}", err);
    }

    #[tokio::test]
    async fn test_embed_returns_retry_exhausted_on_persistent_500() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "Internal server error" }
            })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let result = client.embed("hello world").await;

        match result {
            Err(EmbeddingError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3, "One call plus two retries");
                assert!(last.contains("Internal server error"));
            }
            other => panic!("Expected RetryExhausted error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Rate limit exceeded" }
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .mount(&mock_server)
            .await;

        let result = client.embed("hello world").await;

        assert!(result.is_ok(), "Expected success after retry");
        assert_eq!(result.unwrap().len(), 768);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("bad-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": { "code": 403, "message": "API key not valid" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client.embed("hello").await;

        match result {
            Err(EmbeddingError::Api { code, message }) => {
                assert_eq!(code, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_fails_with_missing_api_key() {
        let result = GeminiEmbeddingClient::new(test_config(""));

        match result {
            Err(EmbeddingError::MissingApiKey) => {}
            _ => panic!("Expected MissingApiKey error"),
        }
    }

    #[tokio::test]
    async fn test_embed_returns_error_on_wrong_dimensions() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.1, 0.2, 0.3] }
            })))
            .mount(&mock_server)
            .await;

        let result = client.embed("hello world").await;

        match result {
            Err(EmbeddingError::InvalidDimensions { expected, actual }) => {
                assert_eq!(expected, 768);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected InvalidDimensions error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_embedding_field_is_error() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        let result = client.embed("hello").await;

        assert!(matches!(result, Err(EmbeddingError::MissingEmbedding)));
    }

    #[test]
    fn test_backend_metadata() {
        let backend: Box<dyn EmbeddingBackend> = Box::new(
            GeminiEmbeddingClient::with_base_url(test_config("k"), "http://localhost".to_string()).unwrap(),
        );
        assert_eq!(backend.dimensions(), 768);
        assert_eq!(backend.name(), "gemini");
    }

    #[test]
    fn test_settings_api_key_takes_precedence() {
        let settings = crate::config::EmbeddingConfig {
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        let config = EmbeddingClientConfig::from_settings(&settings);
        assert_eq!(config.api_key, "from-config");
        assert_eq!(config.dimensions, 768);
    }
}
