//! Topic extraction — distils a session transcript into a short label.
//!
//! Label contract: 2–5 words, no wrapping quotes, no trailing punctuation,
//! in the user's language. When nothing substantive has been discussed yet
//! the extractor answers with the undetermined-topic sentinel instead of
//! inventing a topic. `normalize_label` enforces the mechanical parts of the
//! contract on whatever the model returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::embeddings::{parse_api_error, GEMINI_BASE_URL};
use crate::models::SessionTranscript;

/// Label returned when no topic is discernible yet.
pub const UNDETERMINED_LABEL: &str = "Undetermined subject";

const MAX_LABEL_WORDS: usize = 5;

#[async_trait]
pub trait TopicExtractor: Send + Sync {
    /// Returns a normalized topic label for the transcript.
    async fn extract_label(&self, transcript: &SessionTranscript) -> Result<String, ExtractionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Transcript has no content")]
    EmptyTranscript,

    #[error("Model returned an empty label")]
    EmptyLabel,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} attempts failed, last error: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Http(_) => true,
            ExtractionError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Trims, strips wrapping quotes and trailing punctuation, and collapses whitespace.
pub fn normalize_label(raw: &str) -> Result<String, ExtractionError> {
    const QUOTES: &[char] = &['"', '\'', '`', '“', '”', '‘', '’', '«', '»', '*'];
    const TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', '…', '。'];

    // Models sometimes add a second line of commentary.
    let first_line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

    let mut label = first_line;
    loop {
        let trimmed = label
            .trim()
            .trim_matches(QUOTES)
            .trim_end_matches(TRAILING)
            .trim();
        if trimmed == label {
            break;
        }
        label = trimmed;
    }

    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    if label.is_empty() {
        return Err(ExtractionError::EmptyLabel);
    }

    let words = label.split(' ').count();
    if words > MAX_LABEL_WORDS {
        tracing::debug!(words, label = %label, "Topic label longer than expected");
    }

    Ok(label)
}

/// Case-insensitive comparison against the configured sentinel. Both sides go
/// through `normalize_label`, so `"Undetermined subject."` in the config still
/// matches the normalized model reply.
pub fn is_undetermined(label: &str, sentinel: &str) -> bool {
    let canonical = |s: &str| {
        normalize_label(s)
            .unwrap_or_else(|_| s.trim().to_string())
            .to_lowercase()
    };
    canonical(label) == canonical(sentinel)
}

// ============================================================================
// Gemini generateContent client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExtractorClientConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub undetermined_label: String,
}

impl ExtractorClientConfig {
    pub fn from_settings(settings: &crate::config::ExtractionConfig) -> Self {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: settings.model.clone(),
            max_retries: settings.max_retries as usize,
            retry_delay_ms: settings.retry_delay_ms,
            undetermined_label: settings.undetermined_label.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Clone)]
pub struct GeminiTopicExtractor {
    client: Client,
    config: ExtractorClientConfig,
    base_url: String,
}

impl GeminiTopicExtractor {
    pub fn new(config: ExtractorClientConfig) -> Result<Self, ExtractionError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: ExtractorClientConfig, base_url: String) -> Result<Self, ExtractionError> {
        if config.api_key.is_empty() {
            return Err(ExtractionError::MissingApiKey);
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn instruction(&self) -> String {
        format!(
            "Name the subject the student is studying in this conversation. \
             Reply with 2 to 5 words in the student's language, without quotes \
             or final punctuation. If no subject is discernible yet, reply exactly: {}",
            self.config.undetermined_label
        )
    }

    async fn generate_once(&self, rendered: &str) -> Result<String, ExtractionError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.config.model);

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: self.instruction() }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: rendered.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 24,
            },
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
            let body = response.text().await.unwrap_or_default();
            let (code, message) = parse_api_error(status, body);
            tracing::warn!(code, message = %message, "Gemini generateContent error");
            return Err(ExtractionError::Api { code, message });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<String>();

        normalize_label(&text)
    }
}

#[async_trait]
impl TopicExtractor for GeminiTopicExtractor {
    async fn extract_label(&self, transcript: &SessionTranscript) -> Result<String, ExtractionError> {
        let rendered = transcript.render();
        if rendered.is_empty() {
            return Err(ExtractionError::EmptyTranscript);
        }

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.generate_once(&rendered),
            |e: &ExtractionError| e.is_retryable(),
        )
        .await;

        match result {
            Ok(label) => {
                tracing::debug!(session_id = %transcript.session_id, label = %label, "Extracted topic label");
                Ok(label)
            }
            Err(e) if e.is_retryable() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts, error = %e, "All topic extraction attempts failed");
                Err(ExtractionError::RetryExhausted {
                    attempts,
                    last: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
