use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TopicMapConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub linking: LinkingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Snapshot path for the `file` backend.
    pub path: String,
    /// Row key for the `postgres` backend; one graph per key.
    pub graph_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: "knowledge-graph.json".to_string(),
            graph_key: "default".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: u32,
    /// Falls back to `GOOGLE_API_KEY` when unset.
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-001".to_string(),
            dimensions: 768,
            api_key: None,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// What to do when the extractor reports the undetermined-topic sentinel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UndeterminedPolicy {
    /// Do not create a node; the session can be retried after more turns.
    #[default]
    Skip,
    /// Create the node with the sentinel as its label.
    Create,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub undetermined_label: String,
    pub undetermined_policy: UndeterminedPolicy,
    pub min_assistant_replies: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            max_retries: 3,
            retry_delay_ms: 1000,
            undetermined_label: crate::extractor::UNDETERMINED_LABEL.to_string(),
            undetermined_policy: UndeterminedPolicy::Skip,
            min_assistant_replies: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkingConfig {
    pub similarity_threshold: f32,
    pub max_write_attempts: u32,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: crate::linker::DEFAULT_SIMILARITY_THRESHOLD,
            max_write_attempts: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8766,
        }
    }
}

impl TopicMapConfig {
    /// Loads `path` (any format `config` understands) with `TOPICMAP__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("TOPICMAP").separator("__"))
            .build()?;
        s.try_deserialize::<Self>()?.validated()
    }

    /// Parses an inline TOML document. Used by tests and embedders of the library.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        s.try_deserialize::<Self>()?.validated()
    }

    /// Rejects values that deserialize fine but would silently break linking.
    fn validated(self) -> Result<Self, ConfigError> {
        let threshold = self.linking.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Message(format!(
                "linking.similarity_threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.linking.max_write_attempts == 0 {
            return Err(ConfigError::Message(
                "linking.max_write_attempts must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}
