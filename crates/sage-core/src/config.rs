//! Sage Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default prompt used when documents are indexed
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a professional AI Assistant.

IMPORTANT:
You are NOT limited to questions about the uploaded documents.
You are allowed to answer ANY general knowledge question,
as long as it follows safety guidelines.

Behavior Rules:
1. If the User Question is related to the provided Document Context, use it.
2. If the question is unrelated to the Document Context, ignore the document and answer normally.
3. Do NOT restrict yourself only to the document topic.
4. Maintain a professional tone.

Document Context:
{context}

User Question:
{question}

Answer:
";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// RAG pipeline configuration
    pub rag: RagConfig,

    /// Snapshot persistence
    pub snapshot: SnapshotConfig,

    /// Query embedding cache
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // LLM
        if let Some(provider) = parse_env("LLM_PROVIDER")? {
            self.llm.provider = provider;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(temperature) = parse_env("LLM_TEMPERATURE")? {
            self.llm.temperature = temperature;
        }

        // RAG
        if let Some(top_k) = parse_env("TOP_K")? {
            self.rag.top_k = top_k;
        }
        if let Some(max_distance) = parse_env("MAX_DISTANCE")? {
            self.rag.max_distance = Some(max_distance);
        }

        // Snapshot
        if let Ok(dir) = std::env::var("SNAPSHOT_DIR") {
            self.snapshot.dir = PathBuf::from(dir);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.top_k".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rag.chunk_size == 0 || self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_overlap".to_string(),
                value: format!(
                    "{} (chunk_size {})",
                    self.rag.chunk_overlap, self.rag.chunk_size
                ),
            });
        }
        if self.rag.embedding_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.embedding_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if let Some(max_distance) = self.rag.max_distance {
            if !max_distance.is_finite() || max_distance < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "rag.max_distance".to_string(),
                    value: max_distance.to_string(),
                });
            }
        }
        for placeholder in ["{context}", "{question}"] {
            if !self.rag.prompt_template.contains(placeholder) {
                return Err(ConfigError::MissingRequired(format!(
                    "rag.prompt_template placeholder {placeholder}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum upload size in bytes
    pub max_upload_bytes: usize,

    /// Accepted upload extensions
    pub allowed_extensions: Vec<String>,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            allowed_extensions: vec![
                ".pdf".to_string(),
                ".docx".to_string(),
                ".txt".to_string(),
                ".md".to_string(),
            ],
            cors_enabled: true,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Prepended to query text before embedding
    pub embedding_query_prefix: Option<String>,

    /// Prepended to document text before embedding
    pub embedding_document_prefix: Option<String>,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_query_prefix: None,
            embedding_document_prefix: None,
            max_tokens: 2048,
            temperature: 0.5,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Drop results farther than this L2 distance; `None` keeps everything
    pub max_distance: Option<f32>,

    /// Chunk size for document processing (characters)
    pub chunk_size: usize,

    /// Chunk overlap (characters)
    pub chunk_overlap: usize,

    /// Concurrent document embedding calls during ingestion
    pub embedding_concurrency: usize,

    /// Returned for empty or whitespace-only questions
    pub empty_question_message: String,

    /// Context block used when retrieval finds nothing
    pub no_context_message: String,

    /// Prompt with `{context}` and `{question}` placeholders
    pub prompt_template: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_distance: None,
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_concurrency: 4,
            empty_question_message: "Please provide a valid question.".to_string(),
            no_context_message: "No relevant document context found for this specific query."
                .to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Snapshot persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory holding `index.bin` and `documents.json`
    pub dir: PathBuf,

    /// Load the snapshot at startup when the directory exists
    pub load_on_startup: bool,

    /// Save after every successful ingestion
    pub save_after_ingest: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("sage_index"),
            load_on_startup: true,
            save_after_ingest: false,
        }
    }
}

/// Query embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Wrap the embedding provider in a query cache
    pub enabled: bool,

    /// Maximum number of cached query embeddings
    pub max_capacity: u64,

    /// Time-to-live for cache entries (in seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            ttl_seconds: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::SageError {
    fn from(err: ConfigError) -> Self {
        crate::SageError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rag.top_k, 4);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert!(config.rag.max_distance.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [rag]
            top_k = 8
            max_distance = 1.5

            [snapshot]
            dir = "/tmp/sage"
            "#,
        )
        .unwrap();

        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.rag.max_distance, Some(1.5));
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.snapshot.dir, PathBuf::from("/tmp/sage"));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut config = AppConfig::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_max_distance() {
        let mut config = AppConfig::default();
        config.rag.max_distance = Some(0.0);
        assert!(config.validate().is_ok());

        for bad in [f32::NAN, -0.5, f32::INFINITY] {
            config.rag.max_distance = Some(bad);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == "rag.max_distance"
            ));
        }
    }

    #[test]
    fn test_validate_rejects_template_without_placeholders() {
        let mut config = AppConfig::default();
        config.rag.prompt_template = "Answer: {question}".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
