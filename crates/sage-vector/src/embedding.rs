//! Embedding providers for generating vector representations
//!
//! Supports OpenAI-compatible and Ollama embedding APIs. Both providers
//! report the dimension they actually produce: `connect` embeds a short probe
//! document and adopts its length.

use async_trait::async_trait;
use reqwest::Client;
use sage_core::{EmbeddingProvider, LlmConfig, LlmProvider, Result, SageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PROBE_TEXT: &str = "dimension probe";

/// Optional instruction prefixes for query and document embeddings
#[derive(Debug, Clone, Default)]
struct Prefixes {
    query: Option<String>,
    document: Option<String>,
}

impl Prefixes {
    fn from_config(config: &LlmConfig) -> Self {
        Self {
            query: config.embedding_query_prefix.clone(),
            document: config.embedding_document_prefix.clone(),
        }
    }

    fn apply(prefix: &Option<String>, text: &str) -> String {
        match prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        }
    }
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SageError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Embedding Provider
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    prefixes: Prefixes,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    /// Create a client with the dimension known for `model`
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        Self {
            client: Client::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model,
            dimension,
            prefixes: Prefixes::default(),
        }
    }

    /// Create from config without contacting the API
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| SageError::ConfigError("OpenAI API key required".to_string()))?;

        let mut embedding = Self::new(api_key.clone(), config.embedding_model.clone());
        embedding.client = http_client(config.timeout_secs)?;
        if let Some(base_url) = &config.openai_base_url {
            embedding.base_url = base_url.trim_end_matches('/').to_string();
        }
        embedding.prefixes = Prefixes::from_config(config);
        Ok(embedding)
    }

    /// Create from config and adopt the dimension the API actually returns
    pub async fn connect(config: &LlmConfig) -> Result<Self> {
        let mut embedding = Self::from_config(config)?;
        embedding.dimension = embedding.embed_document(PROBE_TEXT).await?.len();
        tracing::info!(
            "OpenAI embedding model {} reports dimension {}",
            embedding.model,
            embedding.dimension
        );
        Ok(embedding)
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        let request = OpenAiEmbeddingRequest {
            input: vec![text],
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| SageError::EmbeddingUnavailable(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SageError::EmbeddingUnavailable(format!(
                "OpenAI embedding error: {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            SageError::EmbeddingUnavailable(format!("Failed to parse embedding response: {e}"))
        })?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SageError::EmbeddingUnavailable("No embedding returned".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_raw(&Prefixes::apply(&self.prefixes.query, text))
            .await
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_raw(&Prefixes::apply(&self.prefixes.document, text))
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Ollama Embedding Provider
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    prefixes: Prefixes,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a client with the dimension known for `model`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
            prefixes: Prefixes::default(),
        }
    }

    /// Create from config without contacting the server
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut embedding = Self::new(
            config.ollama_url.trim_end_matches('/'),
            config.embedding_model.clone(),
        );
        embedding.client = http_client(config.timeout_secs)?;
        embedding.prefixes = Prefixes::from_config(config);
        Ok(embedding)
    }

    /// Create from config and adopt the dimension the server actually returns
    pub async fn connect(config: &LlmConfig) -> Result<Self> {
        let mut embedding = Self::from_config(config)?;
        embedding.dimension = embedding.embed_document(PROBE_TEXT).await?.len();
        tracing::info!(
            "Ollama embedding model {} reports dimension {}",
            embedding.model,
            embedding.dimension
        );
        Ok(embedding)
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SageError::EmbeddingUnavailable(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SageError::EmbeddingUnavailable(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            SageError::EmbeddingUnavailable(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_raw(&Prefixes::apply(&self.prefixes.query, text))
            .await
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_raw(&Prefixes::apply(&self.prefixes.document, text))
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Connect the embedding provider named by config
pub async fn create_embedding_provider(config: &LlmConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Arc::new(OpenAiEmbedding::connect(config).await?))
        }
        LlmProvider::Ollama => Ok(Arc::new(OllamaEmbedding::connect(config).await?)),
    }
}

// ============================================================================
// Document embedding with zero-vector substitution
// ============================================================================

/// A document embedding, possibly substituted
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVector {
    pub vector: Vec<f32>,
    /// True when the provider failed and `vector` is all zeros
    pub substituted: bool,
}

/// Embed a document chunk, substituting a zero vector on failure
///
/// A provider error or a vector of the wrong length never aborts ingestion;
/// the chunk is still indexed, just unreachable by similarity.
pub async fn embed_document_or_zero(provider: &dyn EmbeddingProvider, text: &str) -> DocumentVector {
    let dimension = provider.dimension();
    match provider.embed_document(text).await {
        Ok(vector) if vector.len() == dimension => DocumentVector {
            vector,
            substituted: false,
        },
        Ok(vector) => {
            tracing::warn!(
                "Embedding returned {} components, expected {}; using zero vector",
                vector.len(),
                dimension
            );
            DocumentVector {
                vector: vec![0.0; dimension],
                substituted: true,
            }
        }
        Err(e) => {
            tracing::warn!("Document embedding failed, using zero vector: {e}");
            DocumentVector {
                vector: vec![0.0; dimension],
                substituted: true,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        dimension: usize,
        output: Option<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_document(text).await
        }

        async fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
            self.output
                .clone()
                .ok_or_else(|| SageError::EmbeddingUnavailable("offline".to_string()))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);
    }

    #[test]
    fn test_openai_requires_key() {
        let config = LlmConfig {
            openai_api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            OpenAiEmbedding::from_config(&config),
            Err(SageError::ConfigError(_))
        ));
    }

    #[test]
    fn test_prefix_application() {
        let prefix = Some("search_query: ".to_string());
        assert_eq!(Prefixes::apply(&prefix, "rust"), "search_query: rust");
        assert_eq!(Prefixes::apply(&None, "rust"), "rust");
    }

    #[tokio::test]
    async fn test_embed_document_or_zero_passes_through() {
        let provider = FixedProvider {
            dimension: 3,
            output: Some(vec![1.0, 2.0, 3.0]),
        };
        let result = embed_document_or_zero(&provider, "text").await;
        assert_eq!(result.vector, vec![1.0, 2.0, 3.0]);
        assert!(!result.substituted);
    }

    #[tokio::test]
    async fn test_embed_document_or_zero_on_error() {
        let provider = FixedProvider {
            dimension: 3,
            output: None,
        };
        let result = embed_document_or_zero(&provider, "text").await;
        assert_eq!(result.vector, vec![0.0; 3]);
        assert!(result.substituted);
    }

    #[tokio::test]
    async fn test_embed_document_or_zero_on_wrong_length() {
        let provider = FixedProvider {
            dimension: 3,
            output: Some(vec![1.0]),
        };
        let result = embed_document_or_zero(&provider, "text").await;
        assert_eq!(result.vector, vec![0.0; 3]);
        assert!(result.substituted);
    }
}
