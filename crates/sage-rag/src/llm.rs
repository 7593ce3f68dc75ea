//! LLM Client implementations
//!
//! Provides streaming clients for OpenAI-compatible chat completions (SSE)
//! and Ollama generate (NDJSON). Response bodies are decoded line by line so
//! a frame split across network chunks is reassembled before parsing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::Client;
use sage_core::{LlmClient, LlmConfig, LlmProvider, Result, SageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest stream line accepted before the response is treated as broken
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Decode a byte stream into lines, then each line into an optional fragment
///
/// Lines for which `decode` returns `None` (keep-alives, metadata, empty
/// deltas) are skipped. A line longer than `max_line_bytes` yields an
/// `LlmError` instead of buffering without bound.
fn decode_lines<S, F>(
    body: S,
    max_line_bytes: usize,
    decode: F,
) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    F: Fn(&str) -> Option<Result<String>> + Send + 'static,
{
    FramedRead::new(StreamReader::new(body), LinesCodec::new_with_max_length(max_line_bytes))
        .filter_map(move |line| {
            let item = match line {
                Ok(line) => decode(&line),
                Err(e) => Some(Err(SageError::LlmError(format!("Stream error: {e}")))),
            };
            async move { item }
        })
        .boxed()
}

fn response_body(response: reqwest::Response) -> impl Stream<Item = std::io::Result<Bytes>> {
    response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other))
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SageError::ConfigError(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// Decode one SSE line of a chat completions stream
fn decode_openai_line(line: &str) -> Option<Result<String>> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(StreamResponse {
            error: Some(error), ..
        }) => Some(Err(SageError::LlmError(format!(
            "OpenAI stream error: {}",
            error.message
        )))),
        Ok(parsed) => parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => {
            tracing::debug!("Skipping unparseable SSE frame: {e}");
            None
        }
    }
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| SageError::ConfigError("OpenAI API key required".to_string()))?;

        let base_url = config
            .openai_base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key.clone(),
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| SageError::LlmError(format!("Stream request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SageError::LlmError(format!(
                "OpenAI stream error: {error_text}"
            )));
        }

        Ok(decode_lines(response_body(response), MAX_LINE_BYTES, decode_openai_line))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

/// Decode one NDJSON line of an Ollama generate stream
fn decode_ollama_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<OllamaResponse>(line) {
        Ok(OllamaResponse {
            error: Some(error), ..
        }) => Some(Err(SageError::LlmError(format!("Ollama stream error: {error}")))),
        Ok(parsed) if parsed.response.is_empty() => None,
        Ok(parsed) => Some(Ok(parsed.response)),
        Err(e) => {
            tracing::debug!("Skipping unparseable NDJSON line: {e}");
            None
        }
    }
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.5,
            max_tokens: 2048,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| SageError::LlmError(format!("Ollama stream request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SageError::LlmError(format!(
                "Ollama stream error: {error_text}"
            )));
        }

        Ok(decode_lines(response_body(response), MAX_LINE_BYTES, decode_ollama_line))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(parts: &[&'static str]) -> impl Stream<Item = std::io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 2048, 0.5);
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("http://localhost:11434", "llama3");
        assert_eq!(client.model, "llama3");
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn test_openai_requires_key() {
        assert!(matches!(
            create_llm_client(&LlmConfig::default()),
            Err(SageError::ConfigError(_))
        ));
    }

    #[test]
    fn test_decode_openai_line() {
        assert_eq!(
            decode_openai_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#)
                .unwrap()
                .unwrap(),
            "Hi"
        );
        assert!(decode_openai_line("data: [DONE]").is_none());
        assert!(decode_openai_line(": keep-alive").is_none());
        assert!(decode_openai_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#)
            .is_none());
        assert!(matches!(
            decode_openai_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Some(Err(SageError::LlmError(_)))
        ));
    }

    #[test]
    fn test_decode_ollama_line() {
        assert_eq!(
            decode_ollama_line(r#"{"response":"Hel","done":false}"#)
                .unwrap()
                .unwrap(),
            "Hel"
        );
        assert!(decode_ollama_line(r#"{"response":"","done":true}"#).is_none());
        assert!(matches!(
            decode_ollama_line(r#"{"error":"model not found"}"#),
            Some(Err(SageError::LlmError(_)))
        ));
    }

    #[tokio::test]
    async fn test_sse_frames_split_across_chunks() {
        let parts = [
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"Hello\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n",
            "\ndata: [DONE]\n\n",
        ];

        let fragments: Vec<String> = decode_lines(body(&parts), MAX_LINE_BYTES, decode_openai_line)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_ndjson_split_across_chunks() {
        let parts = [
            "{\"response\":\"Bon\",\"done\":false}\n{\"respo",
            "nse\":\"jour\",\"done\":false}\n{\"response\":\"\",\"done\":true}",
        ];

        let fragments: Vec<String> = decode_lines(body(&parts), MAX_LINE_BYTES, decode_ollama_line)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Bon", "jour"]);
    }

    #[tokio::test]
    async fn test_unterminated_line_is_bounded() {
        let parts = [
            "{\"response\":\"ok\",\"done\":false}\n",
            "{\"response\":\"",
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
        ];

        let items: Vec<Result<String>> = decode_lines(body(&parts), 64, decode_ollama_line)
            .collect()
            .await;

        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(items[1], Err(SageError::LlmError(_))));
    }
}
