//! In-process stub providers for tests
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! downstream crates' tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sage_core::{EmbeddingProvider, LlmClient, Result, SageError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Stub Embedder
// ============================================================================

/// Deterministic embedding provider with call counters and failure injection
#[derive(Debug, Default)]
pub struct StubEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    failing_documents: HashSet<String>,
    wrong_length_documents: HashSet<String>,
    fail_all_documents: bool,
    fail_queries: bool,
    query_calls: AtomicUsize,
    document_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Return `vector` for `text` on both entry points
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Fail `embed_document` for `text`
    pub fn failing_document(mut self, text: impl Into<String>) -> Self {
        self.failing_documents.insert(text.into());
        self
    }

    /// Return a vector one component too long for `text`
    pub fn wrong_length_document(mut self, text: impl Into<String>) -> Self {
        self.wrong_length_documents.insert(text.into());
        self
    }

    /// Fail every `embed_document` call
    pub fn failing_all_documents(mut self) -> Self {
        self.fail_all_documents = true;
        self
    }

    /// Fail every `embed_query` call
    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.vectors.get(text) {
            return vector.clone();
        }
        // Spread bytes over the components
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            if self.dimension > 0 {
                vector[i % self.dimension] += f32::from(byte) / 100.0;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(SageError::EmbeddingUnavailable(
                "stub query embedding offline".to_string(),
            ));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_documents || self.failing_documents.contains(text) {
            return Err(SageError::EmbeddingUnavailable(format!(
                "stub document embedding failed for {text:?}"
            )));
        }
        if self.wrong_length_documents.contains(text) {
            return Ok(vec![1.0; self.dimension + 1]);
        }
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Stub LLM
// ============================================================================

/// Scripted streaming LLM with invocation counter and drop tracking
#[derive(Debug, Default)]
pub struct StubLlm {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    fail_open: bool,
    hang_after_fragments: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    released: Arc<AtomicBool>,
}

impl StubLlm {
    /// Stream `fragments` in order, then end
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Yield an error after `n` fragments
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail to open the stream at all
    pub fn failing_to_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Never end after the scripted fragments
    pub fn hanging(mut self) -> Self {
        self.hang_after_fragments = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// True once the last opened stream was dropped
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Sets its flag when dropped
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.fail_open {
            return Err(SageError::LlmError("stub LLM unavailable".to_string()));
        }

        let mut items: Vec<Result<String>> = Vec::new();
        for (i, fragment) in self.fragments.iter().enumerate() {
            if self.fail_after == Some(i) {
                break;
            }
            items.push(Ok(fragment.clone()));
        }
        if let Some(n) = self.fail_after {
            if n <= self.fragments.len() {
                items.push(Err(SageError::LlmError("stub connection reset".to_string())));
            }
        }

        self.released.store(false, Ordering::SeqCst);
        let guard = ReleaseGuard(Arc::clone(&self.released));

        let tail = if self.hang_after_fragments {
            stream::pending::<Result<String>>().boxed()
        } else {
            stream::empty::<Result<String>>().boxed()
        };

        Ok(stream::iter(items)
            .chain(tail)
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
