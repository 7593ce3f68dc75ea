//! Sage RAG - Retrieval-Augmented Generation pipeline
//!
//! This crate implements the query and ingestion paths over one shared
//! corpus:
//! - Ingestion with bounded embedding concurrency and zero-vector substitution
//! - Retrieval: query embedding, nearest-neighbour search, chunk resolution
//! - Streaming generation that answers from retrieved context, or from the
//!   model alone when nothing is indexed
//!
//! [`RagEngine`] wires these together from an [`sage_core::AppConfig`].

pub mod cache;
pub mod engine;
pub mod ingest;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheStats, CacheStatsReport, CachedEmbeddingProvider, EmbeddingCache};
pub use engine::RagEngine;
pub use ingest::Ingestor;
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use orchestrator::{build_context, AnswerStream, GenerationOrchestrator, GenerationPhase};
pub use prompt::PromptTemplate;
pub use retrieval::RetrievalPipeline;
