//! Streaming answer generation
//!
//! Each request walks a small state machine:
//!
//! ```text
//! START -> NO_CONTEXT | WITH_CONTEXT -> STREAMING -> DONE
//!   \__________________\________________\_________-> FAILED
//! ```
//!
//! An empty index skips retrieval entirely and sends the raw question to the
//! model. Otherwise the retrieved chunks become the context block of the
//! prompt. Nothing runs until the returned `AnswerStream` is first polled,
//! and dropping it drops the underlying LLM stream.

use crate::prompt::PromptTemplate;
use crate::retrieval::RetrievalPipeline;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use sage_core::{LlmClient, RagConfig, Result, RetrievalResult, SageError};
use sage_vector::SharedCorpus;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GenerationPhase {
    Start = 0,
    NoContext = 1,
    WithContext = 2,
    Streaming = 3,
    Done = 4,
    Failed = 5,
}

impl GenerationPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::NoContext,
            2 => Self::WithContext,
            3 => Self::Streaming,
            4 => Self::Done,
            5 => Self::Failed,
            _ => Self::Start,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Phase shared between the generation future and its `AnswerStream`
#[derive(Debug, Clone, Default)]
struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn set(&self, phase: GenerationPhase) {
        tracing::debug!("Generation phase: {phase:?}");
        self.0.store(phase as u8, Ordering::Release);
    }

    fn get(&self) -> GenerationPhase {
        GenerationPhase::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Render retrieved chunks as the prompt's context block
///
/// Each chunk becomes `[Source: <source>]\n<text>`, joined by blank lines in
/// retrieval order. No results yields `no_context_message`.
pub fn build_context(results: &[RetrievalResult], no_context_message: &str) -> String {
    if results.is_empty() {
        return no_context_message.to_string();
    }
    results
        .iter()
        .map(|r| format!("[Source: {}]\n{}", r.chunk.source(), r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Decides between context-grounded and model-only answers and streams them
#[derive(Clone)]
pub struct GenerationOrchestrator {
    corpus: SharedCorpus,
    retrieval: RetrievalPipeline,
    llm: Arc<dyn LlmClient>,
    template: PromptTemplate,
    empty_question_message: Arc<str>,
    no_context_message: Arc<str>,
}

impl GenerationOrchestrator {
    pub fn new(
        corpus: SharedCorpus,
        retrieval: RetrievalPipeline,
        llm: Arc<dyn LlmClient>,
        template: PromptTemplate,
    ) -> Self {
        let defaults = RagConfig::default();
        Self {
            corpus,
            retrieval,
            llm,
            template,
            empty_question_message: defaults.empty_question_message.into(),
            no_context_message: defaults.no_context_message.into(),
        }
    }

    /// Build from config, validating the prompt template
    pub fn from_config(
        corpus: SharedCorpus,
        retrieval: RetrievalPipeline,
        llm: Arc<dyn LlmClient>,
        config: &RagConfig,
    ) -> Result<Self> {
        let template = PromptTemplate::new(config.prompt_template.clone())?;
        Ok(Self::new(corpus, retrieval, llm, template).with_messages(
            config.empty_question_message.clone(),
            config.no_context_message.clone(),
        ))
    }

    /// Override the guidance and no-context messages
    pub fn with_messages(
        mut self,
        empty_question_message: impl Into<String>,
        no_context_message: impl Into<String>,
    ) -> Self {
        self.empty_question_message = empty_question_message.into().into();
        self.no_context_message = no_context_message.into().into();
        self
    }

    /// Stream an answer to `question`
    pub fn answer(&self, question: impl Into<String>) -> AnswerStream {
        let phase = PhaseCell::default();
        let initial = StreamState::Pending {
            orchestrator: self.clone(),
            question: question.into(),
            phase: phase.clone(),
        };

        let inner = stream::unfold(initial, |state| async move {
            match state {
                StreamState::Pending {
                    orchestrator,
                    question,
                    phase,
                } => orchestrator.start(&question, phase).await,
                StreamState::Streaming { stream, phase } => next_fragment(stream, phase).await,
                StreamState::Done => None,
            }
        })
        .boxed();

        AnswerStream {
            inner,
            text: String::new(),
            phase,
        }
    }

    /// Drive `answer` to completion and return the full text
    pub async fn answer_full(&self, question: impl Into<String>) -> Result<String> {
        let mut stream = self.answer(question);
        while let Some(fragment) = stream.next().await {
            fragment?;
        }
        Ok(stream.into_text())
    }

    async fn start(
        &self,
        question: &str,
        phase: PhaseCell,
    ) -> Option<(Result<String>, StreamState)> {
        if question.trim().is_empty() {
            phase.set(GenerationPhase::Done);
            return Some((Ok(self.empty_question_message.to_string()), StreamState::Done));
        }

        match self.open(question, &phase).await {
            Ok(stream) => next_fragment(stream, phase).await,
            Err(e) => {
                tracing::warn!("Generation failed before streaming: {e}");
                phase.set(GenerationPhase::Failed);
                Some((Err(e), StreamState::Done))
            }
        }
    }

    async fn open(
        &self,
        question: &str,
        phase: &PhaseCell,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let prompt = if self.corpus.count().await == 0 {
            phase.set(GenerationPhase::NoContext);
            question.to_string()
        } else {
            phase.set(GenerationPhase::WithContext);
            let results = self.retrieval.retrieve_default(question).await?;
            let context = build_context(&results, &self.no_context_message);
            self.template.render(&context, question)
        };

        tracing::info!(
            "Calling {} with prompt length: {} chars",
            self.llm.name(),
            prompt.len()
        );
        self.llm.generate_stream(&prompt).await
    }
}

enum StreamState {
    Pending {
        orchestrator: GenerationOrchestrator,
        question: String,
        phase: PhaseCell,
    },
    Streaming {
        stream: BoxStream<'static, Result<String>>,
        phase: PhaseCell,
    },
    Done,
}

/// Pull the next non-empty fragment from the LLM stream
async fn next_fragment(
    mut stream: BoxStream<'static, Result<String>>,
    phase: PhaseCell,
) -> Option<(Result<String>, StreamState)> {
    loop {
        match stream.next().await {
            Some(Ok(fragment)) if fragment.is_empty() => continue,
            Some(Ok(fragment)) => {
                if phase.get() != GenerationPhase::Streaming {
                    phase.set(GenerationPhase::Streaming);
                }
                return Some((Ok(fragment), StreamState::Streaming { stream, phase }));
            }
            Some(Err(e)) => {
                tracing::warn!("Generation interrupted: {e}");
                phase.set(GenerationPhase::Failed);
                let interrupted = SageError::GenerationInterrupted {
                    message: e.to_string(),
                    partial: String::new(),
                };
                return Some((Err(interrupted), StreamState::Done));
            }
            None => {
                phase.set(GenerationPhase::Done);
                return None;
            }
        }
    }
}

/// Lazy stream of answer fragments
///
/// Accumulates the delivered text; a `GenerationInterrupted` error carries
/// everything delivered before it.
pub struct AnswerStream {
    inner: BoxStream<'static, Result<String>>,
    text: String,
    phase: PhaseCell,
}

impl AnswerStream {
    /// Text delivered so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Current lifecycle phase
    pub fn state(&self) -> GenerationPhase {
        self.phase.get()
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.text.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(SageError::GenerationInterrupted { message, .. }))) => {
                Poll::Ready(Some(Err(SageError::GenerationInterrupted {
                    message,
                    partial: this.text.clone(),
                })))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("text", &self.text)
            .field("phase", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubEmbedder, StubLlm};
    use sage_core::{Chunk, ChunkRecord};

    const FRANCE: &str = "Paris is the capital of France.";
    const JAPAN: &str = "Tokyo is the capital of Japan.";
    const QUESTION: &str = "What is the capital of France?";

    struct Fixture {
        corpus: SharedCorpus,
        embedder: Arc<StubEmbedder>,
        llm: Arc<StubLlm>,
    }

    impl Fixture {
        fn new(llm: StubLlm) -> Self {
            Self::with_embedder(llm, StubEmbedder::new(2))
        }

        fn with_embedder(llm: StubLlm, embedder: StubEmbedder) -> Self {
            Self {
                corpus: SharedCorpus::new(2),
                embedder: Arc::new(
                    embedder
                        .with_vector(FRANCE, vec![1.0, 0.0])
                        .with_vector(JAPAN, vec![0.0, 1.0])
                        .with_vector(QUESTION, vec![0.9, 0.1]),
                ),
                llm: Arc::new(llm),
            }
        }

        async fn with_geography(self) -> Self {
            self.corpus
                .append_batch(vec![
                    (vec![1.0, 0.0], ChunkRecord::new(FRANCE).with_source("geo.pdf")),
                    (vec![0.0, 1.0], ChunkRecord::new(JAPAN)),
                ])
                .await
                .unwrap();
            self
        }

        fn orchestrator(&self, top_k: usize, max_distance: Option<f32>) -> GenerationOrchestrator {
            let retrieval =
                RetrievalPipeline::new(self.corpus.clone(), self.embedder.clone(), top_k)
                    .with_max_distance(max_distance);
            GenerationOrchestrator::new(
                self.corpus.clone(),
                retrieval,
                self.llm.clone(),
                PromptTemplate::new("CONTEXT:\n{context}\nQUESTION:\n{question}").unwrap(),
            )
        }
    }

    async fn drain(stream: &mut AnswerStream) -> Vec<Result<String>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_build_context() {
        let results = vec![
            RetrievalResult {
                chunk: Chunk::from_record(ChunkRecord::new("alpha").with_source("a.pdf"), 0),
                distance: 0.1,
            },
            RetrievalResult {
                chunk: Chunk::from_record(ChunkRecord::new("beta"), 1),
                distance: 0.2,
            },
        ];
        assert_eq!(
            build_context(&results, "none"),
            "[Source: a.pdf]\nalpha\n\n[Source: Unknown]\nbeta"
        );
        assert_eq!(build_context(&[], "none"), "none");
    }

    #[tokio::test]
    async fn test_empty_question_returns_guidance() {
        let fixture = Fixture::new(StubLlm::new(["unused"])).with_geography().await;
        let orchestrator = fixture.orchestrator(4, None);

        for question in ["", "   ", "\n\t"] {
            let mut stream = orchestrator.answer(question);
            let items = drain(&mut stream).await;
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].as_ref().unwrap(), "Please provide a valid question.");
            assert_eq!(stream.state(), GenerationPhase::Done);
        }

        assert_eq!(fixture.llm.calls(), 0);
        assert_eq!(fixture.embedder.query_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_index_skips_retrieval() {
        let fixture = Fixture::new(StubLlm::new(["Paris", "."]));
        let orchestrator = fixture.orchestrator(4, None);

        let mut stream = orchestrator.answer(QUESTION);
        let items = drain(&mut stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(stream.text(), "Paris.");
        assert_eq!(stream.state(), GenerationPhase::Done);
        assert_eq!(fixture.embedder.query_calls(), 0);
        assert_eq!(fixture.llm.prompts(), vec![QUESTION.to_string()]);
    }

    #[tokio::test]
    async fn test_context_prompt_uses_retrieved_chunks() {
        let fixture = Fixture::new(StubLlm::new(["Paris"])).with_geography().await;
        let orchestrator = fixture.orchestrator(1, None);

        let answer = orchestrator.answer_full(QUESTION).await.unwrap();
        assert_eq!(answer, "Paris");

        let prompts = fixture.llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts[0],
            format!("CONTEXT:\n[Source: geo.pdf]\n{FRANCE}\nQUESTION:\n{QUESTION}")
        );
        assert_eq!(fixture.embedder.query_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_results_uses_sentinel_context() {
        let fixture = Fixture::new(StubLlm::new(["I don't know"])).with_geography().await;
        let orchestrator = fixture.orchestrator(4, Some(0.01));

        orchestrator.answer_full(QUESTION).await.unwrap();
        let prompt = &fixture.llm.prompts()[0];
        assert!(prompt.contains("No relevant document context found for this specific query."));
        assert!(!prompt.contains(FRANCE));
    }

    #[tokio::test]
    async fn test_empty_fragments_are_skipped() {
        let fixture = Fixture::new(StubLlm::new(["Hel", "", "lo", ""]));
        let orchestrator = fixture.orchestrator(4, None);

        let mut stream = orchestrator.answer("hi");
        let items: Vec<String> = drain(&mut stream)
            .await
            .into_iter()
            .map(|i| i.unwrap())
            .collect();
        assert_eq!(items, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_carries_partial() {
        let fixture = Fixture::new(StubLlm::new(["The ", "capital ", "is"]).failing_after(2));
        let orchestrator = fixture.orchestrator(4, None);

        let mut stream = orchestrator.answer(QUESTION);
        let items = drain(&mut stream).await;

        assert_eq!(items.len(), 3);
        match &items[2] {
            Err(SageError::GenerationInterrupted { partial, .. }) => {
                assert_eq!(partial, "The capital ")
            }
            other => panic!("expected GenerationInterrupted, got {other:?}"),
        }
        assert_eq!(stream.state(), GenerationPhase::Failed);
        assert!(fixture.llm.released());

        assert!(matches!(
            orchestrator.answer_full(QUESTION).await,
            Err(SageError::GenerationInterrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_failure_is_llm_error() {
        let fixture = Fixture::new(StubLlm::new(["x"]).failing_to_open());
        let orchestrator = fixture.orchestrator(4, None);

        let mut stream = orchestrator.answer(QUESTION);
        let items = drain(&mut stream).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SageError::LlmError(_))));
        assert_eq!(stream.state(), GenerationPhase::Failed);
    }

    #[tokio::test]
    async fn test_retrieval_failure_fails_without_llm_call() {
        let fixture =
            Fixture::with_embedder(StubLlm::new(["x"]), StubEmbedder::new(2).failing_queries())
                .with_geography()
                .await;
        let orchestrator = fixture.orchestrator(4, None);

        let result = orchestrator.answer_full(QUESTION).await;
        assert!(matches!(result, Err(SageError::EmbeddingUnavailable(_))));
        assert_eq!(fixture.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_is_lazy() {
        let fixture = Fixture::new(StubLlm::new(["x"])).with_geography().await;
        let orchestrator = fixture.orchestrator(4, None);

        let stream = orchestrator.answer(QUESTION);
        assert_eq!(stream.state(), GenerationPhase::Start);
        drop(stream);

        assert_eq!(fixture.llm.calls(), 0);
        assert_eq!(fixture.embedder.query_calls(), 0);
    }

    #[tokio::test]
    async fn test_early_drop_releases_llm_stream() {
        let fixture = Fixture::new(StubLlm::new(["first", "second"]).hanging());
        let orchestrator = fixture.orchestrator(4, None);

        let mut stream = tokio_test::task::spawn(orchestrator.answer(QUESTION));
        let first = tokio_test::assert_ready!(stream.poll_next());
        assert_eq!(first.unwrap().unwrap(), "first");
        tokio_test::assert_ready!(stream.poll_next());
        tokio_test::assert_pending!(stream.poll_next());
        assert!(!fixture.llm.released());

        drop(stream);
        assert!(fixture.llm.released());
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let fixture = Fixture::new(StubLlm::new(["a", "b"])).with_geography().await;
        let orchestrator = fixture.orchestrator(1, None);

        let mut stream = orchestrator.answer(QUESTION);
        assert_eq!(stream.state(), GenerationPhase::Start);

        stream.next().await.unwrap().unwrap();
        assert_eq!(stream.state(), GenerationPhase::Streaming);
        assert_eq!(stream.text(), "a");

        stream.next().await.unwrap().unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), GenerationPhase::Done);
        assert!(stream.state().is_terminal());
    }

    #[tokio::test]
    async fn test_answer_full_matches_streamed_concatenation() {
        let fixture = Fixture::new(StubLlm::new(["a", "b", "", "c"])).with_geography().await;
        let orchestrator = fixture.orchestrator(2, None);

        let mut stream = orchestrator.answer(QUESTION);
        let streamed: String = drain(&mut stream)
            .await
            .into_iter()
            .map(|i| i.unwrap())
            .collect();

        assert_eq!(orchestrator.answer_full(QUESTION).await.unwrap(), streamed);
        assert_eq!(streamed, "abc");
    }
}
