// RAG module
// Answers questions by retrieving ranked context chunks and conditioning
// the generation backend on them, as a complete payload or as a framed
// token stream.

pub mod prompt;
pub mod streaming;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;
use crate::retriever::{RetrievalResult, Retriever};

pub use prompt::build_prompt;
pub use streaming::{ResponseStreamer, StreamFrame};

/// A finite, non-restartable sequence of incremental generation output,
/// consumed exactly once. Dropping the stream stops the producer.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl TokenStream {
    #[inline]
    pub fn new(rx: mpsc::Receiver<Result<String>>) -> Self {
        Self { rx }
    }

    /// Create a bounded producer/consumer pair.
    #[inline]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<String>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Next increment of generated text, or `None` once generation is
    /// exhausted.
    #[inline]
    pub async fn next(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

/// Generation capability consumed by the RAG service
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the complete answer for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Produce the answer as a stream of text increments.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream>;
}

/// Complete (non-streaming) answer payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub context: Vec<RetrievalResult>,
    pub prompt: String,
}

/// Question answering over a retriever and a generation backend, both
/// shared process-lifetime resources.
pub struct RagService {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
}

impl RagService {
    #[inline]
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer a question in one shot: retrieve context, build the
    /// prompt, and generate the full answer.
    #[inline]
    pub async fn answer(&self, query: &str, limit: usize) -> Result<QueryResponse> {
        let context = self.retriever.search(query, limit).await?;
        let prompt = build_prompt(query, &context);

        debug!(
            "Generating answer with {} context chunks (prompt length {})",
            context.len(),
            prompt.len()
        );
        let answer = self.generator.generate(&prompt).await?;

        Ok(QueryResponse {
            answer,
            context,
            prompt,
        })
    }

    /// Answer a question as a frame stream: token frames in generation
    /// order followed by exactly one terminal context frame.
    #[inline]
    pub async fn answer_stream(&self, query: &str, limit: usize) -> Result<ResponseStreamer> {
        let context = self.retriever.search(query, limit).await?;
        let prompt = build_prompt(query, &context);

        debug!(
            "Starting streamed answer with {} context chunks",
            context.len()
        );
        let tokens = self.generator.generate_stream(&prompt).await?;

        Ok(ResponseStreamer::new(tokens, context))
    }
}
