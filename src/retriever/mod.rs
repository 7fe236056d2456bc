// Retriever module
// Orchestrates the ingestion path (chunk, embed, insert) and the query
// path (embed, nearest-neighbor search, result mapping).


use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::{ChunkingConfig, chunk_words};
use crate::config::Config;
use crate::document::{Document, Metadata};
use crate::index::{ChunkHit, ChunkMetadata, ChunkRecord, VectorIndex};
use crate::{RagError, Result};

/// Metadata keys owned by the indexing layer; document metadata cannot
/// override them.
const RESERVED_METADATA_KEYS: [&str; 4] = ["document_id", "title", "doc_type", "chunk_index"];

/// Embedding capability consumed by the retriever
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the result is parallel to the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Source document fields carried with each retrieval hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    pub document_id: String,
    pub title: String,
    pub doc_type: String,
    pub chunk_index: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One ranked retrieval hit for a query. Lists of results are ordered by
/// descending score with stable ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub document: DocumentInfo,
    /// Normalized similarity in `[0, 1]`; 1.0 is an identical match
    pub score: f32,
    pub snippet: Option<String>,
}

/// Query and ingestion orchestration over a vector index and an
/// embedding capability, both shared process-lifetime resources.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    max_results: usize,
    snippet_max_chars: usize,
}

impl Retriever {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self {
            index,
            embedder,
            chunking: config.chunking.clone(),
            max_results: config.retrieval.max_results,
            snippet_max_chars: config.retrieval.snippet_max_chars,
        }
    }

    /// Ceiling for the per-query `limit` argument.
    #[inline]
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Retrieve the `limit` chunks closest to `query`, best-first.
    ///
    /// An empty query and a limit outside `[1, max_results]` are
    /// validation errors; a query that matches nothing is an empty
    /// result, not an error.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievalResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Validation("Query must not be empty".to_string()));
        }
        if limit == 0 || limit > self.max_results {
            return Err(RagError::Validation(format!(
                "Limit must be between 1 and {}",
                self.max_results
            )));
        }

        debug!("Searching for '{}' with limit {}", query, limit);

        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.query(&embedding, limit).await?;

        debug!("Search returned {} hits", hits.len());
        Ok(hits.into_iter().map(|hit| self.to_result(hit)).collect())
    }

    /// Chunk, embed, and index a document. Returns the number of chunks
    /// created; empty content yields zero chunks and is not an error.
    ///
    /// Chunk ids are deterministic (`"{document_id}_chunk_{index}"`) and
    /// any chunks from a previous ingest of the same id are replaced.
    #[inline]
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let chunks = chunk_words(&document.content, &self.chunking)?;

        self.index.delete_by_document(&document.id).await?;

        if chunks.is_empty() {
            info!("Document {} has no content to index", document.id);
            return Ok(0);
        }

        let embeddings = self.embedder.embed_batch(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Backend(format!(
                "Embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut extra = document.metadata.clone();
        for key in RESERVED_METADATA_KEYS {
            extra.remove(key);
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| ChunkRecord {
                id: format!("{}_chunk_{}", document.id, i),
                text,
                embedding,
                metadata: ChunkMetadata {
                    document_id: document.id.clone(),
                    title: document.title.clone(),
                    doc_type: document.doc_type.to_string(),
                    chunk_index: i as u32,
                    extra: extra.clone(),
                },
            })
            .collect();

        let count = records.len();
        self.index.insert(&document.id, records).await?;

        info!("Ingested document {} as {} chunks", document.id, count);
        Ok(count)
    }

    /// Remove a document's chunks from the index. A no-op for unknown
    /// ids.
    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.index.delete_by_document(document_id).await
    }

    /// Total number of indexed chunks.
    #[inline]
    pub async fn chunk_count(&self) -> Result<u64> {
        self.index.count().await
    }

    fn to_result(&self, hit: ChunkHit) -> RetrievalResult {
        RetrievalResult {
            document: DocumentInfo {
                document_id: hit.metadata.document_id,
                title: hit.metadata.title,
                doc_type: hit.metadata.doc_type,
                chunk_index: hit.metadata.chunk_index,
                metadata: hit.metadata.extra,
            },
            // Cosine distance inverted into a similarity; the clamp
            // covers the negative-similarity tail of unnormalized inputs
            score: (1.0 - hit.distance).clamp(0.0, 1.0),
            snippet: Some(excerpt(&hit.text, self.snippet_max_chars)),
        }
    }
}

/// Bounded-length excerpt of a chunk, truncated on a char boundary
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
