// Vector index module
// Owns the stored (chunk text, embedding, metadata) triples and the
// nearest-neighbor query surface shared by the persistent and in-memory
// backends.

pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::document::Metadata;

/// A chunk ready to be stored: text, embedding, and metadata travel
/// together so the parallel-sequence precondition holds by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Deterministic chunk id, `"{document_id}_chunk_{index}"`
    pub id: String,
    /// The chunk text as produced by the chunker
    pub text: String,
    /// Fixed-length embedding vector
    pub embedding: Vec<f32>,
    /// Metadata stored alongside the embedding
    pub metadata: ChunkMetadata,
}

/// Metadata stored with each chunk. The four reserved fields are always
/// present; `extra` carries the owning document's own metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub title: String,
    pub doc_type: String,
    pub chunk_index: u32,
    #[serde(default)]
    pub extra: Metadata,
}

/// One nearest-neighbor hit, ranked best-first by ascending distance
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query vector (0.0 is an identical direction)
    pub distance: f32,
}

/// Contract the retrieval layer requires from a vector store backend.
///
/// Implementations wrap backend-specific failures into
/// [`RagError::Backend`](crate::RagError::Backend) for store problems and
/// [`RagError::Validation`](crate::RagError::Validation) for malformed
/// input; callers never see backend error types. Each call is atomic from
/// the caller's perspective.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a document's chunks. Every chunk is searchable once this
    /// returns.
    async fn insert(&self, document_id: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Return up to `k` stored chunks closest to `vector`, best-first.
    /// An empty or missing index yields an empty list, and `k` larger
    /// than the stored count yields fewer hits; neither is an error.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>>;

    /// Remove every chunk whose metadata names `document_id`, and only
    /// those. A no-op when the document has no chunks.
    async fn delete_by_document(&self, document_id: &str) -> Result<()>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<u64>;
}
