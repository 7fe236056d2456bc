
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use super::{ChunkHit, ChunkRecord, VectorIndex};
use crate::{RagError, Result};

/// In-memory vector index using an exhaustive cosine-distance scan.
///
/// Suitable for tests and small corpora; the persistent backend is
/// [`LanceDbIndex`](super::lancedb::LanceDbIndex). Inserting a chunk id
/// that already exists replaces the stored record.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    rows: RwLock<Vec<ChunkRecord>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_rows(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.rows
            .read()
            .map_err(|_| RagError::Backend("memory index lock poisoned".to_string()))
    }

    fn write_rows(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.rows
            .write()
            .map_err(|_| RagError::Backend("memory index lock poisoned".to_string()))
    }
}

/// Cosine distance between two vectors; 0.0 for identical directions,
/// 1.0 for orthogonal or zero-norm inputs, up to 2.0 for opposites.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).fold(0.0_f32, |acc, (x, y)| x.mul_add(*y, acc));
    let norm_a = a.iter().fold(0.0_f32, |acc, x| x.mul_add(*x, acc)).sqrt();
    let norm_b = b.iter().fold(0.0_f32, |acc, y| y.mul_add(*y, acc)).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn insert(&self, document_id: &str, records: Vec<ChunkRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No chunks to insert for document {}", document_id);
            return Ok(());
        }

        let dimension = records[0].embedding.len();
        if dimension == 0 {
            return Err(RagError::Validation(
                "chunk embeddings must not be empty".to_string(),
            ));
        }
        if records.iter().any(|r| r.embedding.len() != dimension) {
            return Err(RagError::Validation(
                "chunk embeddings must share one dimension".to_string(),
            ));
        }

        let mut rows = self.write_rows()?;
        if let Some(stored) = rows.first() {
            if stored.embedding.len() != dimension {
                return Err(RagError::Validation(format!(
                    "embedding dimension {} does not match stored dimension {}",
                    dimension,
                    stored.embedding.len()
                )));
            }
        }

        let incoming: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        rows.retain(|row| !incoming.contains(&row.id));
        let count = records.len();
        rows.extend(records);

        debug!("Stored {} chunks for document {}", count, document_id);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
        let rows = self.read_rows()?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        if vector.len() != rows[0].embedding.len() {
            return Err(RagError::Validation(format!(
                "query dimension {} does not match stored dimension {}",
                vector.len(),
                rows[0].embedding.len()
            )));
        }

        let mut hits: Vec<ChunkHit> = rows
            .iter()
            .map(|row| ChunkHit {
                text: row.text.clone(),
                metadata: row.metadata.clone(),
                distance: cosine_distance(vector, &row.embedding),
            })
            .collect();

        // Stable sort keeps insertion order for equal distances
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);

        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        let mut rows = self.write_rows()?;
        let before = rows.len();
        rows.retain(|row| row.metadata.document_id != document_id);

        debug!(
            "Deleted {} chunks for document {}",
            before - rows.len(),
            document_id
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read_rows()?.len() as u64)
    }
}
