// Chunking module
// Splits document text into overlapping word windows ready for embedding


use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

/// Configuration for word-window chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of words per chunk
    pub chunk_size: usize,
    /// Number of words shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Validate the window parameters. An overlap equal to or larger than
    /// the chunk size would produce a non-advancing window.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Window advance in words between consecutive chunks.
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Split `text` into overlapping word-window chunks.
///
/// Words are whitespace-delimited tokens. Each chunk holds up to
/// `chunk_size` consecutive words and consecutive windows advance by
/// `chunk_size - chunk_overlap` words, so the last `chunk_overlap` words
/// of a chunk reappear at the start of the next one. Chunk text is the
/// words re-joined with single spaces; the final chunk may be shorter
/// than `chunk_size`. Empty or whitespace-only input produces no chunks.
#[inline]
pub fn chunk_words(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let stride = config.stride();
    let mut chunks = Vec::with_capacity(words.len().div_ceil(stride));

    let mut start = 0;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }

    Ok(chunks)
}
