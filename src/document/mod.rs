// Document data model
// Documents are created once at ingestion and never mutated; re-uploading
// produces a new document id.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RagError, Result};

/// Scalar metadata attached to documents and carried onto their chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Source format of an ingested document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Docx,
    Txt,
}

impl DocType {
    pub const SUPPORTED_EXTENSIONS: [&'static str; 3] = ["pdf", "docx", "txt"];

    /// Resolve a document type from a file path extension.
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" => Ok(Self::Txt),
            _ => Err(RagError::Validation(format!(
                "Unsupported file format. Supported formats: {}",
                Self::SUPPORTED_EXTENSIONS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for DocType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        };
        f.write_str(name)
    }
}

/// A document with extracted text content, ready for chunking and indexing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a fresh id and current timestamps.
    #[inline]
    pub fn new(title: String, content: String, doc_type: DocType, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            doc_type,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReceipt {
    pub filename: String,
    pub size: u64,
    pub document_id: String,
    pub chunk_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_from_path() {
        assert_eq!(
            DocType::from_path(Path::new("report.PDF")).expect("pdf should parse"),
            DocType::Pdf
        );
        assert_eq!(
            DocType::from_path(Path::new("notes.txt")).expect("txt should parse"),
            DocType::Txt
        );
        assert_eq!(
            DocType::from_path(Path::new("a/b/letter.docx")).expect("docx should parse"),
            DocType::Docx
        );
    }

    #[test]
    fn unsupported_extension_is_validation_error() {
        let err = DocType::from_path(Path::new("image.png")).expect_err("png is unsupported");
        assert!(matches!(err, RagError::Validation(_)));
        assert!(err.to_string().contains("pdf, docx, txt"));

        let err = DocType::from_path(Path::new("no_extension")).expect_err("missing extension");
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[test]
    fn new_documents_get_distinct_ids() {
        let a = Document::new(
            "a".to_string(),
            "content".to_string(),
            DocType::Txt,
            Metadata::new(),
        );
        let b = Document::new(
            "b".to_string(),
            "content".to_string(),
            DocType::Txt,
            Metadata::new(),
        );
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }
}
