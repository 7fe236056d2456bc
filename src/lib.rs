use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Generation interrupted: {0}")]
    GenerationInterrupted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// HTTP-equivalent status for transports that map errors onto status
    /// codes. Validation and lookup failures are client errors; backend
    /// and generation failures are server errors.
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Backend(_) => 503,
            Self::GenerationInterrupted(_) => 502,
            Self::Config(_) | Self::Io(_) | Self::Other(_) => 500,
        }
    }

    /// True for errors the client caused and can correct.
    #[inline]
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod document;
pub mod index;
pub mod ollama;
pub mod rag;
pub mod retriever;
