// Configuration management module
// TOML settings for the Ollama backend, chunking, retrieval, and generation

pub mod settings;

pub use settings::{Config, ConfigError, GenerationConfig, OllamaConfig, RetrievalConfig};

/// Get the default base directory for configuration and index data
#[inline]
pub fn get_base_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
