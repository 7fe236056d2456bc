use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, get_base_dir};
use crate::document::{DocType, Document, IngestReceipt, Metadata};
use crate::index::VectorIndex;
use crate::index::lancedb::LanceDbIndex;
use crate::ollama::OllamaClient;
use crate::rag::{Generator, RagService};
use crate::retriever::{Embedder, Retriever};

/// Show or initialize the configuration file
#[inline]
pub fn configure(show: bool) -> Result<()> {
    let base_dir = get_base_dir()?;
    let config = Config::load(&base_dir)?;

    if show {
        let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
        println!("# {}", config.config_file_path().display());
        print!("{}", rendered);
        return Ok(());
    }

    if !config.config_file_path().exists() {
        config.save()?;
        println!("Wrote default config to {}", config.config_file_path().display());
    } else {
        println!("Config file: {}", config.config_file_path().display());
    }
    println!("Edit the file and rerun commands to pick up changes.");

    Ok(())
}

/// Ingest a text file into the index
#[inline]
pub async fn add_document(file: &Path, title: Option<String>) -> Result<()> {
    if !file.exists() {
        return Err(crate::RagError::NotFound(format!("Document not found: {}", file.display())).into());
    }

    let doc_type = DocType::from_path(file)?;
    if doc_type != DocType::Txt {
        anyhow::bail!(
            "Text extraction for {} files is not built in; extract the text externally and ingest it as .txt",
            doc_type
        );
    }

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size = std::fs::metadata(file)
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    });

    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), serde_json::json!(filename));
    metadata.insert("size".to_string(), serde_json::json!(size));

    let document = Document::new(title, content, doc_type, metadata);

    let service = build_service().await?;
    let chunk_count = service.retriever().ingest(&document).await?;

    let receipt = IngestReceipt {
        filename,
        size,
        document_id: document.id,
        chunk_count,
    };

    println!("Ingested {} ({} bytes)", receipt.filename, receipt.size);
    println!("  Document ID: {}", receipt.document_id);
    println!("  Chunks indexed: {}", receipt.chunk_count);

    Ok(())
}

/// Answer a question from the indexed documents
#[inline]
pub async fn ask(question: &str, limit: usize, stream: bool) -> Result<()> {
    let service = build_service().await?;

    if stream {
        let mut streamer = service.answer_stream(question, limit).await?;
        while let Some(frame) = streamer.next_frame().await {
            let frame = frame?;
            print!("{}", frame.to_ndjson_line()?);
        }
        return Ok(());
    }

    let response = service.answer(question, limit).await?;

    println!("{}", response.answer.trim());
    if !response.context.is_empty() {
        println!();
        println!("Sources:");
        for result in &response.context {
            println!(
                "  [{:.2}] {} (chunk {})",
                result.score, result.document.title, result.document.chunk_index
            );
        }
    }

    Ok(())
}

/// Delete a document and all of its chunks
#[inline]
pub async fn delete_document(document_id: &str) -> Result<()> {
    let base_dir = get_base_dir()?;
    let config = Config::load(&base_dir)?;

    let index = LanceDbIndex::new(&config).await?;
    index.delete_by_document(document_id).await?;

    println!("Deleted document {}", document_id);
    Ok(())
}

/// Show index status
#[inline]
pub async fn show_status() -> Result<()> {
    let base_dir = get_base_dir()?;
    let config = Config::load(&base_dir)?;

    let index = LanceDbIndex::new(&config).await?;
    let chunk_count = index.count().await?;

    println!("Index directory: {}", config.vector_database_path().display());
    println!("Indexed chunks: {}", chunk_count);
    println!(
        "Ollama: {} (embedding: {}, generation: {})",
        config.ollama.base_url()?,
        config.ollama.embedding_model,
        config.generation.model
    );

    Ok(())
}

/// Build the process-lifetime service stack: config, Ollama client,
/// vector index, retriever, and RAG service.
async fn build_service() -> Result<RagService> {
    let base_dir = get_base_dir()?;
    let config = Config::load(&base_dir)?;

    let client = OllamaClient::new(&config).context("Failed to initialize Ollama client")?;

    let health_client = client.clone();
    tokio::task::spawn_blocking(move || health_client.health_check())
        .await
        .context("Health check task failed")?
        .context("Ollama server is not available")?;

    let index = Arc::new(
        LanceDbIndex::new(&config)
            .await
            .context("Failed to initialize vector index")?,
    );

    info!("Service stack initialized (base dir: {})", base_dir.display());

    let client = Arc::new(client);
    let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
    let generator = Arc::clone(&client) as Arc<dyn Generator>;
    let retriever = Arc::new(Retriever::new(index, embedder, &config));
    Ok(RagService::new(retriever, generator))
}
