use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docqa::Result;
use docqa::commands::{add_document, ask, configure, delete_document, show_status};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Document search and question answering over a local vector index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a text document into the index
    Add {
        /// Path to the document file
        file: PathBuf,
        /// Optional title, defaults to the file name
        #[arg(long)]
        title: Option<String>,
    },
    /// Ask a question against the indexed documents
    Ask {
        /// The question to answer
        question: String,
        /// Number of context chunks to retrieve
        #[arg(long, default_value_t = 3)]
        limit: usize,
        /// Emit the answer as newline-delimited JSON frames
        #[arg(long)]
        stream: bool,
    },
    /// Delete a document and all of its chunks
    Delete {
        /// Document ID to delete
        document_id: String,
    },
    /// Show index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            configure(show)?;
        }
        Commands::Add { file, title } => {
            add_document(&file, title).await?;
        }
        Commands::Ask {
            question,
            limit,
            stream,
        } => {
            ask(&question, limit, stream).await?;
        }
        Commands::Delete { document_id } => {
            delete_document(&document_id).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
