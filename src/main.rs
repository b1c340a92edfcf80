use clap::{Parser, Subcommand};
use doc_gateway::Result;
use doc_gateway::chunks::ChunkType;
use doc_gateway::commands::{
    add_document, check_hash, delete_document, drop_collection, find_documents, query_chunks,
    retrieve_chunks, show_count,
};
use doc_gateway::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "doc-gateway")]
#[command(about = "Embed document chunks into a vector collection and search them")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector database (default: ~/.doc-gateway)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and collection settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed and store the chunks of a document
    Add {
        /// JSON file holding an array of chunks
        chunks: PathBuf,
        /// Document identifier; defaults to a prefix of the source file hash
        #[arg(long)]
        document_id: Option<String>,
        /// Original source file, hashed to skip documents already indexed
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Search for chunks similar to a text query
    Query {
        text: String,
        /// Only return chunks of this document
        #[arg(long)]
        document_id: Option<String>,
        /// Only return chunks of these types (text, table, image)
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<ChunkType>,
        /// Number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Pick the most relevant documents, then merge their best chunks
    Retrieve {
        text: String,
        /// Search these documents instead of ranking them (repeatable)
        #[arg(long = "document-id", value_name = "ID")]
        document_ids: Vec<String>,
        /// Only return chunks of these types (text, table, image)
        #[arg(long = "type", value_name = "TYPE")]
        types: Vec<ChunkType>,
        /// Number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List the documents most relevant to a text query
    Documents {
        text: String,
        /// Number of chunks to consider
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete every chunk of a document
    Delete {
        /// Document identifier
        document_id: String,
    },
    /// Check whether a file hash has been indexed
    Contains {
        /// SHA-256 hex digest of the source file
        hash: String,
    },
    /// Show the number of stored chunks
    Count,
    /// Drop the collection and everything in it
    Drop {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| doc_gateway::GatewayError::Config(e.to_string()))?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&base_dir)?;
        } else {
            run_interactive_config(&base_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Add {
            chunks,
            document_id,
            source,
        } => {
            add_document(&config, &chunks, document_id.as_deref(), source.as_deref()).await?;
        }
        Commands::Query {
            text,
            document_id,
            types,
            top_k,
        } => {
            query_chunks(&config, &text, document_id.as_deref(), &types, top_k).await?;
        }
        Commands::Retrieve {
            text,
            document_ids,
            types,
            top_k,
        } => {
            retrieve_chunks(&config, &text, &document_ids, &types, top_k).await?;
        }
        Commands::Documents { text, top_k } => {
            find_documents(&config, &text, top_k).await?;
        }
        Commands::Delete { document_id } => {
            delete_document(&config, &document_id).await?;
        }
        Commands::Contains { hash } => {
            check_hash(&config, &hash).await?;
        }
        Commands::Count => {
            show_count(&config).await?;
        }
        Commands::Drop { yes } => {
            drop_collection(&config, yes).await?;
        }
    }

    Ok(())
}
