use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunks::{Chunk, ChunkType};
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::{DocumentIndex, QueryRequest, QueryResult, compute_file_hash};

/// Number of hex characters of the file hash used as a default document id
const HASH_ID_LENGTH: usize = 16;

async fn open_index(config: &Config) -> Result<DocumentIndex<OllamaClient>> {
    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    DocumentIndex::open(config, client)
        .await
        .context("Failed to open document collection")
}

/// Read a JSON array of chunks from disk
#[inline]
pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunks file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse chunks file: {}", path.display()))
}

/// Pick the document id: explicit, else derived from the file hash, else random
#[inline]
pub fn resolve_document_id(explicit: Option<&str>, file_hash: Option<&str>) -> String {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    file_hash.map_or_else(
        || Uuid::new_v4().to_string(),
        |hash| hash.chars().take(HASH_ID_LENGTH).collect(),
    )
}

/// Index the chunks in `chunks_path` as one document
#[inline]
pub async fn add_document(
    config: &Config,
    chunks_path: &Path,
    document_id: Option<&str>,
    source: Option<&Path>,
) -> Result<()> {
    let chunks = read_chunks(chunks_path)?;
    if chunks.is_empty() {
        println!("No chunks found in {}", chunks_path.display());
        return Ok(());
    }

    let file_hash = match source {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?;
            Some(compute_file_hash(&bytes))
        }
        None => None,
    };

    let index = open_index(config).await?;

    if let Some(hash) = file_hash.as_deref() {
        if index.contains_hash(hash).await? {
            println!(
                "{}",
                style(format!("Document already indexed (hash {})", hash)).yellow()
            );
            return Ok(());
        }
    }

    let document_id = resolve_document_id(document_id, file_hash.as_deref());
    info!(
        "Adding {} chunks as document {}",
        chunks.len(),
        document_id
    );

    let written = index
        .add_documents(chunks, &document_id, file_hash.as_deref())
        .await?;

    println!(
        "{} Added {} chunks to {} as document {}",
        style("✓").green(),
        written,
        index.collection_name(),
        style(&document_id).cyan()
    );
    if let Some(hash) = file_hash {
        println!("  File hash: {}", hash);
    }

    Ok(())
}

/// Search for the chunks most similar to `text`
#[inline]
pub async fn query_chunks(
    config: &Config,
    text: &str,
    document_id: Option<&str>,
    types: &[ChunkType],
    top_k: Option<usize>,
) -> Result<()> {
    let index = open_index(config).await?;

    let mut request = QueryRequest::text(text).with_types(types.iter().copied());
    if let Some(doc_id) = document_id {
        request = request.with_document_id(doc_id);
    }
    if let Some(k) = top_k {
        request = request.with_top_k(k);
    }

    let results = index.query(&request).await?;
    if results.is_empty() {
        println!("No matching chunks found.");
        return Ok(());
    }

    println!("Found {} chunks:", results.len());
    println!();
    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }

    Ok(())
}

/// Two-stage retrieval: best documents first, then their best chunks
#[inline]
pub async fn retrieve_chunks(
    config: &Config,
    text: &str,
    document_ids: &[String],
    types: &[ChunkType],
    top_k: Option<usize>,
) -> Result<()> {
    let index = open_index(config).await?;

    let mut request = QueryRequest::text(text).with_types(types.iter().copied());
    if let Some(k) = top_k {
        request = request.with_top_k(k);
    }

    let results = index.retrieve(&request, document_ids).await?;
    if results.is_empty() {
        println!("No matching chunks found.");
        return Ok(());
    }

    let mut sources: Vec<&str> = Vec::new();
    for doc_id in results.iter().filter_map(QueryResult::doc_id) {
        if !sources.contains(&doc_id) {
            sources.push(doc_id);
        }
    }

    println!(
        "Retrieved {} chunks from {}:",
        results.len(),
        style(sources.join(", ")).cyan()
    );
    println!();
    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }

    Ok(())
}

fn print_result(rank: usize, result: &QueryResult) {
    let chunk_type = result
        .metadata
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("text");
    let page = result
        .metadata
        .get("page")
        .and_then(|v| v.as_i64())
        .filter(|p| *p >= 0);

    print!(
        "{}. {} [{}] score {:.3}",
        rank,
        style(&result.id).cyan(),
        chunk_type,
        result.score
    );
    if let Some(doc_id) = result.doc_id() {
        print!(" doc {}", doc_id);
    }
    if let Some(page) = page {
        print!(" page {}", page);
    }
    println!();
    println!("   {}", preview(&result.content, 200));
    println!();
}

/// Single-line preview of at most `max_chars` characters
fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let truncated: String = flat.chars().take(max_chars).collect();
        format!("{}…", truncated)
    }
}

/// List the documents whose chunks are most similar to `text`
#[inline]
pub async fn find_documents(config: &Config, text: &str, top_k: Option<usize>) -> Result<()> {
    let index = open_index(config).await?;

    let embedding = index
        .embedder()
        .embed_query(text)
        .context("Failed to embed query text")?;
    let top_k = top_k.unwrap_or_else(|| index.default_top_k());

    let documents = index.retrieve_relevant_documents(&embedding, top_k).await?;
    if documents.is_empty() {
        println!("No matching documents found.");
        return Ok(());
    }

    println!("Relevant documents:");
    for doc_id in &documents {
        println!("  {}", style(doc_id).cyan());
    }

    Ok(())
}

/// Delete every chunk of a document
#[inline]
pub async fn delete_document(config: &Config, document_id: &str) -> Result<()> {
    let index = open_index(config).await?;

    if index.delete_document(document_id).await? {
        println!("{} Deleted document {}", style("✓").green(), document_id);
    } else {
        println!("No chunks found for document {}", document_id);
    }

    Ok(())
}

/// Report whether a file hash has been indexed
#[inline]
pub async fn check_hash(config: &Config, file_hash: &str) -> Result<()> {
    let index = open_index(config).await?;

    if index.contains_hash(file_hash).await? {
        println!("Indexed: {}", file_hash);
    } else {
        println!("Not indexed: {}", file_hash);
    }

    Ok(())
}

/// Print the number of stored chunks
#[inline]
pub async fn show_count(config: &Config) -> Result<()> {
    let index = open_index(config).await?;
    let count = index.count().await?;
    println!("{}: {} chunks", index.collection_name(), count);
    Ok(())
}

/// Drop the collection after confirmation
#[inline]
pub async fn drop_collection(config: &Config, skip_confirmation: bool) -> Result<()> {
    let name = config.collection.name.clone();

    if !skip_confirmation {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Drop collection '{}' and all of its chunks?",
                name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Drop cancelled.");
            return Ok(());
        }
    }

    let index = open_index(config).await?;
    let count = index.count().await?;
    if count == 0 {
        warn!("Collection {} is already empty", name);
    }

    index.drop_collection().await?;
    println!(
        "{} Dropped collection {} ({} chunks)",
        style("✓").green(),
        name,
        count
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_document_id_wins() {
        assert_eq!(
            resolve_document_id(Some("report-2024"), Some("abcdef0123456789abcdef")),
            "report-2024"
        );
    }

    #[test]
    fn document_id_from_hash_prefix() {
        let hash = compute_file_hash(b"contents");
        let id = resolve_document_id(None, Some(&hash));
        assert_eq!(id.len(), HASH_ID_LENGTH);
        assert!(hash.starts_with(&id));

        assert_eq!(resolve_document_id(Some("  "), Some(&hash)), id);
    }

    #[test]
    fn document_id_without_hash_is_uuid() {
        let id = resolve_document_id(None, None);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn reading_chunk_files() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let path = temp_dir.path().join("chunks.json");
        fs::write(
            &path,
            r#"[
                {"content": "Intro", "page": 1},
                {"type": "table", "content": "a | b", "id": "t1"},
                {"type": "image", "uri": "img/fig.png", "metadata": {"caption": "Figure"}},
                {"content": "Unpaged note", "page": -1}
            ]"#,
        )
        .expect("should write chunks");

        let chunks = read_chunks(&path).expect("should parse chunks");
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].chunk_type, ChunkType::Text);
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[1].id.as_deref(), Some("t1"));
        assert_eq!(chunks[2].chunk_type, ChunkType::Image);
        assert_eq!(chunks[2].image_reference(), Some("img/fig.png"));
        assert_eq!(chunks[3].page_number, None);
    }

    #[test]
    fn reading_invalid_chunk_file_fails() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let path = temp_dir.path().join("chunks.json");
        fs::write(&path, "{not json").expect("should write file");

        assert!(read_chunks(&path).is_err());
        assert!(read_chunks(&temp_dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc", 10), "a b c");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
