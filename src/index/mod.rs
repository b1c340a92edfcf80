// Document index module
// Gateway between extracted chunks, the embedder and the vector collection


use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::chunks::{Chunk, ChunkType, split_oversized_chunks};
use crate::config::Config;
use crate::database::lancedb::quote_literal;
use crate::database::{ChunkCollection, ChunkRecord, StoredHit};
use crate::embeddings::Embedder;
use crate::metadata::{Metadata, MetadataValue, clean_metadata};
use crate::{GatewayError, Result};

/// Page number stored for chunks without one
pub const UNKNOWN_PAGE: i64 = -1;

/// A similarity search over the collection
///
/// At least one of `text` or `embedding` must be set. When both are set the
/// text is embedded and the precomputed embedding is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// Restrict results to chunks of one document
    pub document_id: Option<String>,
    /// Restrict results to these chunk types; empty means all types
    pub filter_types: Vec<ChunkType>,
    /// Number of results; falls back to the configured default
    pub top_k: Option<usize>,
}

impl QueryRequest {
    #[inline]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[inline]
    pub fn embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    #[inline]
    pub fn with_types(mut self, types: impl IntoIterator<Item = ChunkType>) -> Self {
        self.filter_types = types.into_iter().collect();
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// One chunk returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub id: String,
    /// Stored document text, or the image caption when no text was stored
    pub content: String,
    pub metadata: Metadata,
    /// Similarity, `1 - distance`
    pub score: f32,
    pub distance: f32,
}

impl QueryResult {
    fn from_hit(hit: StoredHit) -> Option<Self> {
        let content = hit
            .document
            .filter(|d| !d.trim().is_empty())
            .or_else(|| {
                hit.metadata
                    .get("caption")
                    .and_then(MetadataValue::as_str)
                    .filter(|c| !c.trim().is_empty())
                    .map(str::to_string)
            });

        let Some(content) = content else {
            warn!("Skipping result {} with no content or caption", hit.id);
            return None;
        };

        Some(Self {
            id: hit.id,
            content,
            metadata: hit.metadata,
            score: 1.0 - hit.distance,
            distance: hit.distance,
        })
    }

    /// The document this chunk belongs to
    #[inline]
    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get("doc_id").and_then(MetadataValue::as_str)
    }
}

/// A chunk ready to be embedded and written
struct PendingRow {
    id: String,
    embed_text: String,
    document: Option<String>,
    chunk_type: ChunkType,
    page: i64,
    image_uri: Option<String>,
    metadata: Metadata,
}

/// Gateway over a persistent chunk collection and an embedder
pub struct DocumentIndex<E> {
    collection: ChunkCollection,
    embedder: E,
    max_chunk_length: usize,
    default_top_k: usize,
    top_documents: usize,
}

impl<E: Embedder> DocumentIndex<E> {
    /// Open (or create) the configured collection
    #[inline]
    pub async fn open(config: &Config, embedder: E) -> Result<Self> {
        let collection = ChunkCollection::open(config).await?;
        Ok(Self {
            collection,
            embedder,
            max_chunk_length: config.collection.max_chunk_length,
            default_top_k: config.collection.default_top_k,
            top_documents: config.collection.top_documents,
        })
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    #[inline]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[inline]
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Whether a file with this content hash has already been indexed
    #[inline]
    pub async fn contains_hash(&self, file_hash: &str) -> Result<bool> {
        let found = self
            .collection
            .exists(&format!("file_hash = {}", quote_literal(file_hash)))
            .await?;
        debug!("Hash {} present: {}", file_hash, found);
        Ok(found)
    }

    /// Embed and store the chunks of one document
    ///
    /// Returns the number of rows written. Failures are logged and returned.
    #[inline]
    pub async fn add_documents(
        &self,
        chunks: Vec<Chunk>,
        document_id: &str,
        file_hash: Option<&str>,
    ) -> Result<usize> {
        match self.try_add_documents(chunks, document_id, file_hash).await {
            Ok(written) => Ok(written),
            Err(e) => {
                error!("Failed to add chunks for document {}: {}", document_id, e);
                Err(e)
            }
        }
    }

    async fn try_add_documents(
        &self,
        chunks: Vec<Chunk>,
        document_id: &str,
        file_hash: Option<&str>,
    ) -> Result<usize> {
        let prepared = self.prepare_chunks(chunks);
        let rows = build_pending_rows(prepared, document_id, file_hash);

        if rows.is_empty() {
            warn!("No embeddable chunks for document {}", document_id);
            return Ok(0);
        }

        let texts: Vec<String> = rows.iter().map(|r| r.embed_text.clone()).collect();
        debug!(
            "Embedding {} chunks for document {}",
            texts.len(),
            document_id
        );
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .map_err(|e| GatewayError::Embedding(format!("{:#}", e)))?;

        let records = assemble_records(rows, embeddings, document_id, file_hash)?;

        self.collection.upsert(&records).await?;

        info!(
            "Added {} chunks for document {} to {}",
            records.len(),
            document_id,
            self.collection.name()
        );
        Ok(records.len())
    }

    /// Split oversized text and table chunks; image chunks pass through
    fn prepare_chunks(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut prepared = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.chunk_type == ChunkType::Image {
                prepared.push(chunk);
            } else {
                prepared.extend(split_oversized_chunks(vec![chunk], self.max_chunk_length));
            }
        }
        prepared
    }

    /// Search the collection for the chunks nearest to the request
    #[inline]
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResult>> {
        let top_k = self.resolve_top_k(request.top_k)?;
        let query_vector = self.resolve_query_vector(request)?;
        let filter = build_filter(request.document_id.as_deref(), &request.filter_types);
        debug!("Query filter: {:?}", filter);

        let results = self
            .search_results(&query_vector, top_k, filter.as_deref())
            .await?;
        debug!("Query returned {} results", results.len());
        Ok(results)
    }

    /// Two-stage retrieval: choose documents, then merge their nearest chunks
    ///
    /// The documents searched are `document_ids` plus `request.document_id`.
    /// When neither names one, the documents owning the nearest
    /// `top_documents` chunks are used, best match first. Each document is
    /// searched for its own `top_k` chunks; the union is ordered by score and
    /// cut to `top_k`. Type filters apply to both stages.
    #[inline]
    pub async fn retrieve(
        &self,
        request: &QueryRequest,
        document_ids: &[String],
    ) -> Result<Vec<QueryResult>> {
        let top_k = self.resolve_top_k(request.top_k)?;
        let query_vector = self.resolve_query_vector(request)?;

        let mut documents: Vec<String> = Vec::new();
        for id in document_ids.iter().chain(request.document_id.as_ref()) {
            if !documents.contains(id) {
                documents.push(id.clone());
            }
        }

        if documents.is_empty() {
            let type_filter = build_filter(None, &request.filter_types);
            documents = self
                .rank_documents(&query_vector, self.top_documents, type_filter.as_deref())
                .await?;
            info!("Top matching documents: {:?}", documents);
        } else {
            info!("Retrieving from requested documents: {:?}", documents);
        }

        let mut chunks = Vec::new();
        for doc_id in &documents {
            let filter = build_filter(Some(doc_id), &request.filter_types);
            chunks.extend(
                self.search_results(&query_vector, top_k, filter.as_deref())
                    .await?,
            );
        }

        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        chunks.truncate(top_k);
        debug!(
            "Selected {} chunks from {} documents",
            chunks.len(),
            documents.len()
        );
        Ok(chunks)
    }

    fn resolve_top_k(&self, requested: Option<usize>) -> Result<usize> {
        match requested.unwrap_or(self.default_top_k) {
            0 => Err(GatewayError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            )),
            top_k => Ok(top_k),
        }
    }

    async fn search_results(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<QueryResult>> {
        let hits = self.collection.search(vector, limit, filter).await?;
        Ok(hits.into_iter().filter_map(QueryResult::from_hit).collect())
    }

    fn resolve_query_vector(&self, request: &QueryRequest) -> Result<Vec<f32>> {
        if let Some(text) = request.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return self
                .embedder
                .embed_query(text)
                .map_err(|e| GatewayError::Embedding(format!("{:#}", e)));
        }

        match &request.embedding {
            Some(embedding) if !embedding.is_empty() => Ok(embedding.clone()),
            Some(_) => Err(GatewayError::InvalidQuery(
                "query embedding is empty".to_string(),
            )),
            None => Err(GatewayError::InvalidQuery(
                "either query text or a query embedding is required".to_string(),
            )),
        }
    }

    /// Distinct document ids among the `top_k` nearest chunks, nearest first
    #[inline]
    pub async fn retrieve_relevant_documents(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<String>> {
        if embedding.is_empty() {
            return Err(GatewayError::InvalidQuery(
                "query embedding is empty".to_string(),
            ));
        }
        let top_k = self.resolve_top_k(Some(top_k))?;

        self.rank_documents(embedding, top_k, None).await
    }

    /// Distinct document ids among the nearest hits; hits arrive nearest first
    async fn rank_documents(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<String>> {
        let hits = self.collection.search(vector, limit, filter).await?;

        let mut documents: Vec<String> = Vec::new();
        for hit in &hits {
            match hit.metadata.get("doc_id").and_then(MetadataValue::as_str) {
                Some(doc_id) if !documents.iter().any(|d| d == doc_id) => {
                    documents.push(doc_id.to_string());
                }
                Some(_) => {}
                None => warn!("Result {} has no doc_id", hit.id),
            }
        }

        Ok(documents)
    }

    /// Remove every chunk of a document; returns whether any were found
    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let ids = self
            .collection
            .ids_matching(&format!("doc_id = {}", quote_literal(document_id)))
            .await?;

        if ids.is_empty() {
            warn!("No chunks found for document {}", document_id);
            return Ok(false);
        }

        for id in &ids {
            self.collection.delete_id(id).await?;
        }

        info!("Deleted {} chunks of document {}", ids.len(), document_id);
        Ok(true)
    }

    /// Number of rows in the collection
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.collection.count().await
    }

    /// Drop the collection with everything in it
    #[inline]
    pub async fn drop_collection(self) -> Result<()> {
        self.collection.drop_collection().await
    }
}

/// Assign ids, pick embedding text and assemble metadata for each chunk
fn build_pending_rows(
    chunks: Vec<Chunk>,
    document_id: &str,
    file_hash: Option<&str>,
) -> Vec<PendingRow> {
    let mut rows = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        let id = chunk
            .id
            .clone()
            .unwrap_or_else(|| format!("{}_chunk_{}", document_id, index));

        let (embed_text, document, image_uri) = if chunk.chunk_type == ChunkType::Image {
            let Some(surrogate) = chunk.text_surrogate() else {
                warn!("Skipping image chunk {} with no caption or filename", id);
                continue;
            };
            let document = (!chunk.content.trim().is_empty()).then(|| chunk.content.clone());
            let image_uri = chunk.image_reference().map(str::to_string);
            (surrogate, document, image_uri)
        } else {
            if chunk.content.trim().is_empty() {
                warn!("Skipping empty {} chunk {}", chunk.chunk_type, id);
                continue;
            }
            (chunk.content.clone(), Some(chunk.content.clone()), None)
        };

        let page = chunk.page_number.map_or(UNKNOWN_PAGE, i64::from);
        let mut metadata = row_metadata(&chunk, document_id, page, file_hash);

        // An image stored without text is returned through its caption
        if document.is_none() && !has_caption(&metadata) {
            metadata.insert("caption".to_string(), embed_text.as_str().into());
        }

        rows.push(PendingRow {
            id,
            embed_text,
            document,
            chunk_type: chunk.chunk_type,
            page,
            image_uri,
            metadata,
        });
    }

    rows
}

/// Pair rows with their embeddings, checking every column has the same length
/// and that ids are unique
fn assemble_records(
    rows: Vec<PendingRow>,
    embeddings: Vec<Vec<f32>>,
    document_id: &str,
    file_hash: Option<&str>,
) -> Result<Vec<ChunkRecord>> {
    let mut ids = Vec::with_capacity(rows.len());
    let mut documents = Vec::with_capacity(rows.len());
    let mut metadatas = Vec::with_capacity(rows.len());
    let mut details = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(row.id);
        documents.push(row.document);
        metadatas.push(row.metadata);
        details.push((row.chunk_type, row.page, row.image_uri));
    }

    if ids.len() != documents.len()
        || ids.len() != embeddings.len()
        || ids.len() != metadatas.len()
    {
        return Err(GatewayError::BatchMismatch {
            ids: ids.len(),
            documents: documents.len(),
            embeddings: embeddings.len(),
            metadatas: metadatas.len(),
        });
    }

    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(GatewayError::DuplicateId(duplicate.clone()));
    }

    let created_at = Utc::now().to_rfc3339();
    let records = ids
        .into_iter()
        .zip(documents)
        .zip(embeddings)
        .zip(metadatas)
        .zip(details)
        .map(
            |((((id, document), vector), metadata), (chunk_type, page, image_uri))| ChunkRecord {
                id,
                vector,
                document,
                doc_id: document_id.to_string(),
                chunk_type,
                page,
                file_hash: file_hash.map(str::to_string),
                image_uri,
                metadata,
                created_at: created_at.clone(),
            },
        )
        .collect();

    Ok(records)
}

fn has_caption(metadata: &Metadata) -> bool {
    metadata
        .get("caption")
        .and_then(MetadataValue::as_str)
        .is_some_and(|c| !c.trim().is_empty())
}

fn row_metadata(chunk: &Chunk, document_id: &str, page: i64, file_hash: Option<&str>) -> Metadata {
    let mut metadata = chunk
        .metadata
        .as_ref()
        .map(clean_metadata)
        .unwrap_or_default();

    metadata.insert("type".to_string(), chunk.chunk_type.as_str().into());
    metadata.insert("page".to_string(), page.into());
    metadata.insert("doc_id".to_string(), document_id.into());
    if let Some(hash) = file_hash {
        metadata.insert("file_hash".to_string(), hash.into());
    }

    metadata
}

/// Build the search predicate for a document id and chunk types
#[inline]
pub fn build_filter(document_id: Option<&str>, types: &[ChunkType]) -> Option<String> {
    let mut clauses = Vec::new();

    if let Some(doc_id) = document_id {
        clauses.push(format!("doc_id = {}", quote_literal(doc_id)));
    }

    if !types.is_empty() {
        let list = types
            .iter()
            .map(|t| quote_literal(t.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("chunk_type IN ({})", list));
    }

    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

/// Lowercase hex SHA-256 of file contents
#[inline]
pub fn compute_file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
