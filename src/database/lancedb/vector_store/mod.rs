#[cfg(test)]
mod tests;

use super::{ChunkRecord, StoredHit, quote_literal};
use crate::GatewayError;
use crate::config::Config;
use crate::metadata::Metadata;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A named, persistent collection of chunk embeddings backed by a LanceDB table
pub struct ChunkCollection {
    connection: Connection,
    table: Table,
    name: String,
    vector_dimension: usize,
}

impl ChunkCollection {
    /// Open the collection named in `config`, creating it if it does not exist
    ///
    /// A new collection uses `ollama.embedding_dimension` for its vector
    /// column; an existing one keeps the dimension it was created with.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self, GatewayError> {
        let db_path = Self::get_vector_db_path(config);
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            GatewayError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            GatewayError::Database(format!("Failed to connect to LanceDB: {}", e))
        })?;

        Self::open_or_create(
            connection,
            &config.collection.name,
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    fn get_vector_db_path(config: &Config) -> PathBuf {
        config.vector_database_path()
    }

    async fn open_or_create(
        connection: Connection,
        name: &str,
        default_dimension: usize,
    ) -> Result<Self, GatewayError> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|t| t == name) {
            debug!("Collection {} already exists, opening it", name);
            connection
                .open_table(name)
                .execute()
                .await
                .map_err(|e| {
                    GatewayError::Database(format!("Failed to open collection {}: {}", name, e))
                })?
        } else {
            info!(
                "Creating collection {} with {} dimensions",
                name, default_dimension
            );
            connection
                .create_empty_table(name, Self::create_schema(default_dimension))
                .execute()
                .await
                .map_err(|e| {
                    GatewayError::Database(format!("Failed to create collection {}: {}", name, e))
                })?
        };

        let vector_dimension = Self::detect_vector_dimension(&table).await?;
        info!(
            "Collection {} ready ({} dimensions)",
            name, vector_dimension
        );

        Ok(Self {
            connection,
            table,
            name: name.to_string(),
            vector_dimension,
        })
    }

    /// Detect vector dimension from the table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize, GatewayError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(GatewayError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document", DataType::Utf8, true),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("chunk_type", DataType::Utf8, false),
            Field::new("page", DataType::Int64, false),
            Field::new("file_hash", DataType::Utf8, true),
            Field::new("image_uri", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Insert records, replacing any existing rows with the same ids
    ///
    /// Not atomic: matching rows are deleted first and the new rows added
    /// afterwards, so a failed add leaves the replaced ids absent. The batch is
    /// built and checked (unique ids, vector dimension) before anything is
    /// deleted.
    #[inline]
    pub async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), GatewayError> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.id.as_str())) {
            return Err(GatewayError::DuplicateId(duplicate.id.clone()));
        }

        debug!("Upserting batch of {} records", records.len());

        let record_batch = self.create_record_batch(records)?;

        let id_list = records
            .iter()
            .map(|r| quote_literal(&r.id))
            .collect::<Vec<_>>()
            .join(", ");
        self.table
            .delete(&format!("id IN ({})", id_list))
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to replace records: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to insert records: {}", e)))?;

        info!(
            "Stored {} records in collection {}",
            records.len(),
            self.name
        );
        Ok(())
    }

    /// Create a RecordBatch from chunk records
    fn create_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch, GatewayError> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut documents = Vec::with_capacity(len);
        let mut doc_ids = Vec::with_capacity(len);
        let mut chunk_types = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut file_hashes = Vec::with_capacity(len);
        let mut image_uris = Vec::with_capacity(len);
        let mut metadatas = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            if record.vector.len() != vector_dim {
                return Err(GatewayError::Database(format!(
                    "Embedding dimension mismatch for {}: collection {} expects {}, got {}",
                    record.id,
                    self.name,
                    vector_dim,
                    record.vector.len()
                )));
            }

            let metadata_json = serde_json::to_string(&record.metadata).map_err(|e| {
                GatewayError::Database(format!(
                    "Failed to serialize metadata for {}: {}",
                    record.id, e
                ))
            })?;

            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            documents.push(record.document.as_deref());
            doc_ids.push(record.doc_id.as_str());
            chunk_types.push(record.chunk_type.as_str());
            pages.push(record.page);
            file_hashes.push(record.file_hash.as_deref());
            image_uris.push(record.image_uri.as_deref());
            metadatas.push(metadata_json);
            created_ats.push(record.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    GatewayError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(documents)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(chunk_types)),
            Arc::new(Int64Array::from(pages)),
            Arc::new(StringArray::from(file_hashes)),
            Arc::new(StringArray::from(image_uris)),
            Arc::new(StringArray::from(metadatas)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| GatewayError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Whether any row matches the filter predicate, looking at one row at most
    #[inline]
    pub async fn exists(&self, predicate: &str) -> Result<bool, GatewayError> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(predicate)
            .select(Select::columns(&["id"]))
            .limit(1)
            .execute()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to execute lookup: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to read lookup results: {}", e)))?;

        Ok(batches.iter().any(|b| b.num_rows() > 0))
    }

    /// Ids of every row matching the filter predicate
    #[inline]
    pub async fn ids_matching(&self, predicate: &str) -> Result<Vec<String>, GatewayError> {
        let matching = self
            .table
            .count_rows(Some(predicate.to_string()))
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to count rows: {}", e)))?;

        if matching == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(predicate)
            .select(Select::columns(&["id"]))
            .limit(matching)
            .execute()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to execute lookup: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to read lookup results: {}", e)))?;

        let mut ids = Vec::with_capacity(matching);
        for batch in &batches {
            let id_column = string_column(batch, "id")?;
            for row in 0..batch.num_rows() {
                if id_column.is_valid(row) {
                    ids.push(id_column.value(row).to_string());
                }
            }
        }

        Ok(ids)
    }

    /// Search for the rows nearest to `query_vector` by cosine distance
    ///
    /// # Arguments
    /// * `query_vector` - The query vector to search for
    /// * `limit` - Maximum number of results to return
    /// * `filter` - Optional SQL predicate restricting the candidate rows
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<StoredHit>, GatewayError> {
        if query_vector.len() != self.vector_dimension {
            return Err(GatewayError::Database(format!(
                "Query embedding dimension mismatch: collection {} expects {}, got {}",
                self.name,
                self.vector_dimension,
                query_vector.len()
            )));
        }

        debug!("Searching collection {} with limit {}", self.name, limit);

        let mut query = self
            .table
            .vector_search(query_vector)
            .map_err(|e| GatewayError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(predicate) = filter {
            query = query.only_if(predicate);
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", hits.len());
        Ok(hits)
    }

    /// Delete a single row by id
    #[inline]
    pub async fn delete_id(&self, id: &str) -> Result<(), GatewayError> {
        self.table
            .delete(&format!("id = {}", quote_literal(id)))
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to delete {}: {}", id, e)))
    }

    /// Get the total number of rows stored
    #[inline]
    pub async fn count(&self) -> Result<usize, GatewayError> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Drop the collection and everything stored in it
    #[inline]
    pub async fn drop_collection(self) -> Result<(), GatewayError> {
        warn!("Dropping collection {}", self.name);
        self.connection.drop_table(&self.name).await.map_err(|e| {
            GatewayError::Database(format!("Failed to drop collection {}: {}", self.name, e))
        })?;
        info!("Collection {} dropped", self.name);
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, GatewayError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| GatewayError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| GatewayError::Database(format!("Invalid {} column type", name)))
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<StoredHit>, GatewayError> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document")?;
    let metadatas = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| GatewayError::Database("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| GatewayError::Database("Invalid _distance column type".to_string()))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if ids.is_null(row) || distances.is_null(row) {
            warn!("Skipping search result row {} without id or distance", row);
            continue;
        }

        let id = ids.value(row).to_string();
        let metadata: Metadata = if metadatas.is_null(row) {
            Metadata::new()
        } else {
            serde_json::from_str(metadatas.value(row)).map_err(|e| {
                GatewayError::Database(format!("Malformed metadata for {}: {}", id, e))
            })?
        };

        hits.push(StoredHit {
            document: (!documents.is_null(row)).then(|| documents.value(row).to_string()),
            metadata,
            distance: distances.value(row),
            id,
        });
    }

    Ok(hits)
}
