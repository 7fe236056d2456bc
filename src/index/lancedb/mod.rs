
use std::sync::Arc;
use std::sync::RwLock;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info, warn};

use super::{ChunkHit, ChunkMetadata, ChunkRecord, VectorIndex};
use crate::config::Config;
use crate::document::Metadata;
use crate::{RagError, Result};

const TABLE_NAME: &str = "chunks";

/// Persistent vector index backed by LanceDB.
///
/// The table is created lazily on the first insert, once the embedding
/// dimension is known; inserting vectors of a different dimension
/// recreates the table. Queries use cosine distance, so the retrieval
/// layer's `1 - distance` score transform holds.
pub struct LanceDbIndex {
    connection: Connection,
    table_name: String,
    vector_dimension: RwLock<Option<usize>>,
}

impl LanceDbIndex {
    /// Open (or create) the index under the configured vectors directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Backend(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to connect to LanceDB: {}", e)))?;

        let index = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: RwLock::new(None),
        };

        if index.table_exists().await? {
            let dimension = index.detect_dimension().await?;
            index.set_dimension(Some(dimension))?;
            info!("Opened chunk table with vector dimension {}", dimension);
        }

        Ok(index)
    }

    fn dimension(&self) -> Result<Option<usize>> {
        self.vector_dimension
            .read()
            .map(|guard| *guard)
            .map_err(|_| RagError::Backend("vector dimension lock poisoned".to_string()))
    }

    fn set_dimension(&self, dimension: Option<usize>) -> Result<()> {
        let mut guard = self
            .vector_dimension
            .write()
            .map_err(|_| RagError::Backend("vector dimension lock poisoned".to_string()))?;
        *guard = dimension;
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    /// Read the vector dimension from the existing table schema
    async fn detect_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Backend(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

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
            Field::new("document_id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("doc_type", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Make sure the table exists with the given vector dimension,
    /// recreating it when the dimension changed.
    async fn ensure_table(&self, vector_dim: usize) -> Result<()> {
        let known = self.dimension()?;
        if known == Some(vector_dim) {
            return Ok(());
        }

        if self.table_exists().await? {
            warn!(
                "Vector dimension changed from {:?} to {}, recreating table",
                known, vector_dim
            );
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Backend(format!("Failed to drop table: {}", e)))?;
        }

        let schema = Self::create_schema(vector_dim);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to create table: {}", e)))?;

        self.set_dimension(Some(vector_dim))?;
        info!("Chunk table created with {} dimensions", vector_dim);
        Ok(())
    }

    fn create_record_batch(records: &[ChunkRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut doc_types = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut metadata_json = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        let created_at = Utc::now().to_rfc3339();
        for record in records {
            ids.push(record.id.as_str());
            document_ids.push(record.metadata.document_id.as_str());
            titles.push(record.metadata.title.as_str());
            doc_types.push(record.metadata.doc_type.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            contents.push(record.text.as_str());
            metadata_json.push(if record.metadata.extra.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&record.metadata.extra).map_err(|e| {
                    RagError::Validation(format!("Failed to serialize chunk metadata: {}", e))
                })?)
            });
            created_ats.push(created_at.as_str());
        }

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.embedding);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| RagError::Backend(format!("Failed to create vector array: {}", e)))?;

        let schema = Self::create_schema(vector_dim);
        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(doc_types)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata_json)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Backend(format!("Failed to create record batch: {}", e)))
    }

    async fn parse_hit_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ChunkHit>> {
        let mut hits = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_hit_batch(&batch)?);
        }

        debug!("Parsed {} hits from result stream", hits.len());
        Ok(hits)
    }

    fn parse_hit_batch(batch: &RecordBatch) -> Result<Vec<ChunkHit>> {
        let document_ids = string_column(batch, "document_id")?;
        let titles = string_column(batch, "title")?;
        let doc_types = string_column(batch, "doc_type")?;
        let contents = string_column(batch, "content")?;
        let metadata_json = string_column(batch, "metadata")?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
            .ok_or_else(|| RagError::Backend("Missing or invalid chunk_index column".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let extra: Metadata = if metadata_json.is_null(row) {
                Metadata::new()
            } else {
                serde_json::from_str(metadata_json.value(row)).map_err(|e| {
                    RagError::Backend(format!("Failed to parse stored chunk metadata: {}", e))
                })?
            };

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            hits.push(ChunkHit {
                text: contents.value(row).to_string(),
                metadata: ChunkMetadata {
                    document_id: document_ids.value(row).to_string(),
                    title: titles.value(row).to_string(),
                    doc_type: doc_types.value(row).to_string(),
                    chunk_index: chunk_indices.value(row),
                    extra,
                },
                distance,
            });
        }

        Ok(hits)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Backend(format!("Missing or invalid {} column", name)))
}

/// Escape a value for use inside a single-quoted SQL predicate
fn escape_predicate_value(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    async fn insert(&self, document_id: &str, records: Vec<ChunkRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No chunks to insert for document {}", document_id);
            return Ok(());
        }

        let vector_dim = records[0].embedding.len();
        if vector_dim == 0 {
            return Err(RagError::Validation(
                "chunk embeddings must not be empty".to_string(),
            ));
        }
        if records.iter().any(|r| r.embedding.len() != vector_dim) {
            return Err(RagError::Validation(
                "chunk embeddings must share one dimension".to_string(),
            ));
        }

        self.ensure_table(vector_dim).await?;

        let record_batch = Self::create_record_batch(&records, vector_dim)?;
        let schema = record_batch.schema();

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to open table: {}", e)))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to insert chunks: {}", e)))?;

        info!("Stored {} chunks for document {}", records.len(), document_id);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
        if !self.table_exists().await? {
            debug!("Chunk table does not exist yet, returning no hits");
            return Ok(Vec::new());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to open table: {}", e)))?;

        let results = table
            .vector_search(vector)
            .map_err(|e| RagError::Backend(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to execute search: {}", e)))?;

        Self::parse_hit_stream(results).await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to open table: {}", e)))?;

        let predicate = format!("document_id = '{}'", escape_predicate_value(document_id));
        table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Backend(format!("Failed to delete document chunks: {}", e)))?;

        info!("Deleted chunks for document {}", document_id);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Backend(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Backend(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}
