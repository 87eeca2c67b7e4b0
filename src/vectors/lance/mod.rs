
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ChunkMetadata, ListPage, VectorHit, VectorIndex, VectorRecord};
use crate::config::Config;
use crate::{MeetsearchError, Result};

/// Local vector index backed by a LanceDB table.
pub struct LanceVectorIndex {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl LanceVectorIndex {
    /// Connect to (or create) the local vector database under the
    /// configured base directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MeetsearchError::VectorStore(format!(
                    "Failed to create vector database directory: {e}"
                ))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to connect to LanceDB: {e}"))
        })?;

        let index = Self {
            connection,
            table_name: config.vectors.collection.clone(),
            dimension: config.embedding.dimension as usize,
        };

        index.initialize_table().await?;

        info!("Vector index initialized at {:?}", db_path);
        Ok(index)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            debug!("Table {} already exists", self.table_name);
            return Ok(());
        }

        let schema = self.create_schema();
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to create table: {e}")))?;

        info!(
            "Created table {} with {} dimensions",
            self.table_name, self.dimension
        );
        Ok(())
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("object_key", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("speaker", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to open table: {e}")))
    }

    fn create_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut keys = Vec::with_capacity(len);
        let mut source_ids = Vec::with_capacity(len);
        let mut object_keys = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut speakers = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            if record.vector.len() != self.dimension {
                return Err(MeetsearchError::VectorStore(format!(
                    "Vector for {} has {} dimensions, table expects {}",
                    record.key,
                    record.vector.len(),
                    self.dimension
                )));
            }
            keys.push(record.key.as_str());
            source_ids.push(record.metadata.source_id.as_str());
            object_keys.push(record.metadata.object_key.as_str());
            titles.push(record.metadata.title.as_str());
            speakers.push(record.metadata.speaker.as_str());
            texts.push(record.metadata.text.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            created_ats.push(record.metadata.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| MeetsearchError::VectorStore(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(keys)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(source_ids)),
            Arc::new(StringArray::from(object_keys)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(speakers)),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to create record batch: {e}"))
        })
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| MeetsearchError::VectorStore(format!("Missing {name} column")))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MeetsearchError::VectorStore(format!("Invalid {name} column type")))
    }

    fn parse_metadata_rows(batch: &RecordBatch) -> Result<Vec<(String, ChunkMetadata)>> {
        let keys = Self::string_column(batch, "key")?;
        let source_ids = Self::string_column(batch, "source_id")?;
        let object_keys = Self::string_column(batch, "object_key")?;
        let titles = Self::string_column(batch, "title")?;
        let speakers = Self::string_column(batch, "speaker")?;
        let texts = Self::string_column(batch, "text")?;
        let created_ats = Self::string_column(batch, "created_at")?;
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| MeetsearchError::VectorStore("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| {
                MeetsearchError::VectorStore("Invalid chunk_index column type".to_string())
            })?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            rows.push((
                keys.value(row).to_string(),
                ChunkMetadata {
                    source_id: source_ids.value(row).to_string(),
                    object_key: object_keys.value(row).to_string(),
                    title: titles.value(row).to_string(),
                    speaker: speakers.value(row).to_string(),
                    text: texts.value(row).to_string(),
                    chunk_index: chunk_indices.value(row),
                    created_at: created_ats.value(row).to_string(),
                },
            ));
        }
        Ok(rows)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
        let rows = Self::parse_metadata_rows(batch)?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut hits = Vec::with_capacity(rows.len());
        for (row, (key, metadata)) in rows.into_iter().enumerate() {
            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            hits.push(VectorHit {
                key,
                // Distance is descending-worse; flip it into a score.
                score: 1.0 - distance,
                metadata,
            });
        }
        Ok(hits)
    }

    fn key_predicate(keys: &[String]) -> String {
        let quoted = keys
            .iter()
            .map(|k| format!("'{}'", k.replace('\'', "''")))
            .join(", ");
        format!("key IN ({quoted})")
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No vectors to store");
            return Ok(());
        }

        debug!("Storing batch of {} vectors", records.len());

        let table = self.open_table().await?;

        // Keys are unique per chunk; replace any prior version first.
        let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
        table
            .delete(&Self::key_predicate(&keys))
            .await
            .map_err(|e| {
                MeetsearchError::VectorStore(format!("Failed to clear existing keys: {e}"))
            })?;

        let record_batch = self.create_record_batch(&records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to insert vectors: {e}")))?;

        info!("Stored {} vectors", records.len());
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        debug!("Searching for nearest vectors with top_k: {}", top_k);

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(vector)
            .map_err(|e| {
                MeetsearchError::VectorStore(format!("Failed to create vector search: {e}"))
            })?
            .column("vector")
            .limit(top_k);

        if let Some(source_id) = source_filter {
            query = query.only_if(format!("source_id = '{}'", source_id.replace('\'', "''")));
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to read result stream: {e}"))
        })? {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn list_keys(&self, page_size: usize, cursor: Option<String>) -> Result<ListPage> {
        let offset = match cursor {
            Some(ref raw) => raw.parse::<usize>().map_err(|_| {
                MeetsearchError::VectorStore(format!("Invalid list cursor: {raw}"))
            })?,
            None => 0,
        };

        let table = self.open_table().await?;
        let mut stream = table
            .query()
            .offset(offset)
            .limit(page_size)
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to list keys: {e}")))?;

        let mut keys = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to read list stream: {e}"))
        })? {
            let column = Self::string_column(&batch, "key")?;
            for row in 0..batch.num_rows() {
                keys.push(column.value(row).to_string());
            }
        }

        let next_cursor = (keys.len() == page_size).then(|| (offset + page_size).to_string());
        Ok(ListPage { keys, next_cursor })
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<VectorRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut stream = table
            .query()
            .only_if(Self::key_predicate(keys))
            .execute()
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to fetch records: {e}")))?;

        let mut records = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to read fetch stream: {e}"))
        })? {
            let vectors = batch
                .column_by_name("vector")
                .ok_or_else(|| MeetsearchError::VectorStore("Missing vector column".to_string()))?
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .ok_or_else(|| {
                    MeetsearchError::VectorStore("Invalid vector column type".to_string())
                })?;

            for (row, (key, metadata)) in Self::parse_metadata_rows(&batch)?.into_iter().enumerate()
            {
                let values = vectors.value(row);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| {
                        MeetsearchError::VectorStore("Invalid vector item type".to_string())
                    })?;
                records.push(VectorRecord {
                    key,
                    vector: floats.values().to_vec(),
                    metadata,
                });
            }
        }

        Ok(records)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let table = self.open_table().await?;
        table
            .delete(&Self::key_predicate(keys))
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to delete keys: {e}")))?;

        debug!("Deleted up to {} keys", keys.len());
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }

    async fn delete_document(&self, source_id: &str) -> Result<()> {
        debug!("Deleting vectors for document: {}", source_id);

        let table = self.open_table().await?;
        let predicate = format!("source_id = '{}'", source_id.replace('\'', "''"));
        table.delete(&predicate).await.map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to delete document vectors: {e}"))
        })?;

        info!("Deleted vectors for document: {}", source_id);
        Ok(())
    }
}
