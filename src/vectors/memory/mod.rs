
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::{ListPage, VectorHit, VectorIndex, VectorRecord};
use crate::{MeetsearchError, Result};

/// Brute-force in-memory vector index. Used in tests and as a candidate
/// backend during comparison runs; not meant for large corpora.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, VectorRecord>>> {
        self.records
            .read()
            .map_err(|_| MeetsearchError::VectorStore("Index lock poisoned".to_string()))
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, VectorRecord>>> {
        self.records
            .write()
            .map_err(|_| MeetsearchError::VectorStore("Index lock poisoned".to_string()))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut map = self.write_lock()?;
        for record in records {
            map.insert(record.key.clone(), record);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let map = self.read_lock()?;

        let mut hits: Vec<VectorHit> = map
            .values()
            .filter(|record| {
                source_filter.is_none_or(|source| record.metadata.source_id == source)
            })
            .map(|record| VectorHit {
                key: record.key.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        debug!("In-memory query returned {} hits", hits.len());
        Ok(hits)
    }

    async fn list_keys(&self, page_size: usize, cursor: Option<String>) -> Result<ListPage> {
        let map = self.read_lock()?;

        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();

        // Cursor is the last key of the previous page.
        let start = match cursor {
            Some(ref after) => keys.partition_point(|k| k <= after),
            None => 0,
        };

        let page: Vec<String> = keys.iter().skip(start).take(page_size).cloned().collect();
        let next_cursor = (page.len() == page_size && start + page_size < keys.len())
            .then(|| page.last().cloned())
            .flatten();

        Ok(ListPage {
            keys: page,
            next_cursor,
        })
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<VectorRecord>> {
        let map = self.read_lock()?;
        Ok(keys.iter().filter_map(|key| map.get(key).cloned()).collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut map = self.write_lock()?;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read_lock()?.len() as u64)
    }
}
