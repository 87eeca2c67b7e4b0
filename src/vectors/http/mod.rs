
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ChunkMetadata, ListPage, VectorHit, VectorIndex, VectorRecord, synthetic_score};
use crate::config::Config;
use crate::{MeetsearchError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Vector index backed by a remote HTTP vector service.
///
/// The service does not return similarity scores with query results, so
/// hits are scored positionally with [`synthetic_score`].
#[derive(Debug, Clone)]
pub struct HttpVectorIndex {
    endpoint: Url,
    collection: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<VectorRecord>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<WireHit>,
}

#[derive(Debug, Deserialize)]
struct WireHit {
    key: String,
    #[serde(default)]
    score: Option<f32>,
    metadata: ChunkMetadata,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    keys: Vec<String>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct KeysRequest<'a> {
    keys: &'a [String],
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    vectors: Vec<VectorRecord>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    count: u64,
}

impl HttpVectorIndex {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = config
            .vectors
            .endpoint
            .clone()
            .ok_or_else(|| MeetsearchError::Config("Missing vector service endpoint".into()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            collection: config.vectors.collection.clone(),
            agent,
        })
    }

    fn collection_url(&self, suffix: &str) -> Result<Url> {
        let path = format!("collections/{}/{}", self.collection, suffix);
        self.endpoint
            .join(&path)
            .map_err(|e| MeetsearchError::VectorStore(format!("Failed to build URL: {e}")))
    }

    /// Run a blocking HTTP call off the async executor.
    async fn run_blocking<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || operation(agent))
            .await
            .map_err(|e| MeetsearchError::VectorStore(format!("Request task failed: {e}")))?
    }

    fn post_json(agent: &ureq::Agent, url: &Url, body: &str) -> Result<String> {
        agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| MeetsearchError::VectorStore(format!("Vector service error: {e}")))
    }

    fn hits_from_response(response: QueryResponse) -> Vec<VectorHit> {
        // Score scales are only comparable within one result set: use native
        // scores when every hit carries one, otherwise synthesize for all.
        let all_native = response.results.iter().all(|hit| hit.score.is_some());
        response
            .results
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| VectorHit {
                score: match hit.score {
                    Some(score) if all_native => score,
                    _ => synthetic_score(rank),
                },
                key: hit.key,
                metadata: hit.metadata,
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        debug!("Uploading batch of {} vectors", records.len());

        let url = self.collection_url("vectors/batch")?;
        let body = serde_json::to_string(&UpsertRequest { vectors: records }).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to serialize upsert request: {e}"))
        })?;

        self.run_blocking(move |agent| {
            Self::post_json(&agent, &url, &body)?;
            Ok(())
        })
        .await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let url = self.collection_url("query")?;
        let body = serde_json::to_string(&QueryRequest {
            vector,
            top_k,
            source_id: source_filter,
        })
        .map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to serialize query request: {e}"))
        })?;

        let response_text = self
            .run_blocking(move |agent| Self::post_json(&agent, &url, &body))
            .await?;

        let response: QueryResponse = serde_json::from_str(&response_text).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to parse query response: {e}"))
        })?;

        Ok(Self::hits_from_response(response))
    }

    async fn list_keys(&self, page_size: usize, cursor: Option<String>) -> Result<ListPage> {
        let mut url = self.collection_url("vectors")?;
        url.query_pairs_mut()
            .append_pair("limit", &page_size.to_string());
        if let Some(ref cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }

        let response_text = self
            .run_blocking(move |agent| {
                agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
                    .map_err(|e| {
                        MeetsearchError::VectorStore(format!("Vector service error: {e}"))
                    })
            })
            .await?;

        let response: ListResponse = serde_json::from_str(&response_text).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to parse list response: {e}"))
        })?;

        Ok(ListPage {
            keys: response.keys,
            next_cursor: response.next_cursor,
        })
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<VectorRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.collection_url("vectors/fetch")?;
        let body = serde_json::to_string(&KeysRequest { keys }).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to serialize fetch request: {e}"))
        })?;

        let response_text = self
            .run_blocking(move |agent| Self::post_json(&agent, &url, &body))
            .await?;

        let response: FetchResponse = serde_json::from_str(&response_text).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to parse fetch response: {e}"))
        })?;

        Ok(response.vectors)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        debug!("Deleting {} keys from vector service", keys.len());

        let url = self.collection_url("vectors/delete")?;
        let body = serde_json::to_string(&KeysRequest { keys }).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to serialize delete request: {e}"))
        })?;

        self.run_blocking(move |agent| {
            Self::post_json(&agent, &url, &body)?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        let url = self.collection_url("stats")?;

        let response_text = self
            .run_blocking(move |agent| {
                agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
                    .map_err(|e| {
                        MeetsearchError::VectorStore(format!("Vector service error: {e}"))
                    })
            })
            .await?;

        let response: StatsResponse = serde_json::from_str(&response_text).map_err(|e| {
            MeetsearchError::VectorStore(format!("Failed to parse stats response: {e}"))
        })?;

        Ok(response.count)
    }
}
