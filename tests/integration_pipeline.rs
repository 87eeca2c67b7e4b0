#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests: ingest a transcript through a mock embedding service,
// then search, compare, and delete against in-memory and filesystem backends.
// Run with: cargo test --test integration_pipeline

use async_trait::async_trait;
use chrono::Utc;
use meetsearch::compare::BackendComparator;
use meetsearch::config::Config;
use meetsearch::embeddings::{ChunkingConfig, EmbeddingClient, chunk_key};
use meetsearch::ingest::IngestPipeline;
use meetsearch::search::{SearchMode, SearchService};
use meetsearch::store::{FsObjectStore, ObjectStore, TranscriptDocument};
use meetsearch::vectors::{
    ChunkMetadata, InMemoryVectorIndex, ListPage, VectorHit, VectorIndex, VectorRecord,
};
use meetsearch::{MeetsearchError, Result};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_DIMENSION: u32 = 4;

const SAMPLE_VTT: &str = "WEBVTT\n\n\
00:00:01.000 --> 00:00:04.000\n\
<v Alice>Welcome everyone to the weekly product sync.\n\n\
00:00:05.000 --> 00:00:09.000\n\
<v Bob>Thanks. The storage migration is on track for next sprint.\n\n\
00:00:10.000 --> 00:00:14.000\n\
<v Alice>Great. Let's review the open action items from last week.\n";

fn client_for(server: &MockServer) -> EmbeddingClient {
    let uri = Url::parse(&server.uri()).expect("mock server URI is valid");
    let mut config = Config::default();
    config.embedding.host = uri.host_str().expect("mock server has a host").to_string();
    config.embedding.port = uri.port().expect("mock server has a port");
    config.embedding.dimension = TEST_DIMENSION;

    EmbeddingClient::new(&config)
        .expect("failed to create embedding client")
        .with_timeout(Duration::from_secs(5))
}

async fn mount_embedding_mock(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": [0.5, 0.5, 0.5, 0.5] })),
        )
        .mount(server)
        .await;
}

/// Index that errors on one specific upsert call and otherwise delegates to
/// an in-memory index.
struct OutageOnCallIndex {
    inner: InMemoryVectorIndex,
    calls: AtomicUsize,
    failing_call: usize,
}

impl OutageOnCallIndex {
    fn failing_on(failing_call: usize) -> Self {
        Self {
            inner: InMemoryVectorIndex::new(),
            calls: AtomicUsize::new(0),
            failing_call,
        }
    }
}

#[async_trait]
impl VectorIndex for OutageOnCallIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_call {
            return Err(MeetsearchError::VectorStore("simulated outage".to_string()));
        }
        self.inner.upsert(records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        self.inner.query(vector, top_k, source_filter).await
    }

    async fn list_keys(&self, page_size: usize, cursor: Option<String>) -> Result<ListPage> {
        self.inner.list_keys(page_size, cursor).await
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<VectorRecord>> {
        self.inner.fetch(keys).await
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.inner.delete(keys).await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
}

fn record(source_id: &str, index: u32, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
        key: chunk_key(source_id, index as usize),
        vector,
        metadata: ChunkMetadata {
            source_id: source_id.to_string(),
            object_key: format!("meetings/2024/03/20240315_100000_Sync_{source_id}.json"),
            title: "Sync".to_string(),
            speaker: "Alice".to_string(),
            text: format!("chunk {index}"),
            chunk_index: index,
            created_at: Utc::now().to_rfc3339(),
        },
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn ingest_search_and_delete_round_trip() {
    let server = MockServer::start().await;
    mount_embedding_mock(&server).await;

    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let store: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(temp.path().join("transcripts")).expect("failed to create store"),
    );
    let vectors: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

    let pipeline = IngestPipeline::with_embeddings(
        client_for(&server),
        Arc::clone(&vectors),
        Arc::clone(&store),
        ChunkingConfig::default(),
    );

    let report = pipeline
        .ingest_text(SAMPLE_VTT, Some("Weekly Product Sync"), Some("mtg-001"), false)
        .await
        .expect("ingest failed");

    assert_eq!(report.source_id, "mtg-001");
    assert_eq!(report.title, "Weekly Product Sync");
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.vectors_indexed, 1);
    assert!(report.warnings.is_empty());

    // The full document is retrievable from the object store.
    let stored = store.get(&report.object_key).expect("document not stored");
    let document: TranscriptDocument =
        serde_json::from_str(&stored).expect("stored document is not valid JSON");
    assert_eq!(document.id, "mtg-001");
    assert_eq!(document.speakers, vec!["Alice", "Bob"]);
    assert!(document.transcript.contains("storage migration"));

    // Semantic search finds the meeting grouped under its source.
    let search = SearchService::new(client_for(&server), Arc::clone(&vectors), Arc::clone(&store));
    let response = search
        .search("storage migration", 5)
        .await
        .expect("search failed");
    assert_eq!(response.mode, SearchMode::Semantic);
    assert_eq!(response.matches.len(), 1);
    assert_eq!(response.matches[0].source_id, "mtg-001");
    assert_eq!(response.matches[0].title, "Weekly Product Sync");
    assert!(!response.matches[0].snippets.is_empty());

    // Deleting removes both the vectors and the stored document.
    pipeline
        .delete_document("mtg-001", &report.object_key)
        .await
        .expect("delete failed");
    assert_eq!(vectors.count().await.expect("count failed"), 0);
    assert!(store.get(&report.object_key).is_err());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn failed_upsert_batch_does_not_abort_sibling_batches() {
    let server = MockServer::start().await;
    mount_embedding_mock(&server).await;

    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let store: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(temp.path().join("transcripts")).expect("failed to create store"),
    );
    let vectors: Arc<dyn VectorIndex> = Arc::new(OutageOnCallIndex::failing_on(2));

    // Small windows so the transcript spans several upsert batches of 100.
    let pipeline = IngestPipeline::with_embeddings(
        client_for(&server),
        Arc::clone(&vectors),
        Arc::clone(&store),
        ChunkingConfig {
            chunk_size: 5,
            overlap: 1,
        },
    );

    let words: Vec<String> = (0..1200).map(|i| format!("word{i}")).collect();
    let report = pipeline
        .ingest_text(&words.join(" "), Some("Long Meeting"), Some("mtg-long"), true)
        .await
        .expect("ingest failed");

    // Three batches; only the second fails, the first and third land.
    assert!(report.chunk_count > 200);
    assert_eq!(report.vectors_indexed, report.chunk_count - 100);
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("not indexed")),
        "expected a warning for the failed batch: {:?}",
        report.warnings
    );
    assert_eq!(
        vectors.count().await.expect("count failed"),
        report.vectors_indexed as u64
    );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn ambiguous_text_requires_explicit_acceptance() {
    let server = MockServer::start().await;
    mount_embedding_mock(&server).await;

    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let store: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(temp.path().join("transcripts")).expect("failed to create store"),
    );
    let vectors: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

    let pipeline = IngestPipeline::with_embeddings(
        client_for(&server),
        Arc::clone(&vectors),
        Arc::clone(&store),
        ChunkingConfig::default(),
    );

    let notes = "Discussed the roadmap and upcoming deadlines.\nNo decisions were final.";

    let rejected = pipeline.ingest_text(notes, Some("Notes"), None, false).await;
    assert!(rejected.is_err());

    let report = pipeline
        .ingest_text(notes, Some("Notes"), None, true)
        .await
        .expect("ambiguous ingest should succeed when accepted");
    assert!(!report.warnings.is_empty());
    assert_eq!(report.chunk_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn search_falls_back_to_keywords_when_embedding_service_is_down() {
    // An exclusive (non-pooled) server: dropping it must actually close the
    // listener, unlike pooled `MockServer::start()` servers.
    let server = MockServer::builder().start().await;
    mount_embedding_mock(&server).await;

    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let store: Arc<dyn ObjectStore> = Arc::new(
        FsObjectStore::new(temp.path().join("transcripts")).expect("failed to create store"),
    );
    let vectors: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

    let pipeline = IngestPipeline::with_embeddings(
        client_for(&server),
        Arc::clone(&vectors),
        Arc::clone(&store),
        ChunkingConfig::default(),
    );
    pipeline
        .ingest_text(SAMPLE_VTT, Some("Weekly Product Sync"), Some("mtg-002"), false)
        .await
        .expect("ingest failed");

    // Point the search client at a port nothing is listening on.
    let dead_client = client_for(&server)
        .with_timeout(Duration::from_millis(500))
        .with_retry_attempts(1);
    drop(server);

    let search = SearchService::new(dead_client, Arc::clone(&vectors), Arc::clone(&store));
    let response = search
        .search("storage migration", 5)
        .await
        .expect("keyword fallback failed");

    assert_eq!(response.mode, SearchMode::Keyword);
    assert_eq!(response.matches.len(), 1);
    assert_eq!(response.matches[0].source_id, "mtg-002");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn comparator_passes_when_backends_agree() {
    let server = MockServer::start().await;
    mount_embedding_mock(&server).await;

    let primary: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
    let candidate: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

    primary
        .upsert(vec![
            record("mtg-a", 0, vec![0.5, 0.5, 0.5, 0.5]),
            record("mtg-a", 1, vec![1.0, 0.0, 0.0, 0.0]),
            record("mtg-b", 0, vec![1.0, 1.0, 0.0, 0.0]),
        ])
        .await
        .expect("seeding primary failed");

    let comparator =
        BackendComparator::new(client_for(&server), Arc::clone(&primary), Arc::clone(&candidate));
    let report = comparator
        .run(&["action items".to_string()], 3, 100)
        .await
        .expect("comparison failed");

    assert_eq!(report.vectors_mirrored, 3);
    assert_eq!(report.primary_count, 3);
    assert_eq!(report.candidate_count, 3);
    assert_eq!(report.queries.len(), 1);
    assert!((report.avg_recall - 1.0).abs() < f64::EPSILON);
    assert!((report.avg_correlation - 1.0).abs() < f64::EPSILON);
    assert!(report.passed);
}
