// Ingest module
// Turns raw transcript text into a stored document plus indexed chunk
// vectors: parse, persist, chunk, embed, upsert.


use chrono::{DateTime, Datelike, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, chunk_key, chunk_text};
use crate::parser::{Detection, ParsedTranscript, vtt};
use crate::store::{ObjectStore, TranscriptDocument};
use crate::vectors::{ChunkMetadata, VectorIndex, VectorRecord};
use crate::{MeetsearchError, Result};

const UPSERT_BATCH_SIZE: usize = 100;
const SAFE_TITLE_LIMIT: usize = 50;

/// End-to-end transcript ingestion.
pub struct IngestPipeline {
    embeddings: EmbeddingClient,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn ObjectStore>,
    chunking: ChunkingConfig,
}

/// What one ingest run accomplished. The document is stored before any
/// indexing happens, so a partially indexed run still leaves the full
/// transcript retrievable.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub source_id: String,
    pub object_key: String,
    pub title: String,
    pub chunk_count: usize,
    pub vectors_indexed: usize,
    pub warnings: Vec<String>,
}

impl IngestPipeline {
    #[inline]
    pub fn new(
        config: &Config,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let embeddings = EmbeddingClient::new(config)?;
        Ok(Self {
            embeddings,
            vectors,
            store,
            chunking: config.chunking,
        })
    }

    #[inline]
    pub fn with_embeddings(
        embeddings: EmbeddingClient,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ObjectStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embeddings,
            vectors,
            store,
            chunking,
        }
    }

    /// Ingest one transcript.
    ///
    /// The cue dialect is parsed exactly; anything else goes through the
    /// rule-based detector. Ambiguous detections are rejected unless
    /// `accept_ambiguous` is set, in which case the candidate parse is used
    /// and its escalation reasons become report warnings.
    #[inline]
    pub async fn ingest_text(
        &self,
        text: &str,
        title: Option<&str>,
        source_id: Option<&str>,
        accept_ambiguous: bool,
    ) -> Result<IngestReport> {
        let mut warnings = Vec::new();
        let parsed = self.parse(text, accept_ambiguous, &mut warnings)?;

        if parsed.is_empty() {
            return Err(MeetsearchError::Parse(
                "Transcript contains no dialogue".to_string(),
            ));
        }

        let source_id = source_id
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let title = title.unwrap_or("Untitled");
        let received_at = Utc::now();
        let object_key = build_object_key(received_at, title, &source_id);

        // Persist the full document first; indexing failures below must not
        // lose the transcript.
        let document =
            TranscriptDocument::from_transcript(&source_id, title, received_at, &parsed);
        let body = serde_json::to_string_pretty(&document).map_err(|e| {
            MeetsearchError::MetadataIndex(format!("Failed to serialize document: {e}"))
        })?;
        self.store.put(&object_key, &body)?;
        info!("Stored transcript document: {}", object_key);

        let chunks = chunk_text(&parsed.raw_content, &self.chunking)?;
        let chunk_count = chunks.len();

        let records = self.embed_chunks(
            &chunks,
            &parsed.speakers,
            &source_id,
            &object_key,
            title,
            received_at,
            &mut warnings,
        );

        // Each batch stands alone; one failed upsert must not keep the
        // remaining batches out of the index.
        let mut vectors_indexed = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            match self.vectors.upsert(batch.to_vec()).await {
                Ok(()) => vectors_indexed += batch.len(),
                Err(e) => {
                    warn!("Failed to index batch of {} vectors: {}", batch.len(), e);
                    warnings.push(format!(
                        "batch of {} vectors not indexed: {e}",
                        batch.len()
                    ));
                }
            }
        }

        info!(
            "Ingested {}: {} chunks, {} vectors indexed",
            source_id, chunk_count, vectors_indexed
        );

        Ok(IngestReport {
            source_id,
            object_key,
            title: title.to_string(),
            chunk_count,
            vectors_indexed,
            warnings,
        })
    }

    /// Remove a document and its vectors. Both deletions are attempted even
    /// if the first fails.
    #[inline]
    pub async fn delete_document(&self, source_id: &str, object_key: &str) -> Result<()> {
        let vector_result = self.vectors.delete_document(source_id).await;
        if let Err(ref e) = vector_result {
            warn!("Failed to delete vectors for {}: {}", source_id, e);
        }

        let store_result = self.store.delete(object_key);
        if let Err(ref e) = store_result {
            warn!("Failed to delete object {}: {}", object_key, e);
        }

        vector_result.and(store_result)
    }

    fn parse(
        &self,
        text: &str,
        accept_ambiguous: bool,
        warnings: &mut Vec<String>,
    ) -> Result<ParsedTranscript> {
        if vtt::is_cue_dialect(text) {
            return vtt::parse_cue_dialect(text);
        }

        match crate::parser::detect_and_canonicalize(text) {
            Detection::Definitive(parse) => {
                warnings.extend(parse.warnings);
                Ok(parse.transcript)
            }
            Detection::Ambiguous { candidate, reasons } => {
                if !accept_ambiguous {
                    return Err(MeetsearchError::Parse(format!(
                        "Ambiguous transcript format: {}",
                        reasons.join("; ")
                    )));
                }
                warnings.extend(reasons.iter().map(|r| format!("ambiguous format: {r}")));
                warnings.extend(candidate.warnings);
                Ok(candidate.transcript)
            }
        }
    }

    /// Embed each chunk with speaker context prepended. A chunk whose
    /// embedding fails is skipped with a warning rather than failing the run.
    #[expect(clippy::too_many_arguments, reason = "internal assembly helper")]
    fn embed_chunks(
        &self,
        chunks: &[Chunk],
        speakers: &[String],
        source_id: &str,
        object_key: &str,
        title: &str,
        received_at: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Vec<VectorRecord> {
        let speaker_context = speaker_context(speakers);
        let primary_speaker = speakers
            .iter()
            .find(|s| is_real_speaker_name(s))
            .cloned()
            .unwrap_or_default();
        let created_at = received_at.to_rfc3339();

        let texts: Vec<String> = chunks
            .iter()
            .map(|chunk| format!("{speaker_context}{}", chunk.text))
            .collect();

        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, result) in chunks.iter().zip(self.embeddings.embed_batch(&texts)) {
            let vector = match result {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Skipping chunk {} of {}: {}", chunk.index, source_id, e);
                    warnings.push(format!("chunk {} skipped: {e}", chunk.index));
                    continue;
                }
            };

            let mut metadata = ChunkMetadata {
                source_id: source_id.to_string(),
                object_key: object_key.to_string(),
                title: title.to_string(),
                speaker: primary_speaker.clone(),
                text: chunk.text.clone(),
                chunk_index: chunk.index as u32,
                created_at: created_at.clone(),
            };
            metadata.truncate_text();

            records.push(VectorRecord {
                key: chunk_key(source_id, chunk.index),
                vector,
                metadata,
            });
        }
        records
    }
}

/// `"Meeting participants: A, B. "` prefix for embedding enrichment, or
/// empty when no real names are known.
#[inline]
pub fn speaker_context(speakers: &[String]) -> String {
    let real: Vec<&str> = speakers
        .iter()
        .filter(|s| is_real_speaker_name(s))
        .map(String::as_str)
        .collect();

    if real.is_empty() {
        String::new()
    } else {
        format!("Meeting participants: {}. ", real.join(", "))
    }
}

/// Whether a speaker label is a real name rather than a generic placeholder
/// like "Speaker 2" or "Unknown".
#[inline]
pub fn is_real_speaker_name(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    if lowered.len() < 2 {
        return false;
    }
    if lowered.starts_with("speaker ") {
        return false;
    }
    !matches!(lowered.as_str(), "unknown" | "guest" | "participant")
}

/// Object key with date-based organization, e.g.
/// `meetings/2024/03/20240315_143000_Weekly_Sync_abc123.json`.
fn build_object_key(received_at: DateTime<Utc>, title: &str, source_id: &str) -> String {
    let safe_title: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(SAFE_TITLE_LIMIT)
        .collect::<String>()
        .replace(' ', "_");

    format!(
        "meetings/{:04}/{:02}/{}_{}_{}.json",
        received_at.year(),
        received_at.month(),
        received_at.format("%Y%m%d_%H%M%S"),
        safe_title,
        source_id
    )
}
