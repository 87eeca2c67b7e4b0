// Search module
// Semantic search over chunk vectors, grouped per meeting, with a keyword
// fallback over recently stored documents when the vector path is down.

#[cfg(test)]
mod tests;

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Result;
use crate::embeddings::EmbeddingClient;
use crate::store::{ObjectStore, TranscriptDocument, list_transcripts};
use crate::vectors::{VectorHit, VectorIndex};

const SNIPPET_CONTEXT: usize = 100;
const SNIPPET_FALLBACK_LIMIT: usize = 200;
const KEYWORD_POOL_DAYS: i64 = 90;
const KEYWORD_POOL_LIMIT: usize = 200;

/// Query interface over the vector index and the object store.
pub struct SearchService {
    embeddings: EmbeddingClient,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn ObjectStore>,
}

/// How a result set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Semantic,
    Keyword,
}

/// All matches for one meeting, best chunk first.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingMatch {
    pub source_id: String,
    pub object_key: String,
    pub title: String,
    /// Best chunk score for the meeting.
    pub top_score: f32,
    pub snippets: Vec<SnippetMatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnippetMatch {
    pub text: String,
    pub score: f32,
    /// Chunk position for semantic hits; keyword snippets have none.
    pub chunk_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub matches: Vec<MeetingMatch>,
}

impl SearchService {
    #[inline]
    pub fn new(
        embeddings: EmbeddingClient,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            embeddings,
            vectors,
            store,
        }
    }

    /// Search meetings, degrading to keyword matching over recent documents
    /// when the semantic path is unavailable.
    #[inline]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        match self.semantic_search(query, top_k).await {
            Ok(matches) => Ok(SearchResponse {
                mode: SearchMode::Semantic,
                matches,
            }),
            Err(e) => {
                warn!("Semantic search failed, falling back to keyword: {}", e);
                let matches = self.keyword_search(query, top_k)?;
                Ok(SearchResponse {
                    mode: SearchMode::Keyword,
                    matches,
                })
            }
        }
    }

    /// Embed the query, fetch the nearest chunks, and group them by meeting.
    #[inline]
    pub async fn semantic_search(&self, query: &str, top_k: usize) -> Result<Vec<MeetingMatch>> {
        let vector = self.embeddings.embed(query)?;
        let hits = self.vectors.query(&vector, top_k, None).await?;
        debug!("Semantic search returned {} chunk hits", hits.len());
        Ok(group_hits(hits))
    }

    /// Substring search across recently stored documents. Documents that
    /// fail to fetch or parse are skipped.
    #[inline]
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<MeetingMatch>> {
        let end = Utc::now();
        let start = end - Duration::days(KEYWORD_POOL_DAYS);
        let pool = list_transcripts(self.store.as_ref(), start, end, KEYWORD_POOL_LIMIT)?;

        let needle = query.to_lowercase();
        let mut matches = Vec::new();

        for metadata in pool {
            let document = match self.fetch_document(&metadata.key) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping {}: {}", metadata.key, e);
                    continue;
                }
            };

            let searchable = format!(
                "{} {} {} {}",
                document.title, document.summary, document.notes, document.transcript
            );

            if searchable.to_lowercase().contains(&needle) {
                matches.push(MeetingMatch {
                    source_id: document.id,
                    object_key: metadata.key,
                    title: document.title,
                    top_score: 0.0,
                    snippets: vec![SnippetMatch {
                        text: extract_snippet(&searchable, query, SNIPPET_CONTEXT),
                        score: 0.0,
                        chunk_index: None,
                    }],
                });
            }

            if matches.len() >= limit {
                break;
            }
        }

        debug!("Keyword search matched {} meetings", matches.len());
        Ok(matches)
    }

    /// Fetch and decode one stored document.
    #[inline]
    pub fn fetch_document(&self, key: &str) -> Result<TranscriptDocument> {
        let body = self.store.get(key)?;
        serde_json::from_str(&body).map_err(|e| {
            crate::MeetsearchError::MetadataIndex(format!("Failed to decode document {key}: {e}"))
        })
    }
}

/// Group chunk hits by meeting. A meeting's score is its best chunk score;
/// meetings are returned best first with their chunk hits in query order.
#[inline]
pub fn group_hits(hits: Vec<VectorHit>) -> Vec<MeetingMatch> {
    let mut grouped: HashMap<String, MeetingMatch> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for hit in hits {
        let entry = grouped
            .entry(hit.metadata.source_id.clone())
            .or_insert_with(|| {
                order.push(hit.metadata.source_id.clone());
                MeetingMatch {
                    source_id: hit.metadata.source_id.clone(),
                    object_key: hit.metadata.object_key.clone(),
                    title: hit.metadata.title.clone(),
                    top_score: hit.score,
                    snippets: Vec::new(),
                }
            });

        entry.top_score = entry.top_score.max(hit.score);
        entry.snippets.push(SnippetMatch {
            text: hit.metadata.text,
            score: hit.score,
            chunk_index: Some(hit.metadata.chunk_index),
        });
    }

    let mut matches: Vec<MeetingMatch> = order
        .into_iter()
        .filter_map(|id| grouped.remove(&id))
        .collect();
    matches.sort_by(|a, b| b.top_score.total_cmp(&a.top_score));
    matches
}

/// Context window around the first case-insensitive match, with ellipses on
/// the clipped sides. Without a match, the head of the text is returned.
///
/// The snippet is always taken from the original text; matching works on
/// lowercased characters so scripts whose lowercase form has a different
/// byte length still map back to the right span.
#[inline]
pub fn extract_snippet(text: &str, query: &str, context: usize) -> String {
    let needle: Vec<char> = query.to_lowercase().chars().collect();

    let Some((match_start, match_end)) = find_case_insensitive(text, &needle) else {
        return if text.chars().count() > SNIPPET_FALLBACK_LIMIT {
            let head: String = text.chars().take(SNIPPET_FALLBACK_LIMIT).collect();
            format!("{head}...")
        } else {
            text.to_string()
        };
    };

    let start = floor_char_boundary(text, match_start.saturating_sub(context));
    let end = ceil_char_boundary(text, usize::min(match_end + context, text.len()));

    let mut snippet = text.get(start..end).unwrap_or_default().to_string();
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < text.len() {
        snippet = format!("{snippet}...");
    }
    snippet
}

/// Byte range of the first spot where the text's lowercased characters spell
/// out `needle`. A char whose lowercase expansion straddles the needle's end
/// is included whole.
fn find_case_insensitive(text: &str, needle: &[char]) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }

    for (start, _) in text.char_indices() {
        let tail = text.get(start..).unwrap_or_default();
        let mut matched = 0;
        'candidate: for (offset, c) in tail.char_indices() {
            for lowered in c.to_lowercase() {
                if needle.get(matched) != Some(&lowered) {
                    break 'candidate;
                }
                matched += 1;
                if matched == needle.len() {
                    return Some((start, start + offset + c.len_utf8()));
                }
            }
        }
    }
    None
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
