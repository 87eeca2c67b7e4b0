use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

use crate::config::Config;
use crate::store::FsObjectStore;
use crate::vectors::{ChunkMetadata, InMemoryVectorIndex};

fn hit(source_id: &str, chunk_index: u32, score: f32) -> VectorHit {
    VectorHit {
        key: crate::embeddings::chunking::chunk_key(source_id, chunk_index as usize),
        score,
        metadata: ChunkMetadata {
            source_id: source_id.to_string(),
            object_key: format!("meetings/2024/01/{source_id}.json"),
            title: format!("Meeting {source_id}"),
            speaker: "Alice".to_string(),
            text: format!("chunk {chunk_index} of {source_id}"),
            chunk_index,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[test]
fn hits_group_by_meeting_with_max_score() {
    let matches = group_hits(vec![
        hit("doc-a", 0, 0.9),
        hit("doc-b", 2, 0.85),
        hit("doc-a", 3, 0.7),
        hit("doc-b", 0, 0.95),
    ]);

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].source_id, "doc-b");
    assert_eq!(matches[0].top_score, 0.95);
    assert_eq!(matches[0].snippets.len(), 2);
    assert_eq!(matches[1].source_id, "doc-a");
    assert_eq!(matches[1].top_score, 0.9);
    assert_eq!(matches[1].snippets[0].chunk_index, Some(0));
}

#[test]
fn grouping_empty_hits_yields_no_matches() {
    assert!(group_hits(Vec::new()).is_empty());
}

#[test]
fn snippet_wraps_match_with_ellipses() {
    let text = format!("{} budget review {}", "a".repeat(300), "b".repeat(300));
    let snippet = extract_snippet(&text, "budget", 20);

    assert!(snippet.starts_with("..."));
    assert!(snippet.ends_with("..."));
    assert!(snippet.contains("budget review"));
}

#[test]
fn snippet_at_text_start_has_no_leading_ellipsis() {
    let text = format!("budget first {}", "a".repeat(300));
    let snippet = extract_snippet(&text, "Budget", 20);

    assert!(snippet.starts_with("budget first"));
    assert!(snippet.ends_with("..."));
}

#[test]
fn snippet_match_is_case_insensitive() {
    let snippet = extract_snippet("We discussed the Budget today.", "bUdGeT", 100);
    assert_eq!(snippet, "We discussed the Budget today.");
}

#[test]
fn snippet_keeps_original_casing_when_lowercasing_shifts_byte_offsets() {
    // 'İ' lowercases to two chars (i + combining dot), shifting every byte
    // offset after it. The snippet must still come from the original text.
    let text = "İZMİR offsite recap: the Budget was approved.";
    assert_eq!(extract_snippet(text, "budget", 100), text);

    let padded = format!("İİİİ {} the Budget was approved {}", "a".repeat(300), "b".repeat(300));
    let snippet = extract_snippet(&padded, "budget", 20);
    assert!(snippet.contains("Budget"));
    assert!(snippet.starts_with("..."));
    assert!(snippet.ends_with("..."));
}

#[test]
fn snippet_without_match_returns_head_of_text() {
    let long = "word ".repeat(100);
    let snippet = extract_snippet(&long, "absent", 100);
    assert_eq!(snippet.chars().count(), 203);
    assert!(snippet.ends_with("..."));

    let short = "just a few words";
    assert_eq!(extract_snippet(short, "absent", 100), short);
}

fn seed_document(store: &FsObjectStore, id: &str, title: &str, transcript: &str) -> String {
    let now = Utc::now();
    let key = format!(
        "meetings/{:04}/{:02}/{}_{}_{}.json",
        chrono::Datelike::year(&now),
        chrono::Datelike::month(&now),
        now.format("%Y%m%d_%H%M%S"),
        title.replace(' ', "_"),
        id
    );
    let document = crate::store::TranscriptDocument {
        id: id.to_string(),
        title: title.to_string(),
        received_at: Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).single().expect("valid time"),
        duration_seconds: 60,
        speakers: vec!["Alice".to_string()],
        summary: String::new(),
        notes: String::new(),
        transcript: transcript.to_string(),
    };
    store
        .put(&key, &serde_json::to_string(&document).expect("should serialize"))
        .expect("should put");
    key
}

#[test]
fn keyword_search_finds_recent_documents() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(FsObjectStore::new(dir.path()).expect("should create store"));
    seed_document(&store, "a1", "Planning", "Alice | 00:00\nthe budget is approved");
    seed_document(&store, "a2", "Retro", "Alice | 00:00\nnothing relevant here");

    let service = SearchService::new(
        EmbeddingClient::new(&Config::default()).expect("should build client"),
        Arc::new(InMemoryVectorIndex::new()),
        store,
    );

    let matches = service
        .keyword_search("BUDGET", 10)
        .expect("should search");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].source_id, "a1");
    assert_eq!(matches[0].title, "Planning");
    assert!(matches[0].snippets[0].text.to_lowercase().contains("budget"));
}

#[test]
fn keyword_search_skips_undecodable_documents() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(FsObjectStore::new(dir.path()).expect("should create store"));
    seed_document(&store, "a1", "Planning", "the budget is approved");

    let now = Utc::now();
    let bad_key = format!(
        "meetings/{:04}/{:02}/{}_Corrupt_z9.json",
        chrono::Datelike::year(&now),
        chrono::Datelike::month(&now),
        now.format("%Y%m%d_%H%M%S"),
    );
    store.put(&bad_key, "not json").expect("should put");

    let service = SearchService::new(
        EmbeddingClient::new(&Config::default()).expect("should build client"),
        Arc::new(InMemoryVectorIndex::new()),
        store,
    );

    let matches = service
        .keyword_search("budget", 10)
        .expect("should search");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].source_id, "a1");
}
