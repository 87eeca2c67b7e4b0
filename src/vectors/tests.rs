use super::*;

#[test]
fn synthetic_scores_decay_by_rank() {
    assert_eq!(synthetic_score(0), 1.0);
    assert_eq!(synthetic_score(1), 0.95);
    assert_eq!(synthetic_score(10), 0.5);
    assert_eq!(synthetic_score(20), 0.0);
    assert_eq!(synthetic_score(100), 0.0);
}

#[test]
fn metadata_text_is_capped() {
    let mut metadata = ChunkMetadata {
        source_id: "doc".to_string(),
        object_key: "meetings/2024/01/doc.json".to_string(),
        title: "Weekly sync".to_string(),
        speaker: "Alice".to_string(),
        text: "x".repeat(600),
        chunk_index: 0,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    };
    metadata.truncate_text();
    assert_eq!(metadata.text.len(), METADATA_TEXT_LIMIT);

    let mut short = metadata.clone();
    short.text = "brief".to_string();
    short.truncate_text();
    assert_eq!(short.text, "brief");
}

#[test]
fn metadata_truncation_respects_char_boundaries() {
    let mut metadata = ChunkMetadata {
        source_id: "doc".to_string(),
        object_key: "meetings/2024/01/doc.json".to_string(),
        title: "Weekly sync".to_string(),
        speaker: "Alice".to_string(),
        // 499 ASCII bytes followed by a two-byte character straddling the cap.
        text: format!("{}é", "x".repeat(499)),
        chunk_index: 0,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    };
    metadata.truncate_text();
    assert_eq!(metadata.text.len(), 499);
}
