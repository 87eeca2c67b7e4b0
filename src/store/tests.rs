use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

fn object(key: &str) -> StoredObject {
    StoredObject {
        key: key.to_string(),
        last_modified: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).single().expect("valid time"),
        size: 1024,
    }
}

#[test]
fn well_formed_keys_decode_to_metadata() {
    let metadata = parse_object_metadata(&object(
        "meetings/2024/03/20240315_143000_Weekly_Product_Sync_abc123.json",
    ));

    assert_eq!(metadata.title, "Weekly Product Sync");
    assert_eq!(metadata.source_id, "abc123");
    assert_eq!(
        metadata.date,
        Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).single().expect("valid time")
    );
    assert_eq!(metadata.size, 1024);
}

#[test]
fn malformed_keys_fall_back_to_object_attributes() {
    let metadata = parse_object_metadata(&object("meetings/2024/03/notes.json"));

    assert_eq!(metadata.title, "notes");
    assert_eq!(metadata.source_id, "");
    assert_eq!(
        metadata.date,
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).single().expect("valid time")
    );
}

#[test]
fn month_prefixes_cover_range_inclusive() {
    let start = Utc.with_ymd_and_hms(2023, 11, 20, 0, 0, 0).single().expect("valid time");
    let end = Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).single().expect("valid time");

    assert_eq!(
        month_prefixes(start, end),
        vec![
            "meetings/2023/11/",
            "meetings/2023/12/",
            "meetings/2024/01/",
            "meetings/2024/02/",
        ]
    );
}

#[test]
fn single_month_range_yields_one_prefix() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().expect("valid time");
    let end = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).single().expect("valid time");
    assert_eq!(month_prefixes(start, end), vec!["meetings/2024/05/"]);
}

#[test]
fn inverted_range_yields_no_prefixes() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().expect("valid time");
    let end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).single().expect("valid time");
    assert!(month_prefixes(start, end).is_empty());
}

#[test]
fn list_transcripts_filters_sorts_and_limits() {
    let dir = TempDir::new().expect("should create temp dir");
    let store = FsObjectStore::new(dir.path()).expect("should create store");

    for key in [
        "meetings/2024/03/20240301_090000_Early_Sync_a1.json",
        "meetings/2024/03/20240320_100000_Late_Sync_a2.json",
        "meetings/2024/03/20240310_110000_Mid_Sync_a3.json",
        // Outside the requested range.
        "meetings/2024/01/20240105_090000_Old_Sync_a4.json",
        // Not a transcript document.
        "meetings/2024/03/readme.txt",
    ] {
        store.put(key, "{}").expect("should put");
    }

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("valid time");
    let end = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).single().expect("valid time");

    let listed = list_transcripts(&store, start, end, 2).expect("should list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].title, "Late Sync");
    assert_eq!(listed[1].title, "Mid Sync");
}

#[test]
fn document_round_trips_through_json() {
    let document = TranscriptDocument {
        id: "a1".to_string(),
        title: "Weekly Sync".to_string(),
        received_at: Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).single().expect("valid time"),
        duration_seconds: 1800,
        speakers: vec!["Alice".to_string(), "Bob".to_string()],
        summary: String::new(),
        notes: String::new(),
        transcript: "Alice | 00:00\nhello".to_string(),
    };

    let json = serde_json::to_string(&document).expect("should serialize");
    let parsed: TranscriptDocument = serde_json::from_str(&json).expect("should deserialize");
    assert_eq!(parsed, document);
}
