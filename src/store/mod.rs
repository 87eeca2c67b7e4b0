// Object store module
// Durable storage for full transcript documents plus the key-encoded
// metadata index that makes date-ranged listing cheap.

#[cfg(test)]
mod tests;

pub mod fs;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::Result;
use crate::parser::ParsedTranscript;

pub use fs::FsObjectStore;

// Key filename format: YYYYMMDD_HHMMSS_title_meetingId.json
static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{8})_(\d{6})_(.+)_([^_]+)\.json$").expect("key pattern regex is valid")
});

/// A stored object as reported by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// One page of an object listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    pub next_cursor: Option<String>,
}

/// Durable key/value storage for transcript documents.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, body: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<String>;
    /// List objects under a prefix in key order.
    fn list_page(&self, prefix: &str, page_size: usize, cursor: Option<String>)
    -> Result<ObjectPage>;
    /// Remove an object; absent keys are ignored.
    fn delete(&self, key: &str) -> Result<()>;
}

/// The full transcript document persisted to the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub id: String,
    pub title: String,
    pub received_at: DateTime<Utc>,
    pub duration_seconds: u64,
    #[serde(default)]
    pub speakers: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub notes: String,
    pub transcript: String,
}

impl TranscriptDocument {
    /// Build a document from a canonicalized transcript.
    #[inline]
    pub fn from_transcript(
        id: &str,
        title: &str,
        received_at: DateTime<Utc>,
        parsed: &ParsedTranscript,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            received_at,
            duration_seconds: parsed.duration,
            speakers: parsed.speakers.clone(),
            summary: String::new(),
            notes: String::new(),
            transcript: parsed.raw_content.clone(),
        }
    }
}

/// Listing metadata recovered from an object key, without fetching the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub title: String,
    pub source_id: String,
    pub date: DateTime<Utc>,
    pub size: u64,
}

/// Decode listing metadata from a stored object's key.
///
/// Keys that don't follow the filename convention fall back to the object's
/// last-modified time, the bare filename as title, and an empty id.
#[inline]
pub fn parse_object_metadata(object: &StoredObject) -> ObjectMetadata {
    let filename = object.key.rsplit('/').next().unwrap_or(&object.key);

    if let Ok(Some(caps)) = KEY_PATTERN.captures(filename) {
        let date_str = caps.get(1).map_or("", |m| m.as_str());
        let time_str = caps.get(2).map_or("", |m| m.as_str());
        let title = caps.get(3).map_or("", |m| m.as_str());
        let source_id = caps.get(4).map_or("", |m| m.as_str());

        if let Ok(date) =
            NaiveDateTime::parse_from_str(&format!("{date_str}_{time_str}"), "%Y%m%d_%H%M%S")
        {
            return ObjectMetadata {
                key: object.key.clone(),
                title: title.replace('_', " "),
                source_id: source_id.to_string(),
                date: date.and_utc(),
                size: object.size,
            };
        }
    }

    ObjectMetadata {
        key: object.key.clone(),
        title: filename.trim_end_matches(".json").to_string(),
        source_id: String::new(),
        date: object.last_modified,
        size: object.size,
    }
}

/// Month prefixes covering a date range, for efficient prefix listing.
#[inline]
pub fn month_prefixes(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let mut prefixes = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    let (end_year, end_month) = (end.year(), end.month());

    while (year, month) <= (end_year, end_month) {
        prefixes.push(format!("meetings/{year:04}/{month:02}/"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    prefixes
}

const LIST_PAGE_SIZE: usize = 1000;

/// List transcripts in a date range, newest first.
///
/// A prefix that fails to list is skipped with a warning so one bad month
/// does not sink the whole listing.
#[inline]
pub fn list_transcripts(
    store: &dyn ObjectStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ObjectMetadata>> {
    let mut results: Vec<ObjectMetadata> = Vec::new();

    for prefix in month_prefixes(start, end) {
        let mut cursor = None;
        loop {
            let page = match store.list_page(&prefix, LIST_PAGE_SIZE, cursor.take()) {
                Ok(page) => page,
                Err(e) => {
                    warn!("Skipping prefix {}: {}", prefix, e);
                    break;
                }
            };

            for object in &page.objects {
                if !object.key.ends_with(".json") {
                    continue;
                }
                let metadata = parse_object_metadata(object);
                if metadata.date >= start && metadata.date <= end {
                    results.push(metadata);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }

    results.sort_by(|a, b| b.date.cmp(&a.date));
    results.truncate(limit);

    debug!("Listed {} transcripts in range", results.len());
    Ok(results)
}
