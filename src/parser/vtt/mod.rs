
use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::parser::{ParsedTranscript, TranscriptCue, UNKNOWN_SPEAKER};
use crate::{MeetsearchError, Result};

/// Header token that opens the cue dialect.
pub const HEADER_TOKEN: &str = "WEBVTT";

const ARROW: &str = "-->";

static VOICE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<v\s+([^>]+)>\s*(.*)$").expect("voice tag regex is valid")
});

/// Quick validity check: the text is handled by this parser only when it
/// starts with the header token and contains at least one well-formed
/// timestamp arrow line. Anything else falls through to the heuristic
/// detector.
#[inline]
pub fn is_cue_dialect(text: &str) -> bool {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    match lines.next() {
        Some(first) if first.trim_start().starts_with(HEADER_TOKEN) => {}
        _ => return false,
    }
    lines.any(|line| parse_cue_timing(line).is_some())
}

/// Parse cue-dialect transcript text into the canonical representation.
///
/// Single pass over the lines: header and metadata lines before the first
/// timestamp line are skipped; each `start --> end` line opens a cue whose
/// text is the following non-blank, non-timestamp lines joined with spaces.
/// Cues whose extracted content is empty are dropped.
#[inline]
pub fn parse_cue_dialect(text: &str) -> Result<ParsedTranscript> {
    if !is_cue_dialect(text) {
        return Err(MeetsearchError::Parse(
            "input does not start with a cue-dialect header".to_string(),
        ));
    }

    let mut cues: Vec<TranscriptCue> = Vec::new();
    let mut pending: Option<(f64, f64, Vec<String>)> = None;

    for line in text.lines() {
        if let Some((start, end)) = parse_cue_timing(line) {
            finish_cue(&mut cues, pending.take());
            pending = Some((start, end, Vec::new()));
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            finish_cue(&mut cues, pending.take());
            continue;
        }

        if let Some((_, _, texts)) = pending.as_mut() {
            texts.push(trimmed.to_string());
        }
        // Lines before the first timestamp (header, metadata) are skipped.
    }
    finish_cue(&mut cues, pending.take());

    debug!("Parsed {} cues from cue-dialect transcript", cues.len());
    Ok(ParsedTranscript::from_cues(cues))
}

fn finish_cue(cues: &mut Vec<TranscriptCue>, pending: Option<(f64, f64, Vec<String>)>) {
    let Some((start, end, texts)) = pending else {
        return;
    };

    let joined = texts.join(" ");
    let (speaker, content) = split_voice_tag(&joined);
    if content.is_empty() {
        return;
    }

    cues.push(TranscriptCue {
        start_time: start,
        end_time: end,
        speaker,
        text: content,
    });
}

/// Extract an optional leading `<v Speaker Name>` voice tag. Without a tag
/// the speaker is `"Unknown"`.
fn split_voice_tag(text: &str) -> (String, String) {
    if let Ok(Some(caps)) = VOICE_TAG_RE.captures(text) {
        let speaker = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string());
        let content = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        (speaker, content)
    } else {
        (UNKNOWN_SPEAKER.to_string(), text.trim().to_string())
    }
}

/// Recognize a `start --> end` timing line, returning both timestamps in
/// seconds. Returns `None` for anything that is not a well-formed timing
/// line.
fn parse_cue_timing(line: &str) -> Option<(f64, f64)> {
    let (lhs, rhs) = line.split_once(ARROW)?;
    // Cue settings may trail the end timestamp; keep only the first token.
    let end_token = rhs.trim().split_whitespace().next()?;
    let start = parse_timestamp(lhs.trim())?;
    let end = parse_timestamp(end_token)?;
    Some((start, end))
}

/// Parse a timestamp to seconds. Split on `:`; three parts are
/// hours/minutes/seconds, two are minutes/seconds, one is bare seconds,
/// which supports minute-only and second-only cues. A comma decimal
/// separator is accepted alongside the dot.
#[inline]
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let normalized = value.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut fields = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() {
            return None;
        }
        fields.push(part.parse::<f64>().ok()?);
    }

    Some(match fields.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        [s] => *s,
        _ => unreachable!("length is checked above"),
    })
}
