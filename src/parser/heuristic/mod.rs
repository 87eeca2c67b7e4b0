
use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::parser::{ParsedTranscript, TranscriptCue, UNKNOWN_SPEAKER, vtt};

/// Rule-based parse of free-form transcript text, with a confidence score
/// and a description of the recognized format.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicParse {
    pub transcript: ParsedTranscript,
    /// 0-100; how confident the rules are that the canonicalization is
    /// faithful.
    pub confidence: u8,
    pub format_description: String,
    /// Rule-based pitfalls that were detected and avoided (metadata labels,
    /// bare time codes, etc).
    pub warnings: Vec<String>,
}

/// Outcome of format detection. `Definitive` parses are safe to store as-is;
/// `Ambiguous` ones carry the best rule-based candidate along with the
/// reasons it should be escalated to the external language-model parser.
/// The caller decides policy (accept low confidence, always escalate, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Definitive(HeuristicParse),
    Ambiguous {
        candidate: HeuristicParse,
        reasons: Vec<String>,
    },
}

impl Detection {
    /// The rule-based parse regardless of confidence.
    #[inline]
    pub fn candidate(&self) -> &HeuristicParse {
        match self {
            Detection::Definitive(parse) => parse,
            Detection::Ambiguous { candidate, .. } => candidate,
        }
    }

    #[inline]
    pub fn is_definitive(&self) -> bool {
        matches!(self, Detection::Definitive(_))
    }
}

/// Fraction of speaker-labeled lines above which the rules are trusted
/// without escalation.
const DEFINITIVE_DENSITY: f64 = 0.5;

// "Name: text" or "Name | text" turn openers. The name segment is kept
// short so prose containing a colon is not mistaken for a turn.
static SPEAKER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Za-z0-9 .'\-]{0,39}?)\s*[:|]\s*(.+)$")
        .expect("speaker line regex is valid")
});

// Chat exports: "[12:03] Name: text" or "[12:03:45] Name: text".
static CHAT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{1,2}:\d{2}(?::\d{2})?)\]\s*([^:|]{1,40})\s*[:|]\s*(.+)$")
        .expect("chat line regex is valid")
});

// A line that is nothing but a time code, bracketed or bare.
static BARE_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[?\d{1,2}:\d{2}(?::\d{2})?(?:[.,]\d{1,3})?\]?$")
        .expect("bare timestamp regex is valid")
});

// Metadata labels that look like speaker names but never are. The leading
// "Date:" line of interview scripts is the classic false positive.
const METADATA_LABELS: &[&str] = &[
    "date", "time", "subject", "from", "to", "cc", "location", "attendees", "agenda", "re",
];

/// Classify free-form transcript text and canonicalize it.
///
/// Rule-based pattern matching handles speaker-labeled and chat-export
/// lines; everything the rules cannot place confidently is returned as an
/// `Ambiguous` candidate for the external escalation parser.
#[inline]
pub fn detect_and_canonicalize(text: &str) -> Detection {
    let mut cues: Vec<TranscriptCue> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut non_empty = 0usize;
    let mut labeled = 0usize;
    let mut chat_lines = 0usize;
    let mut clock = 0.0f64;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        non_empty += 1;

        if BARE_TIMESTAMP_RE.is_match(trimmed).unwrap_or(false) {
            warnings.push(format!("ignored bare time code line: {trimmed}"));
            continue;
        }

        if let Ok(Some(caps)) = CHAT_LINE_RE.captures(trimmed) {
            let time = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map_or("", |m| m.as_str()).trim();
            let content = caps.get(3).map_or("", |m| m.as_str()).trim();
            if !is_metadata_label(name) && !content.is_empty() {
                let at = vtt::parse_timestamp(time).unwrap_or(clock);
                clock = at;
                labeled += 1;
                chat_lines += 1;
                push_turn(&mut cues, name, at, content);
                continue;
            }
        }

        if let Ok(Some(caps)) = SPEAKER_LINE_RE.captures(trimmed) {
            let name = caps.get(1).map_or("", |m| m.as_str()).trim();
            let content = caps.get(2).map_or("", |m| m.as_str()).trim();

            if is_metadata_label(name) {
                warnings.push(format!("skipped metadata label line: {name}"));
                continue;
            }
            if looks_like_timestamp(name) || looks_like_timestamp(content) && content.len() < 12 {
                warnings.push(format!("refused time code as speaker name: {trimmed}"));
                continue;
            }
            if name.split_whitespace().count() <= 4 && !content.is_empty() {
                labeled += 1;
                push_turn(&mut cues, name, clock, content);
                continue;
            }
        }

        // Unlabeled prose: continuation of the current turn, or raw notes.
        match cues.last_mut() {
            Some(last) if labeled > 0 => {
                last.text.push(' ');
                last.text.push_str(trimmed);
            }
            _ => push_turn(&mut cues, UNKNOWN_SPEAKER, clock, trimmed),
        }
    }

    let density = if non_empty == 0 {
        0.0
    } else {
        labeled as f64 / non_empty as f64
    };

    let format_description = if chat_lines > 0 && chat_lines * 2 >= labeled {
        "chat export with timestamped speaker lines".to_string()
    } else if labeled > 0 {
        "speaker-labeled transcript".to_string()
    } else {
        "unstructured notes".to_string()
    };

    let transcript = ParsedTranscript::from_cues(cues);
    debug!(
        "Heuristic detection: {} ({} labeled / {} lines, density {:.2})",
        format_description, labeled, non_empty, density
    );

    if density >= DEFINITIVE_DENSITY && labeled > 0 {
        let confidence = (60.0 + density * 40.0).min(95.0) as u8;
        Detection::Definitive(HeuristicParse {
            transcript,
            confidence,
            format_description,
            warnings,
        })
    } else {
        let confidence = (density * 100.0) as u8;
        let mut reasons = Vec::new();
        if labeled == 0 {
            reasons.push("no recognizable speaker-label patterns".to_string());
        } else {
            reasons.push(format!(
                "only {labeled} of {non_empty} lines look like speaker turns"
            ));
        }
        if !warnings.is_empty() {
            reasons.push(format!(
                "{} suspicious lines required special handling",
                warnings.len()
            ));
        }
        Detection::Ambiguous {
            candidate: HeuristicParse {
                transcript,
                confidence,
                format_description,
                warnings,
            },
            reasons,
        }
    }
}

fn push_turn(cues: &mut Vec<TranscriptCue>, speaker: &str, at: f64, content: &str) {
    cues.push(TranscriptCue {
        start_time: at,
        end_time: at,
        speaker: speaker.to_string(),
        text: content.to_string(),
    });
}

fn is_metadata_label(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    METADATA_LABELS.contains(&lowered.as_str())
}

fn looks_like_timestamp(value: &str) -> bool {
    BARE_TIMESTAMP_RE.is_match(value.trim()).unwrap_or(false)
}
