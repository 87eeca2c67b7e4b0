// Transcript parsing module
// Converts heterogeneous transcript formats into a canonical speaker-turn
// representation suitable for chunking and storage.

pub mod heuristic;
pub mod vtt;


pub use heuristic::{Detection, HeuristicParse, detect_and_canonicalize};
pub use vtt::{is_cue_dialect, parse_cue_dialect};

/// One parsed unit of dialogue: a time-ranged block of text attributed to a
/// speaker. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptCue {
    /// Start of the cue in seconds.
    pub start_time: f64,
    /// End of the cue in seconds.
    pub end_time: f64,
    /// Speaker name, or `"Unknown"` when no voice tag was present.
    pub speaker: String,
    /// Spoken text with internal line breaks collapsed to spaces.
    pub text: String,
}

pub const UNKNOWN_SPEAKER: &str = "Unknown";

/// Aggregate of all cues parsed from one source document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTranscript {
    /// Cues in original order.
    pub cues: Vec<TranscriptCue>,
    /// Every distinct speaker, in order of first appearance.
    pub speakers: Vec<String>,
    /// Ceiling of the last cue's end time in seconds, or 0 with no cues.
    pub duration: u64,
    /// Canonical flattened text: consecutive cues from the same speaker are
    /// merged into one `"{speaker} | {mm:ss}"` block.
    pub raw_content: String,
}

impl ParsedTranscript {
    /// Build the canonical representation from an ordered cue list.
    #[inline]
    pub fn from_cues(cues: Vec<TranscriptCue>) -> Self {
        let mut speakers: Vec<String> = Vec::new();
        for cue in &cues {
            if !speakers.contains(&cue.speaker) {
                speakers.push(cue.speaker.clone());
            }
        }

        let duration = cues.last().map_or(0, |cue| cue.end_time.ceil() as u64);
        let raw_content = render_blocks(&cues);

        Self {
            cues,
            speakers,
            duration,
            raw_content,
        }
    }

    /// True when no cues were retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

/// Merge consecutive same-speaker cues into speaker blocks, each headed by
/// `"{speaker} | {mm:ss}"` with the timestamp of the block's first cue.
fn render_blocks(cues: &[TranscriptCue]) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<(String, f64, Vec<String>)> = None;

    for cue in cues {
        match current.as_mut() {
            Some((speaker, _, texts)) if *speaker == cue.speaker => {
                texts.push(cue.text.clone());
            }
            _ => {
                if let Some(block) = current.take() {
                    blocks.push(format_block(&block.0, block.1, &block.2));
                }
                current = Some((cue.speaker.clone(), cue.start_time, vec![cue.text.clone()]));
            }
        }
    }

    if let Some(block) = current {
        blocks.push(format_block(&block.0, block.1, &block.2));
    }

    blocks.join("\n\n")
}

fn format_block(speaker: &str, start: f64, texts: &[String]) -> String {
    format!("{} | {}\n{}", speaker, format_clock(start), texts.join(" "))
}

/// Render seconds as `mm:ss`; minutes are not wrapped at the hour, matching
/// the block-header convention of the stored transcripts.
#[inline]
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
