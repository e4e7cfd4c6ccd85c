//! # Highlight Projection
//!
//! Turns a transcript line plus its highlight annotations into an ordered
//! list of plain and highlighted segments, ready for whatever is rendering
//! the transcript. Offsets are measured in characters, not bytes, so a
//! span can never split a multi-byte character.
//!
//! Annotations come from the analysis service and are not trusted: if any
//! span in a set falls outside the text, the whole set is discarded and
//! the line renders unhighlighted. A broken annotation must never take the
//! transcript down with it.

use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// How loudly a phrase should stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth noticing. Pressure language, odd claims.
    Advisory,
    /// Direct scam indicators. Payment demands, OTP requests.
    Danger,
}

/// One annotated phrase within a single transcript line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub text: String,
    pub severity: Severity,
    /// Character offset into the line. Signed because the wire can send
    /// anything; negatives fail validation.
    pub start_index: i64,
}

/// A contiguous run of the line, either emphasized or not.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Plain(String),
    Highlighted { text: String, severity: Severity },
}

/// Checks every span against the line it annotates. One bad span condemns
/// the whole set.
fn validate_spans(text: &str, highlights: &[Highlight]) -> AppResult<()> {
    let total = text.chars().count();
    for highlight in highlights {
        if highlight.start_index < 0 {
            return Err(AppError::Validation(format!(
                "highlight start {} is negative",
                highlight.start_index
            )));
        }
        let start = highlight.start_index as usize;
        let len = highlight.text.chars().count();
        if start + len > total {
            return Err(AppError::Validation(format!(
                "highlight [{}..{}] exceeds text length {}",
                start,
                start + len,
                total
            )));
        }
    }
    Ok(())
}

/// Splits `text` into segments according to `highlights`.
///
/// Always yields a usable segmentation: with no annotations, or with an
/// invalid set, the result is the whole line as one plain segment. Spans
/// are processed in start order regardless of wire order; overlapping
/// spans produce adjacent highlighted segments without repeating text a
/// previous span already covered.
pub fn project(text: &str, highlights: &[Highlight]) -> Vec<Segment> {
    if highlights.is_empty() {
        return vec![Segment::Plain(text.to_string())];
    }

    if let Err(err) = validate_spans(text, highlights) {
        warn!("{}; rendering line unhighlighted", err);
        return vec![Segment::Plain(text.to_string())];
    }

    let chars: Vec<char> = text.chars().collect();

    let mut sorted: Vec<&Highlight> = highlights.iter().collect();
    sorted.sort_by_key(|h| h.start_index);

    let mut segments = Vec::new();
    let mut cursor = 0usize;
    for highlight in sorted {
        let start = highlight.start_index as usize;
        let len = highlight.text.chars().count();
        if start > cursor {
            segments.push(Segment::Plain(chars[cursor..start].iter().collect()));
        }
        segments.push(Segment::Highlighted {
            text: highlight.text.clone(),
            severity: highlight.severity,
        });
        // An overlapping span never re-emits text an earlier one consumed.
        cursor = cursor.max(start + len);
    }
    if cursor < chars.len() {
        segments.push(Segment::Plain(chars[cursor..].iter().collect()));
    }
    segments
}
