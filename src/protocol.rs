//! # Analysis Wire Protocol
//!
//! Decodes the JSON messages the analysis service pushes down the
//! WebSocket and normalizes them into one internal event type. Outbound
//! traffic is raw PCM and never touches this module; see
//! [`crate::audio::encoder`] for the byte layout.
//!
//! ## Wire Shapes:
//! The service has shipped two message generations and both are still
//! seen in the wild. The current shape carries rich analysis:
//!
//! ```json
//! {
//!   "text": "Please read me the code",
//!   "timestamp": "00:42",
//!   "speakerId": "s1",
//!   "yellowHighlights": [{"text": "the code", "startIndex": 15}],
//!   "redHighlights": [],
//!   "speakers": [{"id": "s1", "name": "Unknown", "scamRisk": "medium"}],
//!   "aggregated": {"level": "cautious", "rationale": "Pressure language."}
//! }
//! ```
//!
//! The legacy shape is a bare transcript with an optional verdict:
//!
//! ```json
//! {"transcript": "read me the code", "is_scam": true, "scam_details": "OTP request"}
//! ```
//!
//! A message with a `text` field is always read as the current shape;
//! `transcript` marks a legacy one. Anything that fits neither, or sits in
//! a field with the wrong type, is a decode error and the caller drops
//! that event with a diagnostic. One bad message never resets analysis
//! state.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::analysis::highlight::{Highlight, Severity};
use crate::analysis::risk::RiskLevel;
use crate::analysis::speakers::{SpeakerUpdate, Suspicion};
use crate::error::AppResult;

/// One inbound analysis event, shape differences already erased.
/// `text` is `None` when the message carried no usable line; such events
/// still update speakers and risk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisEvent {
    pub text: Option<String>,
    pub timestamp: Option<String>,
    pub speaker_id: Option<String>,
    pub highlights: Vec<Highlight>,
    pub speakers: Vec<SpeakerUpdate>,
    pub risk_signal: Option<RiskSignal>,
}

/// An explicit call-level verdict carried on an event.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSignal {
    pub level: RiskLevel,
    pub rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentWire {
    text: Option<String>,
    timestamp: Option<String>,
    speaker_id: Option<String>,
    #[serde(default)]
    yellow_highlights: Vec<WireHighlight>,
    #[serde(default)]
    red_highlights: Vec<WireHighlight>,
    #[serde(default)]
    speakers: Vec<WireSpeaker>,
    aggregated: Option<WireAggregated>,
}

#[derive(Debug, Deserialize)]
struct LegacyWire {
    transcript: String,
    is_scam: Option<bool>,
    scam_details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHighlight {
    text: String,
    start_index: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSpeaker {
    id: String,
    name: Option<String>,
    role: Option<String>,
    scam_risk: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAggregated {
    level: String,
    rationale: Option<String>,
}

/// Decodes one text frame into an [`AnalysisEvent`].
pub fn decode_text(raw: &str) -> AppResult<AnalysisEvent> {
    let value: Value = serde_json::from_str(raw)?;

    if value.get("text").is_some() || value.get("transcript").is_none() {
        let wire: CurrentWire = serde_json::from_value(value)?;
        Ok(normalize_current(wire))
    } else {
        let wire: LegacyWire = serde_json::from_value(value)?;
        Ok(normalize_legacy(wire))
    }
}

fn normalize_current(wire: CurrentWire) -> AnalysisEvent {
    let mut highlights: Vec<Highlight> = Vec::new();
    for span in wire.yellow_highlights {
        highlights.push(Highlight {
            text: span.text,
            severity: Severity::Advisory,
            start_index: span.start_index,
        });
    }
    for span in wire.red_highlights {
        highlights.push(Highlight {
            text: span.text,
            severity: Severity::Danger,
            start_index: span.start_index,
        });
    }

    let speakers = wire
        .speakers
        .into_iter()
        .map(|speaker| SpeakerUpdate {
            id: speaker.id,
            name: speaker.name,
            role: speaker.role,
            suspicion: speaker.scam_risk.as_deref().and_then(Suspicion::parse),
        })
        .collect();

    let risk_signal = wire.aggregated.map(|aggregated| {
        let level = match RiskLevel::parse(&aggregated.level) {
            Some(level) => level,
            None => {
                debug!(
                    "Unknown aggregated risk level {:?}; treating as neutral",
                    aggregated.level
                );
                RiskLevel::Neutral
            }
        };
        RiskSignal {
            level,
            rationale: aggregated.rationale,
        }
    });

    AnalysisEvent {
        text: wire.text.filter(|t| !t.trim().is_empty()),
        timestamp: wire.timestamp.filter(|t| !t.is_empty()),
        speaker_id: wire.speaker_id.filter(|s| !s.is_empty()),
        highlights,
        speakers,
        risk_signal,
    }
}

fn normalize_legacy(wire: LegacyWire) -> AnalysisEvent {
    // Only a positive verdict means anything; the old service sent
    // `is_scam: false` as filler, not as an all-clear.
    let risk_signal = if wire.is_scam == Some(true) {
        Some(RiskSignal {
            level: RiskLevel::Alert,
            rationale: wire.scam_details,
        })
    } else {
        None
    };

    AnalysisEvent {
        text: Some(wire.transcript).filter(|t| !t.trim().is_empty()),
        risk_signal,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_decode_current_shape() {
        let raw = r#"{
            "text": "Please read me the code",
            "timestamp": "00:42",
            "speakerId": "s1",
            "yellowHighlights": [{"text": "read me", "startIndex": 7}],
            "redHighlights": [{"text": "the code", "startIndex": 15}],
            "speakers": [
                {"id": "s1", "name": "Unknown", "scamRisk": "medium"},
                {"id": "me", "name": "You", "scamRisk": "low"}
            ],
            "aggregated": {"level": "cautious", "rationale": "Pressure language."}
        }"#;

        let event = decode_text(raw).unwrap();
        assert_eq!(event.text.as_deref(), Some("Please read me the code"));
        assert_eq!(event.timestamp.as_deref(), Some("00:42"));
        assert_eq!(event.speaker_id.as_deref(), Some("s1"));

        assert_eq!(event.highlights.len(), 2);
        assert_eq!(event.highlights[0].severity, Severity::Advisory);
        assert_eq!(event.highlights[0].text, "read me");
        assert_eq!(event.highlights[1].severity, Severity::Danger);
        assert_eq!(event.highlights[1].start_index, 15);

        assert_eq!(event.speakers.len(), 2);
        assert_eq!(event.speakers[0].suspicion, Some(Suspicion::Medium));
        // Low risk carries no suspicion.
        assert_eq!(event.speakers[1].suspicion, None);

        let signal = event.risk_signal.unwrap();
        assert_eq!(signal.level, RiskLevel::Cautious);
        assert_eq!(signal.rationale.as_deref(), Some("Pressure language."));
    }

    #[test]
    fn test_decode_minimal_current_shape() {
        let event = decode_text(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(event.text.as_deref(), Some("hello"));
        assert!(event.timestamp.is_none());
        assert!(event.speaker_id.is_none());
        assert!(event.highlights.is_empty());
        assert!(event.speakers.is_empty());
        assert!(event.risk_signal.is_none());
    }

    #[test]
    fn test_decode_legacy_scam_verdict() {
        let raw = r#"{"transcript": "read me the code", "is_scam": true, "scam_details": "OTP request"}"#;
        let event = decode_text(raw).unwrap();

        assert_eq!(event.text.as_deref(), Some("read me the code"));
        let signal = event.risk_signal.unwrap();
        assert_eq!(signal.level, RiskLevel::Alert);
        assert_eq!(signal.rationale.as_deref(), Some("OTP request"));
    }

    #[test]
    fn test_decode_legacy_without_verdict() {
        let event = decode_text(r#"{"transcript": "hello there"}"#).unwrap();
        assert_eq!(event.text.as_deref(), Some("hello there"));
        assert!(event.risk_signal.is_none());

        // A negative verdict is filler, not an all-clear.
        let event = decode_text(r#"{"transcript": "hi", "is_scam": false}"#).unwrap();
        assert!(event.risk_signal.is_none());
    }

    #[test]
    fn test_text_field_wins_over_transcript() {
        let raw = r#"{"text": "new shape", "transcript": "old shape"}"#;
        let event = decode_text(raw).unwrap();
        assert_eq!(event.text.as_deref(), Some("new shape"));
    }

    #[test]
    fn test_whitespace_text_becomes_none() {
        let raw = r#"{"text": "   ", "speakers": [{"id": "s1"}]}"#;
        let event = decode_text(raw).unwrap();

        // No transcript line, but the speaker update still flows through.
        assert!(event.text.is_none());
        assert_eq!(event.speakers.len(), 1);
        assert_eq!(event.speakers[0].id, "s1");
    }

    #[test]
    fn test_speakers_only_event() {
        let raw = r#"{"speakers": [{"id": "s1", "scamRisk": "high"}]}"#;
        let event = decode_text(raw).unwrap();
        assert!(event.text.is_none());
        assert_eq!(event.speakers[0].suspicion, Some(Suspicion::High));
    }

    #[test]
    fn test_malformed_payloads_are_decode_errors() {
        assert!(matches!(
            decode_text("not json at all"),
            Err(AppError::Decode(_))
        ));
        assert!(matches!(
            decode_text(r#"{"text": 123}"#),
            Err(AppError::Decode(_))
        ));
        assert!(matches!(
            decode_text(r#"{"transcript": {"nested": true}}"#),
            Err(AppError::Decode(_))
        ));
        assert!(matches!(decode_text(r#""bare string""#), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_unknown_aggregated_level_degrades_to_neutral() {
        let raw = r#"{"text": "hi", "aggregated": {"level": "panic"}}"#;
        let event = decode_text(raw).unwrap();
        let signal = event.risk_signal.unwrap();
        assert_eq!(signal.level, RiskLevel::Neutral);
        assert!(signal.rationale.is_none());
    }

    #[test]
    fn test_empty_identity_fields_become_none() {
        let raw = r#"{"text": "hi", "timestamp": "", "speakerId": ""}"#;
        let event = decode_text(raw).unwrap();
        assert!(event.timestamp.is_none());
        assert!(event.speaker_id.is_none());
    }
}
