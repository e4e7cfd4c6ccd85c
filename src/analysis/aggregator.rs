//! # Analysis State Aggregation
//!
//! The single consumer of decoded analysis events. Owns the canonical
//! call state: the transcript log, the speaker registry, and the risk
//! ladder. Events mutate that state here and nowhere else, strictly in
//! arrival order, so ordering and stickiness guarantees hold without any
//! cross-thread coordination.
//!
//! ## Per-Event Pipeline:
//! 1. **Dedup** - re-delivered events are discarded outright, before they
//!    can touch anything.
//! 2. **Speaker merge** - register new voices, fill in what we learn
//!    about known ones.
//! 3. **Transcript** - prepend a new entry, newest first.
//! 4. **Risk escalation** - fold the event's verdict (explicit or derived
//!    from speakers) into the sticky ladder.
//! 5. **Rationale retention** - keep the best explanation seen so far.
//!
//! The returned [`StateDelta`] tells the presentation layer exactly what
//! changed, so a discarded duplicate triggers no redraw at all.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use tracing::debug;

use crate::analysis::highlight::Highlight;
use crate::analysis::risk::{self, RiskLevel, RiskState};
use crate::analysis::speakers::{is_system_channel, Speaker, SpeakerRegistry, SYSTEM_CHANNEL};
use crate::protocol::AnalysisEvent;
use crate::roster::CallerRoster;

/// Entries without a speaker are attributed to the far end of the call.
const DEFAULT_SPEAKER_LABEL: &str = "Caller";

/// Dedup keys use a fixed-length text prefix so growing transcripts of
/// the same utterance still collide.
const DEDUP_TEXT_PREFIX: usize = 50;

/// One line of the call transcript. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// Wire timestamp when given, mm:ss since call start otherwise.
    pub timestamp: String,
    pub speaker_id: Option<String>,
    /// Resolved display name at the moment the line arrived.
    pub speaker_label: String,
    pub text: String,
    pub highlights: Vec<Highlight>,
    /// Level of the verdict that rode in on this line, if any.
    pub risk_annotation: Option<RiskLevel>,
}

/// What one event changed, for the presentation layer.
#[derive(Debug, Default)]
pub struct StateDelta {
    pub new_entry: Option<TranscriptEntry>,
    pub speakers_changed: bool,
    pub risk_changed: bool,
}

impl StateDelta {
    /// True when the event left no visible trace.
    pub fn is_empty(&self) -> bool {
        self.new_entry.is_none() && !self.speakers_changed && !self.risk_changed
    }
}

/// Canonical state for one call. Create it once, [`Aggregator::reset`] it
/// when a new call starts.
pub struct Aggregator {
    roster: CallerRoster,
    seen_keys: HashSet<String>,
    speakers: SpeakerRegistry,
    transcript: VecDeque<TranscriptEntry>,
    risk: RiskState,
    started_at: Instant,
}

impl Aggregator {
    pub fn new(roster: CallerRoster) -> Self {
        Self {
            roster,
            seen_keys: HashSet::new(),
            speakers: SpeakerRegistry::new(),
            transcript: VecDeque::new(),
            risk: RiskState::default(),
            started_at: Instant::now(),
        }
    }

    /// Folds one event into the call state and reports what changed.
    pub fn apply_event(&mut self, event: AnalysisEvent) -> StateDelta {
        let mut delta = StateDelta::default();

        // Dedup applies to transcript-bearing events. Events without text
        // (speaker or risk updates) are incremental by nature and always
        // processed.
        if let Some(text) = event.text.as_deref() {
            let key = dedup_key(
                event.timestamp.as_deref(),
                event.speaker_id.as_deref(),
                text,
            );
            if !self.seen_keys.insert(key) {
                debug!("Discarding re-delivered analysis event");
                return delta;
            }
        }

        // Speaker tracking. The system channel is service chatter, not a
        // voice on the call.
        if let Some(speaker_id) = event.speaker_id.as_deref() {
            if !is_system_channel(speaker_id) {
                delta.speakers_changed |= self.speakers.observe(speaker_id, &self.roster);
            }
        }
        for update in &event.speakers {
            if is_system_channel(&update.id) {
                continue;
            }
            delta.speakers_changed |= self.speakers.merge(update, &self.roster);
        }

        // Transcript, labeled after the merge so fresh names apply.
        if let Some(text) = event.text.clone() {
            let entry = TranscriptEntry {
                timestamp: event
                    .timestamp
                    .clone()
                    .unwrap_or_else(|| self.elapsed_stamp()),
                speaker_label: self.resolve_label(event.speaker_id.as_deref()),
                speaker_id: event.speaker_id.clone(),
                text,
                highlights: event.highlights.clone(),
                risk_annotation: event.risk_signal.as_ref().map(|signal| signal.level),
            };
            self.transcript.push_front(entry.clone());
            delta.new_entry = Some(entry);
        }

        // Risk: explicit verdict when the event carries one, otherwise
        // whatever the speaker roster implies.
        let candidate = match &event.risk_signal {
            Some(signal) => signal.level,
            None => risk::derive_from_speakers(self.speakers.all()),
        };
        delta.risk_changed |= self.risk.apply_level(candidate);

        if let Some(signal) = &event.risk_signal {
            if let Some(rationale) = signal.rationale.as_deref() {
                delta.risk_changed |= self.risk.apply_rationale(rationale);
            }
        }

        delta
    }

    /// Clears all call state for a fresh session.
    pub fn reset(&mut self) {
        self.seen_keys.clear();
        self.speakers.clear();
        self.transcript.clear();
        self.risk = RiskState::default();
        self.started_at = Instant::now();
        debug!("Analysis state reset for a new call");
    }

    /// Transcript entries, most recent first.
    pub fn transcript(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter()
    }

    pub fn entry_count(&self) -> usize {
        self.transcript.len()
    }

    pub fn speakers(&self) -> &[Speaker] {
        self.speakers.all()
    }

    pub fn risk(&self) -> &RiskState {
        &self.risk
    }

    /// True when a roster-matched voice has been heard on this call.
    pub fn has_known_caller(&self) -> bool {
        self.speakers.has_trusted()
    }

    pub fn known_caller_name(&self) -> Option<&str> {
        self.speakers.trusted_name()
    }

    fn resolve_label(&self, speaker_id: Option<&str>) -> String {
        match speaker_id {
            Some(id) if is_system_channel(id) => SYSTEM_CHANNEL.to_string(),
            Some(id) => self
                .speakers
                .display_label(id)
                .unwrap_or(id)
                .to_string(),
            None => DEFAULT_SPEAKER_LABEL.to_string(),
        }
    }

    fn elapsed_stamp(&self) -> String {
        let secs = self.started_at.elapsed().as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

fn dedup_key(timestamp: Option<&str>, speaker_id: Option<&str>, text: &str) -> String {
    let prefix: String = text.chars().take(DEDUP_TEXT_PREFIX).collect();
    format!(
        "{}|{}|{}",
        timestamp.unwrap_or(""),
        speaker_id.unwrap_or(""),
        prefix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::speakers::{SpeakerClass, SpeakerUpdate, Suspicion};
    use crate::protocol::RiskSignal;
    use crate::roster::RosterEntry;

    fn roster() -> CallerRoster {
        CallerRoster::new().with_entry(RosterEntry::new("me", "You").as_self())
    }

    fn text_event(text: &str, timestamp: &str, speaker: &str) -> AnalysisEvent {
        AnalysisEvent {
            text: Some(text.to_string()),
            timestamp: Some(timestamp.to_string()),
            speaker_id: Some(speaker.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_event_mutates_state_exactly_once() {
        let mut agg = Aggregator::new(roster());

        let mut event = text_event("read me the code", "00:10", "s1");
        event.speakers = vec![SpeakerUpdate {
            id: "s1".to_string(),
            ..Default::default()
        }];

        let first = agg.apply_event(event.clone());
        assert!(first.new_entry.is_some());
        assert_eq!(agg.entry_count(), 1);

        // Same event again, this time even carrying a new speaker record.
        // The duplicate is discarded before it can touch anything.
        event.speakers.push(SpeakerUpdate {
            id: "s2".to_string(),
            ..Default::default()
        });
        let second = agg.apply_event(event);
        assert!(second.is_empty());
        assert_eq!(agg.entry_count(), 1);
        assert_eq!(agg.speakers().len(), 1);
    }

    #[test]
    fn test_dedup_key_uses_a_fixed_text_prefix() {
        let mut agg = Aggregator::new(CallerRoster::new());

        let stem = "a".repeat(DEDUP_TEXT_PREFIX);
        let first = agg.apply_event(text_event(&format!("{stem} first tail"), "00:10", "s1"));
        assert!(first.new_entry.is_some());

        // Same first 50 characters: treated as a re-delivery.
        let second = agg.apply_event(text_event(&format!("{stem} other tail"), "00:10", "s1"));
        assert!(second.is_empty());

        // Diverging inside the prefix: a distinct line.
        let third = agg.apply_event(text_event("a brand new line", "00:10", "s1"));
        assert!(third.new_entry.is_some());
        assert_eq!(agg.entry_count(), 2);
    }

    #[test]
    fn test_transcript_is_most_recent_first() {
        let mut agg = Aggregator::new(CallerRoster::new());
        agg.apply_event(text_event("first line", "00:01", "s1"));
        agg.apply_event(text_event("second line", "00:02", "s1"));

        let texts: Vec<&str> = agg.transcript().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["second line", "first line"]);
    }

    #[test]
    fn test_system_channel_lines_never_become_speakers() {
        let mut agg = Aggregator::new(CallerRoster::new());
        let delta = agg.apply_event(text_event("Connection established", "00:00", "System"));

        let entry = delta.new_entry.unwrap();
        assert_eq!(entry.speaker_label, "System");
        assert!(!delta.speakers_changed);
        assert!(agg.speakers().is_empty());
    }

    #[test]
    fn test_entry_label_uses_freshly_merged_name() {
        let mut agg = Aggregator::new(CallerRoster::new());

        let mut event = text_event("hello", "00:05", "s1");
        event.speakers = vec![SpeakerUpdate {
            id: "s1".to_string(),
            name: Some("Mr. Smith".to_string()),
            ..Default::default()
        }];

        let delta = agg.apply_event(event);
        assert_eq!(delta.new_entry.unwrap().speaker_label, "Mr. Smith");
    }

    #[test]
    fn test_roster_classifies_first_sight() {
        let mut agg = Aggregator::new(roster());
        agg.apply_event(text_event("hi, it's me", "00:01", "me"));

        assert_eq!(agg.speakers()[0].classification, SpeakerClass::SelfSpeaker);
        assert!(agg.has_known_caller());
        assert_eq!(agg.known_caller_name(), Some("You"));
    }

    #[test]
    fn test_missing_timestamp_is_synthesized() {
        let mut agg = Aggregator::new(CallerRoster::new());
        let delta = agg.apply_event(AnalysisEvent {
            text: Some("no timestamp here".to_string()),
            ..Default::default()
        });

        let entry = delta.new_entry.unwrap();
        assert_eq!(entry.timestamp, "00:00");
        assert_eq!(entry.speaker_label, DEFAULT_SPEAKER_LABEL);
    }

    #[test]
    fn test_explicit_verdict_outranks_derived_and_sticks() {
        let mut agg = Aggregator::new(roster());

        let mut event = text_event("give me the OTP", "00:10", "s1");
        event.risk_signal = Some(RiskSignal {
            level: RiskLevel::Alert,
            rationale: Some("OTP request detected.".to_string()),
        });
        let delta = agg.apply_event(event);
        assert!(delta.risk_changed);
        assert_eq!(agg.risk().level, RiskLevel::Alert);
        assert_eq!(
            delta.new_entry.unwrap().risk_annotation,
            Some(RiskLevel::Alert)
        );

        // A later safe signal cannot undo a confirmed alert.
        let mut event = text_event("all good now", "00:20", "me");
        event.risk_signal = Some(RiskSignal {
            level: RiskLevel::Safe,
            rationale: None,
        });
        let delta = agg.apply_event(event);
        assert!(!delta.risk_changed);
        assert_eq!(agg.risk().level, RiskLevel::Alert);
    }

    #[test]
    fn test_risk_derived_from_speaker_grades() {
        let mut agg = Aggregator::new(CallerRoster::new());

        let event = AnalysisEvent {
            speakers: vec![SpeakerUpdate {
                id: "s1".to_string(),
                suspicion: Some(Suspicion::High),
                ..Default::default()
            }],
            ..Default::default()
        };
        let delta = agg.apply_event(event);

        assert!(delta.speakers_changed);
        assert!(delta.risk_changed);
        assert!(delta.new_entry.is_none());
        assert_eq!(agg.risk().level, RiskLevel::Alert);
    }

    #[test]
    fn test_speaker_only_events_are_never_deduped() {
        let mut agg = Aggregator::new(CallerRoster::new());

        let update = |name: &str| AnalysisEvent {
            speakers: vec![SpeakerUpdate {
                id: "s1".to_string(),
                name: Some(name.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(!agg.apply_event(update("First")).is_empty());
        assert!(!agg.apply_event(update("Second")).is_empty());
        assert_eq!(agg.speakers()[0].display_name, "Second");
    }

    #[test]
    fn test_rationale_survives_placeholder_chatter() {
        let mut agg = Aggregator::new(CallerRoster::new());

        let verdict = |level, rationale: &str| AnalysisEvent {
            text: Some(format!("line for {rationale}")),
            risk_signal: Some(RiskSignal {
                level,
                rationale: Some(rationale.to_string()),
            }),
            ..Default::default()
        };

        agg.apply_event(verdict(RiskLevel::Cautious, "Pressure language observed."));
        agg.apply_event(verdict(RiskLevel::Cautious, "Unable to aggregate results"));

        assert_eq!(agg.risk().rationale, "Pressure language observed.");
    }

    #[test]
    fn test_reset_clears_everything_including_dedup() {
        let mut agg = Aggregator::new(roster());

        let mut event = text_event("scam line", "00:10", "s1");
        event.risk_signal = Some(RiskSignal {
            level: RiskLevel::Alert,
            rationale: Some("Confirmed scam.".to_string()),
        });
        agg.apply_event(event.clone());
        assert_eq!(agg.risk().level, RiskLevel::Alert);

        agg.reset();
        assert_eq!(agg.entry_count(), 0);
        assert!(agg.speakers().is_empty());
        assert_eq!(agg.risk().level, RiskLevel::Neutral);
        assert!(agg.risk().rationale.is_empty());

        // The same event applies again on the next call.
        let delta = agg.apply_event(event);
        assert!(delta.new_entry.is_some());
    }
}
