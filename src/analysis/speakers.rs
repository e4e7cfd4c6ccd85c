//! # Speaker Tracking
//!
//! Keeps a registry of every voice heard on the current call. Speakers are
//! keyed by the stable id the analysis service assigns; once registered a
//! speaker is only ever updated in place, never replaced or removed, until
//! the call ends.
//!
//! ## Merge Rule:
//! Wire records about a speaker are partial. A later record fills in fields
//! an earlier one left blank, but a blank field never erases something
//! already known. Suspicion moves the same way: it can climb from medium to
//! high and it never comes back down.
//!
//! The known-caller roster is consulted once, at first sight of an id, to
//! classify the user's own voice and their trusted contacts. Everyone else
//! starts as unknown until the service reports otherwise.

use serde::Serialize;
use tracing::debug;

use crate::roster::CallerRoster;

/// Speaker id the service uses for its own status chatter. Status lines
/// still show up in the transcript but never become a speaker.
pub const SYSTEM_CHANNEL: &str = "System";

/// True for events on the service's diagnostic channel.
pub fn is_system_channel(id: &str) -> bool {
    id.eq_ignore_ascii_case(SYSTEM_CHANNEL)
}

/// How strongly the service suspects a speaker of running a scam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suspicion {
    Medium,
    High,
}

impl Suspicion {
    /// Parses the per-speaker risk grade off the wire. Low risk carries no
    /// suspicion at all, and unrecognized grades are treated the same way.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "medium" => Some(Suspicion::Medium),
            "high" => Some(Suspicion::High),
            _ => None,
        }
    }
}

/// What we believe about a speaker's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeakerClass {
    /// The user's own voice, matched from the roster.
    #[serde(rename = "self")]
    SelfSpeaker,
    /// A caller on the user's safe list.
    #[serde(rename = "known-safe")]
    KnownSafe,
    /// Nobody we recognize and nothing against them yet.
    #[serde(rename = "unknown")]
    Unknown,
    /// Flagged by the analysis service, with how strongly.
    #[serde(rename = "scam-suspect")]
    ScamSuspect(Suspicion),
}

impl SpeakerClass {
    pub fn as_str(&self) -> &str {
        match self {
            SpeakerClass::SelfSpeaker => "self",
            SpeakerClass::KnownSafe => "known-safe",
            SpeakerClass::Unknown => "unknown",
            SpeakerClass::ScamSuspect(_) => "scam-suspect",
        }
    }

    /// True for the user themselves and their safe-list contacts.
    pub fn is_trusted(&self) -> bool {
        matches!(self, SpeakerClass::SelfSpeaker | SpeakerClass::KnownSafe)
    }
}

/// One voice on the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Speaker {
    pub id: String,
    pub display_name: String,
    pub role: Option<String>,
    pub classification: SpeakerClass,
}

impl Speaker {
    /// Escalates the classification to the given suspicion grade. Suspicion
    /// only climbs; a repeat or weaker report changes nothing. Returns true
    /// when the classification changed.
    ///
    /// A roster match does not shield a speaker from this: when the service
    /// flags a voice the evidence wins over the safe list.
    fn raise_suspicion(&mut self, grade: Suspicion) -> bool {
        match (self.classification, grade) {
            (SpeakerClass::ScamSuspect(Suspicion::High), _) => false,
            (SpeakerClass::ScamSuspect(Suspicion::Medium), Suspicion::Medium) => false,
            _ => {
                self.classification = SpeakerClass::ScamSuspect(grade);
                true
            }
        }
    }
}

/// Partial speaker record as normalized off the wire. Absent fields mean
/// "no news", not "remove".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeakerUpdate {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub suspicion: Option<Suspicion>,
}

/// All speakers seen on the current call, in order of first appearance.
#[derive(Debug, Default)]
pub struct SpeakerRegistry {
    speakers: Vec<Speaker>,
}

impl SpeakerRegistry {
    pub fn new() -> Self {
        Self {
            speakers: Vec::new(),
        }
    }

    /// Registers an id seen only as the author of a transcript line. On
    /// first sight the roster decides the classification; known ids are a
    /// no-op. Returns true when a new speaker was added.
    pub fn observe(&mut self, id: &str, roster: &CallerRoster) -> bool {
        if self.contains(id) {
            return false;
        }
        let speaker = match roster.lookup(id) {
            Some(entry) => Speaker {
                id: id.to_string(),
                display_name: entry.display_name.clone(),
                role: entry.role.clone(),
                classification: if entry.is_self {
                    SpeakerClass::SelfSpeaker
                } else {
                    SpeakerClass::KnownSafe
                },
            },
            None => Speaker {
                id: id.to_string(),
                display_name: id.to_string(),
                role: None,
                classification: SpeakerClass::Unknown,
            },
        };
        debug!(
            "Registered speaker {} as {}",
            id,
            speaker.classification.as_str()
        );
        self.speakers.push(speaker);
        true
    }

    /// Merges one wire record into the registry, registering the id first
    /// if needed. Present fields update, absent fields leave the stored
    /// value alone. Returns true when anything changed.
    pub fn merge(&mut self, update: &SpeakerUpdate, roster: &CallerRoster) -> bool {
        let mut changed = self.observe(&update.id, roster);

        if let Some(existing) = self.speakers.iter_mut().find(|s| s.id == update.id) {
            if let Some(name) = update.name.as_deref() {
                if !name.is_empty() && existing.display_name != name {
                    existing.display_name = name.to_string();
                    changed = true;
                }
            }
            if let Some(role) = update.role.as_deref() {
                if existing.role.as_deref() != Some(role) {
                    existing.role = Some(role.to_string());
                    changed = true;
                }
            }
            if let Some(grade) = update.suspicion {
                changed |= existing.raise_suspicion(grade);
            }
        }
        changed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.speakers.iter().any(|s| s.id == id)
    }

    /// Display name for an id, if the speaker is registered.
    pub fn display_label(&self, id: &str) -> Option<&str> {
        self.speakers
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.display_name.as_str())
    }

    pub fn all(&self) -> &[Speaker] {
        &self.speakers
    }

    /// True when at least one roster-matched voice is on the call.
    pub fn has_trusted(&self) -> bool {
        self.speakers
            .iter()
            .any(|s| s.classification.is_trusted())
    }

    /// Name of the first trusted speaker, for "known caller" wording.
    pub fn trusted_name(&self) -> Option<&str> {
        self.speakers
            .iter()
            .find(|s| s.classification.is_trusted())
            .map(|s| s.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    pub fn clear(&mut self) {
        self.speakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::RosterEntry;

    fn test_roster() -> CallerRoster {
        CallerRoster::new()
            .with_entry(RosterEntry::new("me", "You").as_self())
            .with_entry(RosterEntry::new("bank", "First National").with_role("bank"))
    }

    #[test]
    fn test_observe_classifies_from_roster() {
        let roster = test_roster();
        let mut registry = SpeakerRegistry::new();

        assert!(registry.observe("me", &roster));
        assert!(registry.observe("bank", &roster));
        assert!(registry.observe("s1", &roster));

        let all = registry.all();
        assert_eq!(all[0].classification, SpeakerClass::SelfSpeaker);
        assert_eq!(all[0].display_name, "You");
        assert_eq!(all[1].classification, SpeakerClass::KnownSafe);
        assert_eq!(all[1].role.as_deref(), Some("bank"));
        assert_eq!(all[2].classification, SpeakerClass::Unknown);
        assert_eq!(all[2].display_name, "s1");
    }

    #[test]
    fn test_observe_is_idempotent() {
        let roster = CallerRoster::new();
        let mut registry = SpeakerRegistry::new();

        assert!(registry.observe("s1", &roster));
        assert!(!registry.observe("s1", &roster));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_never_erases_a_known_name() {
        let roster = CallerRoster::new();
        let mut registry = SpeakerRegistry::new();

        registry.merge(
            &SpeakerUpdate {
                id: "s1".to_string(),
                name: Some("Unknown".to_string()),
                ..Default::default()
            },
            &roster,
        );
        assert_eq!(registry.display_label("s1"), Some("Unknown"));

        // A later record with no name leaves the stored one in place.
        let changed = registry.merge(
            &SpeakerUpdate {
                id: "s1".to_string(),
                suspicion: Some(Suspicion::Medium),
                ..Default::default()
            },
            &roster,
        );
        assert!(changed);
        assert_eq!(registry.display_label("s1"), Some("Unknown"));

        // An empty string is as good as absent.
        registry.merge(
            &SpeakerUpdate {
                id: "s1".to_string(),
                name: Some(String::new()),
                ..Default::default()
            },
            &roster,
        );
        assert_eq!(registry.display_label("s1"), Some("Unknown"));
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        let roster = CallerRoster::new();
        let mut registry = SpeakerRegistry::new();

        registry.observe("s1", &roster);
        let changed = registry.merge(
            &SpeakerUpdate {
                id: "s1".to_string(),
                name: Some("Mr. Smith".to_string()),
                role: Some("claims to be IRS".to_string()),
                ..Default::default()
            },
            &roster,
        );
        assert!(changed);

        let speaker = &registry.all()[0];
        assert_eq!(speaker.display_name, "Mr. Smith");
        assert_eq!(speaker.role.as_deref(), Some("claims to be IRS"));
    }

    #[test]
    fn test_suspicion_climbs_and_never_drops() {
        let roster = CallerRoster::new();
        let mut registry = SpeakerRegistry::new();

        let update = |suspicion| SpeakerUpdate {
            id: "s1".to_string(),
            suspicion,
            ..Default::default()
        };

        registry.merge(&update(Some(Suspicion::Medium)), &roster);
        assert_eq!(
            registry.all()[0].classification,
            SpeakerClass::ScamSuspect(Suspicion::Medium)
        );

        assert!(registry.merge(&update(Some(Suspicion::High)), &roster));
        assert_eq!(
            registry.all()[0].classification,
            SpeakerClass::ScamSuspect(Suspicion::High)
        );

        // Weaker or absent grades do not walk it back.
        assert!(!registry.merge(&update(Some(Suspicion::Medium)), &roster));
        assert!(!registry.merge(&update(None), &roster));
        assert_eq!(
            registry.all()[0].classification,
            SpeakerClass::ScamSuspect(Suspicion::High)
        );
    }

    #[test]
    fn test_evidence_outranks_the_roster() {
        let roster = test_roster();
        let mut registry = SpeakerRegistry::new();

        registry.observe("bank", &roster);
        registry.merge(
            &SpeakerUpdate {
                id: "bank".to_string(),
                suspicion: Some(Suspicion::High),
                ..Default::default()
            },
            &roster,
        );
        assert_eq!(
            registry.all()[0].classification,
            SpeakerClass::ScamSuspect(Suspicion::High)
        );
        // The roster name survives the reclassification.
        assert_eq!(registry.display_label("bank"), Some("First National"));
    }

    #[test]
    fn test_trusted_lookups() {
        let roster = test_roster();
        let mut registry = SpeakerRegistry::new();
        assert!(!registry.has_trusted());

        registry.observe("s1", &roster);
        assert!(!registry.has_trusted());

        registry.observe("me", &roster);
        assert!(registry.has_trusted());
        assert_eq!(registry.trusted_name(), Some("You"));
    }

    #[test]
    fn test_system_channel_detection() {
        assert!(is_system_channel("System"));
        assert!(is_system_channel("system"));
        assert!(is_system_channel("SYSTEM"));
        assert!(!is_system_channel("sys"));
        assert!(!is_system_channel("s1"));
    }

    #[test]
    fn test_suspicion_parse() {
        assert_eq!(Suspicion::parse("medium"), Some(Suspicion::Medium));
        assert_eq!(Suspicion::parse("high"), Some(Suspicion::High));
        assert_eq!(Suspicion::parse("low"), None);
        assert_eq!(Suspicion::parse("extreme"), None);
    }
}
