//! # Risk Ladder
//!
//! Tracks how dangerous the current call looks. The level only ever climbs
//! while evidence accumulates; a scam verdict is deliberately hard to undo
//! so that a scammer cannot talk the indicator back down.
//!
//! ## The Ladder:
//! - **Neutral**: not enough evidence either way. Never changes the state.
//! - **Safe**: the caller matched the user's safe list. Overrides anything
//!   except an alert already on record.
//! - **Cautious**: suspicious signals observed. Withdraws an earlier safe
//!   verdict but never an alert.
//! - **Alert**: scam confirmed. Permanent for the rest of the call.
//!
//! Each inbound analysis event contributes one candidate level, either
//! carried explicitly on the event or derived from the speakers seen so
//! far, and the reducer in [`RiskState::apply_level`] folds it in.

use serde::Serialize;
use tracing::debug;

use crate::analysis::speakers::{Speaker, SpeakerClass, Suspicion};

/// Rationale fragments the analysis service emits while it has nothing
/// real to say. They may seed an empty rationale but never replace one
/// the user has already been shown.
const PLACEHOLDER_RATIONALES: [&str; 3] = ["error", "unable to aggregate", "analyzing conversation"];

/// Threat level for the call as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Neutral,
    Safe,
    Cautious,
    Alert,
}

impl RiskLevel {
    /// Parses the level field of an aggregated wire verdict. Unknown
    /// strings yield `None` so the caller can decide how to degrade.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "neutral" => Some(RiskLevel::Neutral),
            "safe" => Some(RiskLevel::Safe),
            "cautious" => Some(RiskLevel::Cautious),
            "alert" => Some(RiskLevel::Alert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RiskLevel::Neutral => "neutral",
            RiskLevel::Safe => "safe",
            RiskLevel::Cautious => "cautious",
            RiskLevel::Alert => "alert",
        }
    }

    /// One-word label for display.
    pub fn label(&self) -> &str {
        match self {
            RiskLevel::Neutral => "Neutral",
            RiskLevel::Safe => "Safe",
            RiskLevel::Cautious => "Caution",
            RiskLevel::Alert => "Alert",
        }
    }

    /// One-sentence verdict shown under the label.
    pub fn headline(&self) -> &str {
        match self {
            RiskLevel::Neutral => "Listening... awaiting more evidence.",
            RiskLevel::Safe => "Known caller.",
            RiskLevel::Cautious => "Potential scammer. Proceed carefully.",
            RiskLevel::Alert => "Highly likely to be a scammer.",
        }
    }

    /// Fallback rationale used when the service has not supplied one.
    /// `has_known_caller` picks the safe-list wording for the safe level.
    pub fn default_rationale(&self, has_known_caller: bool) -> &str {
        match self {
            RiskLevel::Neutral => "Not enough speech analyzed yet to make a determination.",
            RiskLevel::Safe => {
                if has_known_caller {
                    "Matches your safe list with no suspicious behavior."
                } else {
                    "No suspicious signals detected."
                }
            }
            RiskLevel::Cautious => "Inconsistent claims and pressure language observed.",
            RiskLevel::Alert => "Urgency, payment/OTP requests, and identity spoofing cues detected.",
        }
    }
}

/// Current verdict plus the explanation that justifies it. One per active
/// call; a new call starts from [`RiskState::default`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    pub level: RiskLevel,
    pub rationale: String,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            level: RiskLevel::Neutral,
            rationale: String::new(),
        }
    }
}

impl RiskState {
    /// Folds one candidate level into the state. Returns true when the
    /// stored level actually changed.
    ///
    /// ## Transition Rules:
    /// - alert always wins and is permanent for the call
    /// - safe and cautious replace each other freely until an alert lands
    /// - neutral carries no information and leaves the state alone
    pub fn apply_level(&mut self, candidate: RiskLevel) -> bool {
        let next = match candidate {
            RiskLevel::Alert => RiskLevel::Alert,
            RiskLevel::Safe | RiskLevel::Cautious if self.level == RiskLevel::Alert => {
                debug!(
                    "Ignoring {} signal; alert verdict is permanent",
                    candidate.as_str()
                );
                RiskLevel::Alert
            }
            RiskLevel::Safe => RiskLevel::Safe,
            RiskLevel::Cautious => RiskLevel::Cautious,
            RiskLevel::Neutral => self.level,
        };

        if next == self.level {
            return false;
        }
        self.level = next;
        true
    }

    /// Folds one incoming rationale into the state. Returns true when the
    /// stored text changed.
    ///
    /// The first rationale of a call is always accepted. After that,
    /// placeholder chatter (the service reporting an error or still
    /// thinking) never replaces a real explanation already on record.
    pub fn apply_rationale(&mut self, incoming: &str) -> bool {
        if incoming.is_empty() {
            return false;
        }
        if !self.rationale.is_empty() && is_placeholder(incoming) {
            debug!("Keeping stored rationale over placeholder: {:?}", incoming);
            return false;
        }
        if self.rationale == incoming {
            return false;
        }
        self.rationale = incoming.to_string();
        true
    }

    /// The rationale to display, falling back to canned wording per level
    /// when the service has not explained itself yet.
    pub fn rationale_or_default(&self, has_known_caller: bool) -> &str {
        if self.rationale.is_empty() {
            self.level.default_rationale(has_known_caller)
        } else {
            &self.rationale
        }
    }
}

fn is_placeholder(rationale: &str) -> bool {
    let lowered = rationale.to_lowercase();
    PLACEHOLDER_RATIONALES
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// Candidate level implied by the speakers observed so far, used when an
/// event carries no explicit verdict. Confirmed suspects outrank safe-list
/// matches: a known contact on the line does not excuse a scammer on it.
pub fn derive_from_speakers(speakers: &[Speaker]) -> RiskLevel {
    let mut has_medium = false;
    let mut has_trusted = false;
    for speaker in speakers {
        match speaker.classification {
            SpeakerClass::ScamSuspect(Suspicion::High) => return RiskLevel::Alert,
            SpeakerClass::ScamSuspect(Suspicion::Medium) => has_medium = true,
            SpeakerClass::SelfSpeaker | SpeakerClass::KnownSafe => has_trusted = true,
            SpeakerClass::Unknown => {}
        }
    }
    if has_medium {
        RiskLevel::Cautious
    } else if has_trusted {
        RiskLevel::Safe
    } else {
        RiskLevel::Neutral
    }
}
