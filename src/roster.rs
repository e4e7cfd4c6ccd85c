//! # Known-Caller Roster
//!
//! A read-only directory of callers the user already trusts: themselves,
//! family members, their bank's real support line. Speaker tracking consults
//! the roster exactly once per speaker, when the speaker is first observed,
//! to decide whether the voice belongs to the user or to a known-safe
//! contact. Everyone else starts out unclassified.
//!
//! The roster is populated before a call starts and never changes during
//! one. Lookups that miss are a normal outcome, not an error.

use std::collections::HashMap;

/// One trusted caller. `is_self` marks the user's own voice so it can be
/// told apart from other known-safe contacts.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: String,
    pub display_name: String,
    pub role: Option<String>,
    pub is_self: bool,
}

impl RosterEntry {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role: None,
            is_self: false,
        }
    }

    /// Marks this entry as the user's own voice.
    pub fn as_self(mut self) -> Self {
        self.is_self = true;
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }
}

/// Directory of trusted callers, keyed by the speaker identifier the
/// analysis service reports.
#[derive(Debug, Clone, Default)]
pub struct CallerRoster {
    entries: HashMap<String, RosterEntry>,
}

impl CallerRoster {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builder-style insertion, used when assembling the roster at startup.
    pub fn with_entry(mut self, entry: RosterEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn insert(&mut self, entry: RosterEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Looks up a speaker identifier. A miss means the caller is simply
    /// not in the directory.
    pub fn lookup(&self, id: &str) -> Option<&RosterEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_hit_and_miss() {
        let roster = CallerRoster::new()
            .with_entry(RosterEntry::new("me", "You").as_self())
            .with_entry(RosterEntry::new("mom", "Mom").with_role("family"));

        let me = roster.lookup("me").unwrap();
        assert!(me.is_self);
        assert_eq!(me.display_name, "You");

        let mom = roster.lookup("mom").unwrap();
        assert!(!mom.is_self);
        assert_eq!(mom.role.as_deref(), Some("family"));

        assert!(roster.lookup("stranger-1").is_none());
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut roster = CallerRoster::new();
        roster.insert(RosterEntry::new("me", "Me"));
        roster.insert(RosterEntry::new("me", "You").as_self());

        assert_eq!(roster.len(), 1);
        let entry = roster.lookup("me").unwrap();
        assert_eq!(entry.display_name, "You");
        assert!(entry.is_self);
    }

    #[test]
    fn test_empty_roster() {
        let roster = CallerRoster::new();
        assert!(roster.is_empty());
        assert!(roster.lookup("anyone").is_none());
    }
}
