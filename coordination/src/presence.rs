//! Live participant roster
//!
//! Built from the presence channel's sync events. The channel may hold
//! several entries under one key while a reconnecting participant's old
//! connection ages out; only the most recently tracked entry per key
//! counts. The roster is rebuilt wholesale on every sync; entries are
//! never accumulated across syncs.

use std::collections::BTreeMap;

use crate::store::{Participant, ParticipantId};

/// Ordered list of live participants, last-writer-wins per presence key.
///
/// Ordering is not stable across syncs; only `Participant::id` is a stable
/// identity.
#[derive(Debug, Default, Clone)]
pub struct PresenceRoster {
    participants: Vec<Participant>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster from a full per-key presence map.
    pub fn apply_sync(&mut self, state: &BTreeMap<String, Vec<Participant>>) {
        self.participants = state
            .values()
            .filter_map(|entries| entries.last().cloned())
            .collect();
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_of(entries: &[(&str, Vec<Participant>)]) -> BTreeMap<String, Vec<Participant>> {
        entries
            .iter()
            .map(|(key, list)| (key.to_string(), list.clone()))
            .collect()
    }

    #[test]
    fn test_last_entry_per_key_wins() {
        let mut roster = PresenceRoster::new();
        let state = state_of(&[(
            "p1",
            vec![
                Participant::new("p1", "Ada (old tab)", "🚀"),
                Participant::new("p1", "Ada", "🔥"),
            ],
        )]);

        roster.apply_sync(&state);

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(&"p1".to_string()).unwrap().name, "Ada");
        assert_eq!(roster.get(&"p1".to_string()).unwrap().emoji, "🔥");
    }

    #[test]
    fn test_sync_replaces_rather_than_accumulates() {
        let mut roster = PresenceRoster::new();
        roster.apply_sync(&state_of(&[
            ("p1", vec![Participant::new("p1", "Ada", "🚀")]),
            ("p2", vec![Participant::new("p2", "Grace", "🐱")]),
        ]));
        assert_eq!(roster.len(), 2);

        // p2 left; the next sync carries only p1.
        roster.apply_sync(&state_of(&[(
            "p1",
            vec![Participant::new("p1", "Ada", "🚀")],
        )]));
        assert_eq!(roster.len(), 1);
        assert!(roster.get(&"p2".to_string()).is_none());
    }

    #[test]
    fn test_empty_entry_lists_are_skipped() {
        let mut roster = PresenceRoster::new();
        roster.apply_sync(&state_of(&[("p1", vec![])]));
        assert!(roster.is_empty());
    }
}
