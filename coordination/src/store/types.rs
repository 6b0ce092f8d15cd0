//! Core types for the shared session record and its change feed
//!
//! One `SessionRecord` exists per voting room. It is owned by the external
//! row store; every client holds a read-through cache that is refreshed on
//! each local mutation and each change notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cards::Card;

/// Unique identifier for a voting session.
pub type SessionId = String;

/// Stable identifier for a participant, persisted per browser profile.
pub type ParticipantId = String;

/// Which extreme of the split the advocate is assigned to defend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvocateSide {
    Low,
    High,
}

impl std::fmt::Display for AdvocateSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvocateSide::Low => write!(f, "low"),
            AdvocateSide::High => write!(f, "high"),
        }
    }
}

/// The devil's advocate assignment for an in-progress arbitration round.
///
/// The fields travel as one group: either the whole assignment is present
/// on the record or none of it is. `SessionRecord::advocate` being `Some`
/// is what the rest of the system reads as "arbitration active".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevilsAdvocate {
    /// The voter chosen to argue the assigned extreme.
    pub participant_id: ParticipantId,
    /// Display name captured from presence at activation time.
    pub name: String,
    /// The extreme value the advocate defends.
    pub value: Card,
    /// Which extreme `value` is.
    pub side: AdvocateSide,
    /// When the round started, in server-corrected time.
    pub started_at: DateTime<Utc>,
    /// Round length in seconds.
    pub duration_secs: u32,
}

impl DevilsAdvocate {
    /// Instant at which the round ends.
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(i64::from(self.duration_secs))
    }

    /// Time left in the round, clamped to zero.
    ///
    /// Derived from the stored deadline on every call rather than counted
    /// down locally, so it self-corrects after missed ticks or suspension.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.ends_at() - now).to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

/// The single shared mutable record for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier, generated client-side at creation.
    pub id: SessionId,
    /// Whether current votes are visible to everyone.
    pub revealed: bool,
    /// Updated on any participant action; drives TTL expiry.
    pub last_activity_at: DateTime<Utc>,
    /// Consecutive reveals classified as a deadlock, capped at 2.
    pub deadlock_count: u8,
    /// In-progress arbitration round, if any.
    pub devils_advocate: Option<DevilsAdvocate>,
}

impl SessionRecord {
    /// Fresh hidden record with zeroed counters.
    pub fn new(id: impl Into<SessionId>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            revealed: false,
            last_activity_at: now,
            deadlock_count: 0,
            devils_advocate: None,
        }
    }

    /// Whether an arbitration round is in progress.
    pub fn advocate_active(&self) -> bool {
        self.devils_advocate.is_some()
    }
}

/// Partial update for a session record.
///
/// Unset fields are left untouched; `advocate` distinguishes "don't touch"
/// (`None`) from "clear the assignment" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub revealed: Option<bool>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub deadlock_count: Option<u8>,
    pub advocate: Option<Option<DevilsAdvocate>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revealed(mut self, revealed: bool) -> Self {
        self.revealed = Some(revealed);
        self
    }

    /// Record activity at `now`.
    pub fn touch(mut self, now: DateTime<Utc>) -> Self {
        self.last_activity_at = Some(now);
        self
    }

    pub fn deadlock_count(mut self, count: u8) -> Self {
        self.deadlock_count = Some(count);
        self
    }

    /// Set or clear the advocate assignment as a whole group.
    pub fn advocate(mut self, advocate: Option<DevilsAdvocate>) -> Self {
        self.advocate = Some(advocate);
        self
    }

    /// Apply this patch to a record in place.
    pub fn apply(&self, record: &mut SessionRecord) {
        if let Some(revealed) = self.revealed {
            record.revealed = revealed;
        }
        if let Some(at) = self.last_activity_at {
            record.last_activity_at = at;
        }
        if let Some(count) = self.deadlock_count {
            record.deadlock_count = count;
        }
        if let Some(advocate) = &self.advocate {
            record.devils_advocate = advocate.clone();
        }
    }
}

/// Equality predicate for conditional updates.
///
/// The store applies a guarded patch only when the predicate holds against
/// the record's current value at write time, and reports how many rows were
/// actually modified. Zero rows under contention means another client won
/// the race; callers treat it as a no-op, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGuard {
    /// Apply only if `advocate_active()` currently equals the given value.
    AdvocateActive(bool),
}

impl SessionGuard {
    pub fn matches(&self, record: &SessionRecord) -> bool {
        match self {
            SessionGuard::AdvocateActive(expected) => record.advocate_active() == *expected,
        }
    }
}

/// A participant as tracked on the presence channel.
///
/// Not persisted beyond the channel's lifetime; only `id` is a stable
/// identity across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub emoji: String,
}

impl Participant {
    pub fn new(
        id: impl Into<ParticipantId>,
        name: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
        }
    }
}

/// Push notifications delivered on a session's change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The session record changed; carries the new row.
    SessionChanged {
        session_id: SessionId,
        record: SessionRecord,
    },
    /// The vote set for the session changed.
    VotesChanged { session_id: SessionId },
    /// Presence membership changed; fetch the full state to rebuild.
    PresenceSync { session_id: SessionId },
}

impl StoreEvent {
    pub fn session_id(&self) -> &str {
        match self {
            StoreEvent::SessionChanged { session_id, .. }
            | StoreEvent::VotesChanged { session_id }
            | StoreEvent::PresenceSync { session_id } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::SessionChanged { .. } => "session_changed",
            StoreEvent::VotesChanged { .. } => "votes_changed",
            StoreEvent::PresenceSync { .. } => "presence_sync",
        }
    }
}
