//! Devil's advocate arbitration
//!
//! After two consecutive deadlocked reveals, one voter is drafted to defend
//! one extreme for a fixed time box. Activation and expiry are both single
//! conditional writes against the shared record, guarded on the current
//! `advocate_active` flag, so with any number of racing clients exactly one
//! activation fires per deadlock and the round is ended exactly once.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::cards::Card;
use crate::clock::ClockSync;
use crate::deadlock::{detect, DeadlockReport};
use crate::presence::PresenceRoster;
use crate::rng::{coin_flip, uniform_random_index};
use crate::session::{SessionRecordStore, VoteStore};
use crate::store::{
    AdvocateSide, DevilsAdvocate, ParticipantId, SessionGuard, SessionPatch, SessionRecord,
    SharedRowStore, StoreResult,
};

/// Consecutive deadlocked reveals needed to start arbitration.
pub const DEADLOCK_TRIGGER: u8 = 2;

/// What a post-reveal evaluation did to the shared record.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationOutcome {
    /// Reveal was not a deadlock; the counter was reset.
    CountCleared,
    /// Deadlock observed but below the trigger (or activation aborted for
    /// lack of voters); the counter now holds this value.
    CountRecorded(u8),
    /// This client's conditional activation applied.
    Activated(DevilsAdvocate),
    /// Another client activated first; its state will arrive on the change
    /// feed. Not an error.
    Deferred,
}

/// Runs the deadlock counter and the CAS-guarded arbitration sub-protocol.
pub struct DevilsAdvocateArbiter {
    sessions: SessionRecordStore,
    votes: VoteStore,
    clock: ClockSync,
    duration_secs: u32,
}

impl DevilsAdvocateArbiter {
    pub fn new(store: SharedRowStore, clock: ClockSync, duration_secs: u32) -> Self {
        Self {
            sessions: SessionRecordStore::new(store.clone()),
            votes: VoteStore::new(store),
            clock,
            duration_secs,
        }
    }

    /// Evaluate a just-revealed round.
    ///
    /// Runs for the local reveal and for every remote `revealed` flip; it is
    /// never polled independently. Each observer derives the same counter
    /// value from the record snapshot it saw, so concurrent writers
    /// converge, and the activation itself is guarded by a conditional
    /// write.
    pub async fn evaluate_reveal(
        &self,
        record: &SessionRecord,
        votes: &HashMap<ParticipantId, Card>,
        roster: &PresenceRoster,
    ) -> StoreResult<ArbitrationOutcome> {
        let now = self.clock.now();

        let Some(report) = detect(votes) else {
            if record.deadlock_count != 0 {
                self.sessions
                    .update(
                        &record.id,
                        SessionPatch::new().deadlock_count(0).touch(now),
                    )
                    .await?;
            }
            return Ok(ArbitrationOutcome::CountCleared);
        };

        let next = (record.deadlock_count + 1).min(DEADLOCK_TRIGGER);
        if next < DEADLOCK_TRIGGER {
            info!(
                session_id = %record.id,
                deadlock_count = next,
                low = %report.low,
                high = %report.high,
                "Deadlocked reveal recorded"
            );
            self.sessions
                .update(
                    &record.id,
                    SessionPatch::new().deadlock_count(next).touch(now),
                )
                .await?;
            return Ok(ArbitrationOutcome::CountRecorded(next));
        }

        self.activate(record, votes, roster, report).await
    }

    /// Attempt the single conditional activation write.
    async fn activate(
        &self,
        record: &SessionRecord,
        votes: &HashMap<ParticipantId, Card>,
        roster: &PresenceRoster,
        report: DeadlockReport,
    ) -> StoreResult<ArbitrationOutcome> {
        let now = self.clock.now();

        // Only voters with a recorded vote qualify; with an empty pool
        // (votes cleared since the reveal) there is nobody to draft, so
        // record a single deadlock instead of starting a round.
        let mut voters: Vec<&ParticipantId> = votes.keys().collect();
        voters.sort();
        if voters.is_empty() {
            self.sessions
                .update(&record.id, SessionPatch::new().deadlock_count(1).touch(now))
                .await?;
            return Ok(ArbitrationOutcome::CountRecorded(1));
        }

        let chosen = voters[uniform_random_index(voters.len())].clone();
        let side = if coin_flip() {
            AdvocateSide::Low
        } else {
            AdvocateSide::High
        };
        let value = match side {
            AdvocateSide::Low => report.low,
            AdvocateSide::High => report.high,
        };
        let name = roster
            .get(&chosen)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| anonymous_name(&chosen));

        let advocate = DevilsAdvocate {
            participant_id: chosen,
            name,
            value,
            side,
            started_at: now,
            duration_secs: self.duration_secs,
        };

        let patch = SessionPatch::new()
            .advocate(Some(advocate.clone()))
            .deadlock_count(0)
            .touch(now);
        let applied = self
            .sessions
            .update_if(&record.id, patch, SessionGuard::AdvocateActive(false))
            .await?;

        if applied == 0 {
            // Another client won the race; defer to its state silently.
            debug!(session_id = %record.id, "Arbitration already activated elsewhere");
            return Ok(ArbitrationOutcome::Deferred);
        }

        info!(
            session_id = %record.id,
            advocate = %advocate.name,
            side = %advocate.side,
            value = %advocate.value,
            duration_secs = advocate.duration_secs,
            "Devil's advocate round started"
        );
        Ok(ArbitrationOutcome::Activated(advocate))
    }

    /// End an arbitration round whose countdown reached zero.
    ///
    /// Votes are purged first (idempotent: deleting an empty set is a
    /// no-op), then the record is cleared under a guard on
    /// `advocate_active = true`. Returns whether this client's write
    /// applied; `false` means another client already ended the round.
    pub async fn expire(&self, session_id: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        self.votes.clear_all(session_id).await?;

        let patch = SessionPatch::new()
            .advocate(None)
            .revealed(false)
            .deadlock_count(0)
            .touch(now);
        let applied = self
            .sessions
            .update_if(session_id, patch, SessionGuard::AdvocateActive(true))
            .await?;

        if applied > 0 {
            info!(session_id, "Devil's advocate round expired, session reset");
        } else {
            debug!(session_id, "Arbitration already ended elsewhere");
        }
        Ok(applied > 0)
    }
}

/// Fallback display name when the chosen voter has dropped from presence.
fn anonymous_name(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("Voter {prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRowStore;
    use chrono::Utc;

    fn votes_of(entries: &[(&str, Card)]) -> HashMap<ParticipantId, Card> {
        entries
            .iter()
            .map(|(id, card)| (id.to_string(), *card))
            .collect()
    }

    fn deadlocked_votes() -> HashMap<ParticipantId, Card> {
        votes_of(&[
            ("a", Card::One),
            ("b", Card::One),
            ("c", Card::Thirteen),
            ("d", Card::Thirteen),
        ])
    }

    async fn arbiter_with_session() -> (DevilsAdvocateArbiter, SessionRecordStore) {
        let store = MemoryRowStore::new().shared();
        let sessions = SessionRecordStore::new(store.clone());
        sessions
            .create(&SessionRecord::new("s1", Utc::now()))
            .await
            .unwrap();
        let clock = ClockSync::with_offset(chrono::Duration::zero());
        (DevilsAdvocateArbiter::new(store, clock, 60), sessions)
    }

    #[tokio::test]
    async fn test_first_deadlock_only_records_count() {
        let (arbiter, sessions) = arbiter_with_session().await;
        let record = sessions.read("s1").await.unwrap();

        let outcome = arbiter
            .evaluate_reveal(&record, &deadlocked_votes(), &PresenceRoster::new())
            .await
            .unwrap();

        assert_eq!(outcome, ArbitrationOutcome::CountRecorded(1));
        let record = sessions.read("s1").await.unwrap();
        assert_eq!(record.deadlock_count, 1);
        assert!(!record.advocate_active());
    }

    #[tokio::test]
    async fn test_second_deadlock_activates() {
        let (arbiter, sessions) = arbiter_with_session().await;
        let record = sessions.read("s1").await.unwrap();
        arbiter
            .evaluate_reveal(&record, &deadlocked_votes(), &PresenceRoster::new())
            .await
            .unwrap();

        let record = sessions.read("s1").await.unwrap();
        let outcome = arbiter
            .evaluate_reveal(&record, &deadlocked_votes(), &PresenceRoster::new())
            .await
            .unwrap();

        let advocate = match outcome {
            ArbitrationOutcome::Activated(advocate) => advocate,
            other => panic!("expected activation, got {other:?}"),
        };
        assert!(deadlocked_votes().contains_key(&advocate.participant_id));
        assert!(matches!(advocate.value, Card::One | Card::Thirteen));

        let record = sessions.read("s1").await.unwrap();
        assert!(record.advocate_active());
        assert_eq!(record.deadlock_count, 0);
    }

    #[tokio::test]
    async fn test_clean_reveal_resets_counter() {
        let (arbiter, sessions) = arbiter_with_session().await;
        let record = sessions.read("s1").await.unwrap();
        arbiter
            .evaluate_reveal(&record, &deadlocked_votes(), &PresenceRoster::new())
            .await
            .unwrap();

        let record = sessions.read("s1").await.unwrap();
        let consensus = votes_of(&[("a", Card::Five), ("b", Card::Five)]);
        let outcome = arbiter
            .evaluate_reveal(&record, &consensus, &PresenceRoster::new())
            .await
            .unwrap();

        assert_eq!(outcome, ArbitrationOutcome::CountCleared);
        assert_eq!(sessions.read("s1").await.unwrap().deadlock_count, 0);
    }

    #[tokio::test]
    async fn test_activation_without_voters_records_count_one() {
        let (arbiter, sessions) = arbiter_with_session().await;
        sessions
            .update("s1", SessionPatch::new().deadlock_count(1))
            .await
            .unwrap();
        let record = sessions.read("s1").await.unwrap();

        // The no-voter branch guards against a vote set cleared between
        // refresh and activation; drive it directly with an empty pool.
        let outcome = arbiter
            .activate(
                &record,
                &HashMap::new(),
                &PresenceRoster::new(),
                DeadlockReport {
                    low: Card::One,
                    high: Card::Thirteen,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, ArbitrationOutcome::CountRecorded(1));
        let record = sessions.read("s1").await.unwrap();
        assert!(!record.advocate_active());
        assert_eq!(record.deadlock_count, 1);
    }

    #[tokio::test]
    async fn test_expire_clears_record_and_votes() {
        let store = MemoryRowStore::new().shared();
        let sessions = SessionRecordStore::new(store.clone());
        let votes = VoteStore::new(store.clone());
        sessions
            .create(&SessionRecord::new("s1", Utc::now()))
            .await
            .unwrap();
        votes.cast("s1", "a", Card::One, Utc::now()).await.unwrap();

        let clock = ClockSync::with_offset(chrono::Duration::zero());
        let arbiter = DevilsAdvocateArbiter::new(store.clone(), clock, 60);
        sessions
            .update(
                "s1",
                SessionPatch::new()
                    .revealed(true)
                    .advocate(Some(DevilsAdvocate {
                        participant_id: "a".into(),
                        name: "Ada".into(),
                        value: Card::One,
                        side: AdvocateSide::Low,
                        started_at: Utc::now() - chrono::Duration::seconds(61),
                        duration_secs: 60,
                    })),
            )
            .await
            .unwrap();

        assert!(arbiter.expire("s1").await.unwrap());

        let record = sessions.read("s1").await.unwrap();
        assert!(!record.advocate_active());
        assert!(!record.revealed);
        assert_eq!(record.deadlock_count, 0);
        assert!(votes.fetch_all("s1").await.unwrap().is_empty());

        // A second expiry attempt finds the guard already cleared.
        assert!(!arbiter.expire("s1").await.unwrap());
    }
}
