//! In-memory row store
//!
//! Reference backend with the same observable semantics as the production
//! store: single-row compare-and-set under one writer lock, per-session
//! broadcast channels for change notifications, and a presence map that
//! keeps the full entry history per key. Used by the integration tests and
//! the simulator; also the place where failure modes (clock skew, missing
//! votes table) can be injected.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use super::types::*;
use super::{RowStore, SharedRowStore, StoreError, StoreResult};
use crate::cards::Card;

/// Capacity of each session's notification channel.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, SessionRecord>,
    votes: HashMap<SessionId, BTreeMap<ParticipantId, Card>>,
    presence: HashMap<SessionId, BTreeMap<String, Vec<Participant>>>,
}

/// In-memory implementation of [`RowStore`].
pub struct MemoryRowStore {
    tables: RwLock<Tables>,
    channels: Mutex<HashMap<SessionId, broadcast::Sender<StoreEvent>>>,
    /// Simulated skew of the store's clock against local wall time.
    server_skew: chrono::Duration,
    /// When false, vote operations fail as if the table was never provisioned.
    votes_table_present: bool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            channels: Mutex::new(HashMap::new()),
            server_skew: chrono::Duration::zero(),
            votes_table_present: true,
        }
    }

    /// Store whose `server_time` runs `skew` ahead of local wall time.
    pub fn with_server_skew(skew: chrono::Duration) -> Self {
        Self {
            server_skew: skew,
            ..Self::new()
        }
    }

    /// Store behaving like a deployment where the votes table was never
    /// created.
    pub fn without_votes_table() -> Self {
        Self {
            votes_table_present: false,
            ..Self::new()
        }
    }

    /// Wrap in a shared trait-object handle.
    pub fn shared(self) -> SharedRowStore {
        std::sync::Arc::new(self)
    }

    fn sender(&self, session_id: &str) -> broadcast::Sender<StoreEvent> {
        let mut channels = self.channels.lock().expect("channel registry poisoned");
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn publish(&self, event: StoreEvent) {
        let channels = self.channels.lock().expect("channel registry poisoned");
        if let Some(sender) = channels.get(event.session_id()) {
            // No receivers is fine; the write already happened.
            let _ = sender.send(event);
        }
    }

    fn check_votes_table(&self) -> StoreResult<()> {
        if self.votes_table_present {
            Ok(())
        } else {
            Err(StoreError::SchemaMissing("votes".into()))
        }
    }
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert_session(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if tables.sessions.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        tables.sessions.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.sessions.get(session_id).cloned())
    }

    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> StoreResult<()> {
        let snapshot = {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            let record = tables
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
            patch.apply(record);
            record.clone()
        };
        self.publish(StoreEvent::SessionChanged {
            session_id: session_id.to_string(),
            record: snapshot,
        });
        Ok(())
    }

    async fn update_session_if(
        &self,
        session_id: &str,
        patch: SessionPatch,
        guard: SessionGuard,
    ) -> StoreResult<u64> {
        let snapshot = {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            let Some(record) = tables.sessions.get_mut(session_id) else {
                return Ok(0);
            };
            if !guard.matches(record) {
                debug!(session_id, ?guard, "conditional update predicate missed");
                return Ok(0);
            }
            patch.apply(record);
            record.clone()
        };
        self.publish(StoreEvent::SessionChanged {
            session_id: session_id.to_string(),
            record: snapshot,
        });
        Ok(1)
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.sessions.remove(session_id);
        tables.votes.remove(session_id);
        tables.presence.remove(session_id);
        Ok(())
    }

    async fn upsert_vote(
        &self,
        session_id: &str,
        participant_id: &str,
        value: Card,
    ) -> StoreResult<()> {
        self.check_votes_table()?;
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            if !tables.sessions.contains_key(session_id) {
                return Err(StoreError::NotFound(session_id.to_string()));
            }
            tables
                .votes
                .entry(session_id.to_string())
                .or_default()
                .insert(participant_id.to_string(), value);
        }
        self.publish(StoreEvent::VotesChanged {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn fetch_votes(&self, session_id: &str) -> StoreResult<HashMap<ParticipantId, Card>> {
        self.check_votes_table()?;
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables
            .votes
            .get(session_id)
            .map(|votes| votes.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }

    async fn clear_votes(&self, session_id: &str) -> StoreResult<()> {
        self.check_votes_table()?;
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            tables.votes.remove(session_id);
        }
        self.publish(StoreEvent::VotesChanged {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn track_presence(
        &self,
        session_id: &str,
        key: &str,
        participant: Participant,
    ) -> StoreResult<()> {
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            tables
                .presence
                .entry(session_id.to_string())
                .or_default()
                .entry(key.to_string())
                .or_default()
                .push(participant);
        }
        self.publish(StoreEvent::PresenceSync {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn untrack_presence(&self, session_id: &str, key: &str) -> StoreResult<()> {
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(entries) = tables.presence.get_mut(session_id) {
                entries.remove(key);
            }
        }
        self.publish(StoreEvent::PresenceSync {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    async fn presence_state(
        &self,
        session_id: &str,
    ) -> StoreResult<BTreeMap<String, Vec<Participant>>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.presence.get(session_id).cloned().unwrap_or_default())
    }

    async fn server_time(&self) -> StoreResult<DateTime<Utc>> {
        Ok(Utc::now() + self.server_skew)
    }

    fn subscribe(&self, session_id: &str) -> broadcast::Receiver<StoreEvent> {
        self.sender(session_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SessionRecord {
        SessionRecord::new(id, Utc::now())
    }

    fn advocate() -> DevilsAdvocate {
        DevilsAdvocate {
            participant_id: "p1".into(),
            name: "Ada".into(),
            value: Card::One,
            side: AdvocateSide::Low,
            started_at: Utc::now(),
            duration_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();
        let err = store.insert_session(&record("s1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_conditional_update_counts_rows() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();

        let first = store
            .update_session_if(
                "s1",
                SessionPatch::new().advocate(Some(advocate())),
                SessionGuard::AdvocateActive(false),
            )
            .await
            .unwrap();
        assert_eq!(first, 1);

        // Predicate no longer holds: silently affects zero rows.
        let second = store
            .update_session_if(
                "s1",
                SessionPatch::new().advocate(Some(advocate())),
                SessionGuard::AdvocateActive(false),
            )
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_conditional_update_on_missing_session_is_zero_rows() {
        let store = MemoryRowStore::new();
        let affected = store
            .update_session_if(
                "ghost",
                SessionPatch::new().revealed(true),
                SessionGuard::AdvocateActive(false),
            )
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_vote_upsert_overwrites() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();
        store.upsert_vote("s1", "p1", Card::Five).await.unwrap();
        store.upsert_vote("s1", "p1", Card::Eight).await.unwrap();

        let votes = store.fetch_votes("s1").await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes["p1"], Card::Eight);
    }

    #[tokio::test]
    async fn test_clear_votes_on_empty_set_is_noop() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();
        store.clear_votes("s1").await.unwrap();
        store.clear_votes("s1").await.unwrap();
        assert!(store.fetch_votes("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_votes_table_surfaces_schema_error() {
        let store = MemoryRowStore::without_votes_table();
        store.insert_session(&record("s1")).await.unwrap();
        let err = store.upsert_vote("s1", "p1", Card::Five).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMissing(_)));
    }

    #[tokio::test]
    async fn test_change_feed_delivers_session_updates() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();
        let mut rx = store.subscribe("s1");

        store
            .update_session("s1", SessionPatch::new().revealed(true))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            StoreEvent::SessionChanged { record, .. } => assert!(record.revealed),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let store = MemoryRowStore::new();
        store.insert_session(&record("s1")).await.unwrap();
        store.upsert_vote("s1", "p1", Card::Five).await.unwrap();
        store
            .track_presence("s1", "p1", Participant::new("p1", "Ada", "🚀"))
            .await
            .unwrap();

        store.delete_session("s1").await.unwrap();

        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.fetch_votes("s1").await.unwrap().is_empty());
        assert!(store.presence_state("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_time_applies_skew() {
        let store = MemoryRowStore::with_server_skew(chrono::Duration::hours(2));
        let server = store.server_time().await.unwrap();
        let delta = server - Utc::now();
        assert!(delta > chrono::Duration::minutes(119));
        assert!(delta < chrono::Duration::minutes(121));
    }
}
