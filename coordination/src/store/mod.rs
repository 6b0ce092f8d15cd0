//! Row-store abstraction for session coordination
//!
//! There is no server-side process in this system: all coordination runs
//! through one shared mutable record per session, a votes table, a presence
//! channel, and a push-notification stream, all owned by an external row
//! store. This module defines the typed surface clients program against;
//! [`memory::MemoryRowStore`] is the reference backend used by tests and
//! the simulator.
//!
//! The store's one concurrency primitive is the conditional update: a patch
//! applied only if a predicate on the record's current value still holds,
//! reporting the number of rows modified. Nothing here assumes transactional
//! isolation beyond single-row compare-and-set.

pub mod memory;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::cards::Card;
pub use types::{
    AdvocateSide, DevilsAdvocate, Participant, ParticipantId, SessionGuard, SessionId,
    SessionPatch, SessionRecord, StoreEvent,
};

/// Error type for row-store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("table missing: {0}")]
    SchemaMissing(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for row-store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to a row store
pub type SharedRowStore = Arc<dyn RowStore>;

/// The external row store consumed by every client.
///
/// Change notifications are delivered per session via [`RowStore::subscribe`];
/// they are the primary convergence path, with on-demand reads as the
/// fallback before any write.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a fresh session record. Fails if the id already exists.
    async fn insert_session(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Read a session record, `None` when absent.
    async fn get_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>>;

    /// Apply a patch unconditionally.
    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> StoreResult<()>;

    /// Apply a patch only if `guard` holds against the current record.
    ///
    /// Returns the number of rows modified: zero means the predicate no
    /// longer held (or the session is gone) and the write was skipped.
    async fn update_session_if(
        &self,
        session_id: &str,
        patch: SessionPatch,
        guard: SessionGuard,
    ) -> StoreResult<u64>;

    /// Delete a session and cascade to its votes and presence entries.
    async fn delete_session(&self, session_id: &str) -> StoreResult<()>;

    /// Upsert one participant's vote on the `(session, participant)` key.
    async fn upsert_vote(
        &self,
        session_id: &str,
        participant_id: &str,
        value: Card,
    ) -> StoreResult<()>;

    /// All recorded votes for a session.
    async fn fetch_votes(&self, session_id: &str) -> StoreResult<HashMap<ParticipantId, Card>>;

    /// Delete every vote for a session. Deleting an empty set is a no-op.
    async fn clear_votes(&self, session_id: &str) -> StoreResult<()>;

    /// Track a participant descriptor under a presence key.
    async fn track_presence(
        &self,
        session_id: &str,
        key: &str,
        participant: Participant,
    ) -> StoreResult<()>;

    /// Drop a presence key.
    async fn untrack_presence(&self, session_id: &str, key: &str) -> StoreResult<()>;

    /// Full per-key presence map. A key may carry several entries after a
    /// reconnect; the most recently tracked one is authoritative.
    async fn presence_state(
        &self,
        session_id: &str,
    ) -> StoreResult<BTreeMap<String, Vec<Participant>>>;

    /// The store's authoritative current instant.
    async fn server_time(&self) -> StoreResult<DateTime<Utc>>;

    /// Subscribe to the session's change feed.
    fn subscribe(&self, session_id: &str) -> broadcast::Receiver<StoreEvent>;
}
