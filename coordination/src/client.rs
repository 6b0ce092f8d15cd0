//! Per-session client context
//!
//! One [`SessionClient`] per joined session. It owns everything the old
//! page-global state used to hold: the cached record and votes, the
//! presence roster, the view, the round timer, and the arbitration
//! countdown task. All of it is torn down explicitly on view
//! transitions. The cache is read-through only: it is refreshed on every
//! local mutation and every change notification, and never authorizes a
//! write on its own (`ensure_active` re-fetches first).
//!
//! Events are consumed cooperatively: callers hold the receiver from
//! [`SessionClient::subscribe`] and feed each event through
//! [`SessionClient::handle_event`], so all state mutation happens on the
//! caller's task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advocate::{ArbitrationOutcome, DevilsAdvocateArbiter};
use crate::cards::Card;
use crate::clock::ClockSync;
use crate::config::CoordinationConfig;
use crate::lifecycle::{is_expired, SessionView};
use crate::presence::PresenceRoster;
use crate::reveal::{Average, RevealTransition};
use crate::session::{SessionRecordStore, VoteStore};
use crate::store::{
    DevilsAdvocate, Participant, ParticipantId, SessionId, SessionPatch, SessionRecord,
    SharedRowStore, StoreError, StoreEvent,
};

/// Error type for client actions
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("session not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("not joined")]
    NotJoined,

    #[error("{0}")]
    Validation(String),

    #[error("arbitration round in progress")]
    ArbitrationActive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for client actions
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// The single-line status message shown for this failure.
    ///
    /// Conditional-update races never reach here; a lost race is a silent
    /// deferral, not a failure.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::NotFound => "Session not found. Create a new session.".into(),
            ClientError::Expired => "This session has expired. Create a new session.".into(),
            ClientError::NotJoined => "Join the session before voting.".into(),
            ClientError::Validation(message) => message.clone(),
            ClientError::ArbitrationActive => {
                "Hold on, the devil's advocate still has the floor.".into()
            }
            ClientError::Store(StoreError::SchemaMissing(table)) => format!(
                "The {table} table is missing in the backing store. Apply the schema migration and retry."
            ),
            ClientError::Store(_) => "The session store is unreachable. Try again.".into(),
        }
    }
}

/// Deadline-based free-form round timer.
///
/// Pure state: remaining time is derived from the stored deadline on every
/// query instead of being decremented, so it survives missed ticks.
#[derive(Debug, Default)]
pub struct RoundTimer {
    ends_at: Option<DateTime<Utc>>,
}

impl RoundTimer {
    pub fn start(&mut self, duration_secs: u32, now: DateTime<Utc>) {
        self.ends_at = Some(now + chrono::Duration::seconds(i64::from(duration_secs)));
    }

    pub fn stop(&mut self) {
        self.ends_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.ends_at.is_some()
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.ends_at
            .map(|ends_at| (ends_at - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }
}

/// Client-side coordinator for one voting session.
pub struct SessionClient {
    store: SharedRowStore,
    sessions: SessionRecordStore,
    votes_store: VoteStore,
    clock: ClockSync,
    config: CoordinationConfig,
    session_id: SessionId,

    me: Option<Participant>,
    record: Option<SessionRecord>,
    votes: HashMap<ParticipantId, Card>,
    roster: PresenceRoster,
    view: SessionView,
    status: Option<String>,

    round_timer: RoundTimer,
    advocate_task: Option<JoinHandle<()>>,
}

impl SessionClient {
    /// Create a brand-new session and return its id.
    pub async fn create_session(
        store: &SharedRowStore,
        clock: &ClockSync,
    ) -> ClientResult<SessionId> {
        clock.ensure_synced(store.as_ref()).await;
        let id = Uuid::new_v4().to_string();
        let record = SessionRecord::new(id.clone(), clock.now());
        SessionRecordStore::new(store.clone()).create(&record).await?;
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// Attach to an existing session addressed by id.
    pub fn new(
        store: SharedRowStore,
        clock: ClockSync,
        config: CoordinationConfig,
        session_id: impl Into<SessionId>,
    ) -> Self {
        Self {
            sessions: SessionRecordStore::new(store.clone()),
            votes_store: VoteStore::new(store.clone()),
            store,
            clock,
            config,
            session_id: session_id.into(),
            me: None,
            record: None,
            votes: HashMap::new(),
            roster: PresenceRoster::new(),
            view: SessionView::Landing,
            status: None,
            round_timer: RoundTimer::default(),
            advocate_task: None,
        }
    }

    /// Load the session record and decide the initial view.
    pub async fn load(&mut self) -> ClientResult<SessionView> {
        self.clock.ensure_synced(self.store.as_ref()).await;
        match self.sessions.read(&self.session_id).await {
            Ok(record) => {
                if is_expired(&record, self.clock.now(), self.config.session_ttl_secs) {
                    self.enter_expired();
                } else {
                    self.record = Some(record);
                    self.view = SessionView::Join;
                }
            }
            Err(StoreError::NotFound(_)) => {
                self.status = Some(ClientError::NotFound.user_message());
                self.enter_expired();
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.view)
    }

    /// Join the session as `me` and start tracking presence.
    pub async fn join(&mut self, me: Participant) -> ClientResult<()> {
        if me.name.trim().is_empty() {
            return Err(ClientError::Validation("Enter your name to join.".into()));
        }
        self.ensure_active().await?;

        let now = self.clock.now();
        self.sessions.touch(&self.session_id, now).await?;
        self.store
            .track_presence(&self.session_id, &me.id, me.clone())
            .await?;
        self.me = Some(me);
        self.refresh_votes().await?;
        self.view = SessionView::Table;
        Ok(())
    }

    /// Subscribe to this session's change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe(&self.session_id)
    }

    /// Cast or change this participant's vote.
    ///
    /// Refused while an arbitration round runs; the UI renders that
    /// refusal as a disabled input.
    pub async fn cast_vote(&mut self, value: Card) -> ClientResult<()> {
        let me = self.me.clone().ok_or(ClientError::NotJoined)?;
        let record = self.ensure_active().await?;
        if record.advocate_active() {
            return Err(ClientError::ArbitrationActive);
        }

        let now = self.clock.now();
        self.votes_store
            .cast(&self.session_id, &me.id, value, now)
            .await?;
        self.votes.insert(me.id, value);
        Ok(())
    }

    /// Toggle the round between hidden and revealed.
    ///
    /// Revealing refreshes the vote cache and synchronously runs the
    /// deadlock evaluation. Hiding keeps votes and counters in place so the
    /// same round can be revealed again; only reset and arbitration
    /// completion clear them, which is how two consecutive deadlocked
    /// reveals can accumulate toward the arbitration trigger.
    pub async fn reveal(&mut self) -> ClientResult<()> {
        let mut record = self.ensure_active().await?;
        if record.advocate_active() {
            return Err(ClientError::ArbitrationActive);
        }

        let next_revealed = !record.revealed;
        let now = self.clock.now();
        self.sessions
            .update(
                &self.session_id,
                SessionPatch::new().revealed(next_revealed).touch(now),
            )
            .await?;
        record.revealed = next_revealed;
        record.last_activity_at = now;
        self.record = Some(record.clone());

        if next_revealed {
            self.refresh_votes().await?;
            self.evaluate_deadlock(&record).await?;
        } else {
            debug!(session_id = %self.session_id, "Cards hidden");
        }
        Ok(())
    }

    /// Start a fresh round: clear votes, hide cards, zero the counters.
    pub async fn reset(&mut self) -> ClientResult<()> {
        let record = self.ensure_active().await?;
        if record.advocate_active() {
            return Err(ClientError::ArbitrationActive);
        }

        self.votes_store.clear_all(&self.session_id).await?;
        let now = self.clock.now();
        self.sessions
            .update(
                &self.session_id,
                SessionPatch::new()
                    .revealed(false)
                    .deadlock_count(0)
                    .touch(now),
            )
            .await?;

        self.votes.clear();
        if let Some(record) = self.record.as_mut() {
            record.revealed = false;
            record.deadlock_count = 0;
            record.last_activity_at = now;
        }
        Ok(())
    }

    /// Apply one change notification from the session's feed.
    pub async fn handle_event(&mut self, event: StoreEvent) -> ClientResult<()> {
        match event {
            StoreEvent::VotesChanged { .. } => {
                self.refresh_votes().await?;
            }
            StoreEvent::PresenceSync { .. } => {
                let state = self.store.presence_state(&self.session_id).await?;
                self.roster.apply_sync(&state);
            }
            StoreEvent::SessionChanged { record, .. } => {
                let was_revealed = self.record.as_ref().is_some_and(|r| r.revealed);
                let had_advocate = self.record.as_ref().is_some_and(|r| r.advocate_active());
                self.record = Some(record.clone());

                match RevealTransition::between(was_revealed, record.revealed) {
                    Some(RevealTransition::Shown) => {
                        // A remote reveal gets the same evaluation as a
                        // local one.
                        self.refresh_votes().await?;
                        self.evaluate_deadlock(&record).await?;
                    }
                    Some(RevealTransition::Hidden) => {
                        self.votes.clear();
                    }
                    None => {}
                }

                if record.advocate_active() && !had_advocate {
                    if let Some(advocate) = record.devils_advocate.clone() {
                        self.spawn_advocate_countdown(advocate);
                    }
                } else if !record.advocate_active() && had_advocate {
                    self.cancel_advocate_countdown();
                }
            }
        }
        Ok(())
    }

    /// Leave the session: drop presence and stop every timer.
    pub async fn leave(&mut self) -> ClientResult<()> {
        if let Some(me) = &self.me {
            self.store.untrack_presence(&self.session_id, &me.id).await?;
        }
        self.teardown();
        Ok(())
    }

    /// Cancel outstanding timers. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.cancel_advocate_countdown();
        self.round_timer.stop();
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    pub fn view(&self) -> SessionView {
        self.view
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub fn votes(&self) -> &HashMap<ParticipantId, Card> {
        &self.votes
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.roster
    }

    pub fn me(&self) -> Option<&Participant> {
        self.me.as_ref()
    }

    /// Average over currently visible votes.
    pub fn average(&self) -> Average {
        let revealed = self.record.as_ref().is_some_and(|r| r.revealed);
        Average::project(revealed, &self.votes)
    }

    /// `N participants, M voted · Hidden|Revealed` summary line.
    pub fn status_summary(&self) -> String {
        let total = self.roster.len();
        let voted = self
            .roster
            .participants()
            .iter()
            .filter(|p| self.votes.contains_key(&p.id))
            .count();
        let label = if self.record.as_ref().is_some_and(|r| r.revealed) {
            "Revealed"
        } else {
            "Hidden"
        };
        format!("{total} participants, {voted} voted · {label}")
    }

    /// Time left in the running arbitration round, if any.
    pub fn advocate_remaining(&self) -> Option<std::time::Duration> {
        self.record
            .as_ref()
            .and_then(|r| r.devils_advocate.as_ref())
            .map(|advocate| advocate.remaining(self.clock.now()))
    }

    /// One-line status from the last reported failure.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Convert a failed action into the visible status line.
    pub fn report_error(&mut self, error: &ClientError) {
        let message = error.user_message();
        warn!(session_id = %self.session_id, %error, "Action failed");
        self.status = Some(message);
    }

    // ------------------------------------------------------------------
    // Round timer
    // ------------------------------------------------------------------

    pub fn start_round_timer(&mut self, duration_secs: u32) {
        self.round_timer.start(duration_secs, self.clock.now());
    }

    pub fn stop_round_timer(&mut self) {
        self.round_timer.stop();
    }

    pub fn round_timer_remaining(&self) -> Option<std::time::Duration> {
        self.round_timer.remaining(self.clock.now())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Re-fetch the record and re-check expiry before any write.
    ///
    /// A stale cache never authorizes a write: this is the polling fallback
    /// that guarantees writes act on data no older than "just before this
    /// action".
    async fn ensure_active(&mut self) -> ClientResult<SessionRecord> {
        self.clock.ensure_synced(self.store.as_ref()).await;
        let record = match self.sessions.read(&self.session_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                self.enter_expired();
                return Err(ClientError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if is_expired(&record, self.clock.now(), self.config.session_ttl_secs) {
            self.enter_expired();
            return Err(ClientError::Expired);
        }

        self.record = Some(record.clone());
        Ok(record)
    }

    /// Reload the vote cache.
    ///
    /// A fetch failure empties the cache and sets the status line instead
    /// of aborting the surrounding action, matching the store being the
    /// only source of truth: a cache we cannot refresh is shown as empty,
    /// not stale.
    async fn refresh_votes(&mut self) -> ClientResult<()> {
        match self.votes_store.fetch_all(&self.session_id).await {
            Ok(votes) => {
                self.votes = votes;
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Vote refresh failed: {e}");
                self.votes.clear();
                self.status = Some(ClientError::from(e).user_message());
            }
        }
        Ok(())
    }

    async fn evaluate_deadlock(&mut self, record: &SessionRecord) -> ClientResult<()> {
        let arbiter = DevilsAdvocateArbiter::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.advocate_duration_secs,
        );
        let outcome = arbiter
            .evaluate_reveal(record, &self.votes, &self.roster)
            .await?;

        if let ArbitrationOutcome::Activated(advocate) = outcome {
            if let Some(record) = self.record.as_mut() {
                record.devils_advocate = Some(advocate.clone());
                record.deadlock_count = 0;
            }
            self.spawn_advocate_countdown(advocate);
        }
        Ok(())
    }

    /// Watch the arbitration deadline and attempt the guarded shutdown once
    /// it passes. Every client runs one of these; the conditional write
    /// makes the shutdown apply exactly once system-wide.
    fn spawn_advocate_countdown(&mut self, advocate: DevilsAdvocate) {
        if self.advocate_task.is_some() {
            return;
        }

        let arbiter = DevilsAdvocateArbiter::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.advocate_duration_secs,
        );
        let clock = self.clock.clone();
        let session_id = self.session_id.clone();

        let handle = tokio::spawn(async move {
            loop {
                // Recomputed from the deadline on every wake so the
                // countdown self-corrects after suspension.
                let remaining = advocate.remaining(clock.now());
                if remaining.is_zero() {
                    match arbiter.expire(&session_id).await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(session_id = %session_id, "Arbitration ended by another client");
                        }
                        Err(e) => {
                            warn!(session_id = %session_id, "Arbitration expiry failed: {e}");
                        }
                    }
                    return;
                }
                tokio::time::sleep(remaining).await;
            }
        });
        self.advocate_task = Some(handle);
    }

    fn cancel_advocate_countdown(&mut self) {
        if let Some(handle) = self.advocate_task.take() {
            handle.abort();
        }
    }

    fn enter_expired(&mut self) {
        self.view = SessionView::Expired;
        self.teardown();
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.teardown();
    }
}
