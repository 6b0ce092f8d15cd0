//! Planning-poker session coordination engine
//!
//! Keeps any number of independently connected clients converged on one
//! authoritative round state without a server-side process of its own:
//! coordination runs entirely through a shared mutable record, a votes
//! table, a presence channel, and a push-notification stream provided by an
//! external row store.
//!
//! # Components
//!
//! - [`client::SessionClient`]: per-session context owning the cached
//!   state, timers, and view transitions
//! - [`deadlock::detect`]: pure classifier for bimodal voting splits
//! - [`advocate::DevilsAdvocateArbiter`]: compare-and-swap-guarded
//!   activation and expiry of the time-boxed arbitration round
//! - [`clock::ClockSync`]: server-corrected clock under every TTL check
//!   and countdown
//! - [`store::RowStore`]: the external-store seam, with an in-memory
//!   reference backend for tests and simulation
//!
//! # Concurrency model
//!
//! Clients never share memory. The only write primitive that needs
//! coordination is the conditional update: a patch applied iff a predicate
//! on the record's current value still holds, reporting affected rows.
//! Racing clients that lose such a write treat zero rows as
//! success-by-deferral and pick up the winner's state from the change feed.

pub mod advocate;
pub mod cards;
pub mod client;
pub mod clock;
pub mod config;
pub mod deadlock;
pub mod identity;
pub mod lifecycle;
pub mod presence;
pub mod reveal;
pub mod rng;
pub mod session;
pub mod store;
pub mod telemetry;

pub use advocate::{ArbitrationOutcome, DevilsAdvocateArbiter, DEADLOCK_TRIGGER};
pub use cards::{Card, DECK};
pub use client::{ClientError, ClientResult, SessionClient};
pub use clock::ClockSync;
pub use config::CoordinationConfig;
pub use deadlock::{detect, DeadlockReport};
pub use lifecycle::{is_expired, session_id_from_path, SessionView};
pub use presence::PresenceRoster;
pub use reveal::{Average, RevealTransition};
pub use session::{SessionRecordStore, VoteStore};
pub use store::{
    memory::MemoryRowStore, AdvocateSide, DevilsAdvocate, Participant, ParticipantId, RowStore,
    SessionGuard, SessionId, SessionPatch, SessionRecord, SharedRowStore, StoreError, StoreEvent,
    StoreResult,
};
