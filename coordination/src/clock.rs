//! Server-corrected clock
//!
//! Every TTL check and countdown runs on a corrected clock so a device with
//! a skewed local clock neither sees spurious expiry nor a wrong arbitration
//! countdown. The correction is a cached `server − local` offset, refreshed
//! lazily before expiry-sensitive work and at most once per resync window.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::store::RowStore;

struct ClockState {
    /// Cached `server − local` offset. Zero until the first successful sync.
    offset: chrono::Duration,
    last_sync: Option<Instant>,
}

/// Shared handle to the corrected clock.
///
/// Cloning is cheap; all clones observe the same cached offset, so the
/// session client and its countdown tasks agree on "now".
#[derive(Clone)]
pub struct ClockSync {
    resync_interval: Duration,
    state: Arc<RwLock<ClockState>>,
}

impl ClockSync {
    pub fn new(resync_interval: Duration) -> Self {
        Self {
            resync_interval,
            state: Arc::new(RwLock::new(ClockState {
                offset: chrono::Duration::zero(),
                last_sync: None,
            })),
        }
    }

    /// Clock pinned to a fixed offset; never resyncs. Test seam.
    pub fn with_offset(offset: chrono::Duration) -> Self {
        Self {
            resync_interval: Duration::MAX,
            state: Arc::new(RwLock::new(ClockState {
                offset,
                last_sync: Some(Instant::now()),
            })),
        }
    }

    /// Wall-clock time corrected by the cached offset.
    pub fn now(&self) -> DateTime<Utc> {
        let state = self.state.read().expect("clock lock poisoned");
        Utc::now() + state.offset
    }

    /// The current cached offset.
    pub fn offset(&self) -> chrono::Duration {
        self.state.read().expect("clock lock poisoned").offset
    }

    /// Refresh the offset from the store's authoritative clock if the cached
    /// value is older than the resync window.
    ///
    /// A failed fetch keeps the previous offset in effect; callers proceed
    /// with the best correction available.
    pub async fn ensure_synced(&self, store: &dyn RowStore) {
        {
            let state = self.state.read().expect("clock lock poisoned");
            if let Some(last) = state.last_sync {
                if last.elapsed() < self.resync_interval {
                    return;
                }
            }
        }

        match store.server_time().await {
            Ok(server_now) => {
                let offset = server_now - Utc::now();
                let mut state = self.state.write().expect("clock lock poisoned");
                state.offset = offset;
                state.last_sync = Some(Instant::now());
                debug!(offset_ms = offset.num_milliseconds(), "Server clock synced");
            }
            Err(e) => {
                warn!("Server time fetch failed, keeping previous offset: {e}");
            }
        }
    }
}
