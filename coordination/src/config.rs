//! Coordination engine configuration
//!
//! Defaults match the production deployment; every knob can be overridden
//! through `POKER_*` environment variables for local simulation and tests.

use std::time::Duration;

/// Sessions expire after three hours without activity.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3 * 60 * 60;

/// A devil's advocate round lasts one minute.
pub const DEFAULT_ADVOCATE_DURATION_SECS: u32 = 60;

/// Server clock offset is refreshed at most once per five minutes.
pub const DEFAULT_CLOCK_RESYNC_SECS: u64 = 5 * 60;

/// Tunable timings for session lifecycle and arbitration.
#[derive(Debug, Clone)]
pub struct CoordinationConfig {
    /// Idle time after which a session counts as expired.
    pub session_ttl_secs: u64,
    /// Length of an arbitration round.
    pub advocate_duration_secs: u32,
    /// Minimum interval between server-time fetches.
    pub clock_resync: Duration,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            advocate_duration_secs: DEFAULT_ADVOCATE_DURATION_SECS,
            clock_resync: Duration::from_secs(DEFAULT_CLOCK_RESYNC_SECS),
        }
    }
}

impl CoordinationConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl_secs: env_parse("POKER_SESSION_TTL_SECS", defaults.session_ttl_secs),
            advocate_duration_secs: env_parse(
                "POKER_ADVOCATE_DURATION_SECS",
                defaults.advocate_duration_secs,
            ),
            clock_resync: Duration::from_secs(env_parse(
                "POKER_CLOCK_RESYNC_SECS",
                DEFAULT_CLOCK_RESYNC_SECS,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
