//! Reveal-state projections
//!
//! The Hidden ⇄ Revealed state machine itself is driven by the session
//! client; this module holds its pure parts: classifying remote-origin
//! flips of the `revealed` flag, and the average projection over visible
//! votes.

use std::collections::HashMap;

use crate::cards::Card;
use crate::store::ParticipantId;

/// Direction of a `revealed` flip between two record snapshots.
///
/// A remote `Shown` must run the same deadlock evaluation as a local
/// reveal; a remote `Hidden` (another client's reset) must clear the local
/// vote cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealTransition {
    Shown,
    Hidden,
}

impl RevealTransition {
    pub fn between(was_revealed: bool, now_revealed: bool) -> Option<Self> {
        match (was_revealed, now_revealed) {
            (false, true) => Some(RevealTransition::Shown),
            (true, false) => Some(RevealTransition::Hidden),
            _ => None,
        }
    }
}

/// Read-only average over currently visible votes.
///
/// Sentinels are ignored; with zero numeric votes on a revealed round the
/// average is not applicable, and while hidden only a placeholder shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Average {
    Hidden,
    NotApplicable,
    Value(f64),
}

impl Average {
    pub fn project(revealed: bool, votes: &HashMap<ParticipantId, Card>) -> Self {
        if !revealed {
            return Average::Hidden;
        }
        let numeric: Vec<f64> = votes.values().filter_map(Card::numeric).collect();
        if numeric.is_empty() {
            return Average::NotApplicable;
        }
        Average::Value(numeric.iter().sum::<f64>() / numeric.len() as f64)
    }
}

impl std::fmt::Display for Average {
    /// Integer display when the mean is exact, one decimal otherwise.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Average::Hidden => write!(f, "-"),
            Average::NotApplicable => write!(f, "N/A"),
            Average::Value(mean) => {
                if mean.fract() == 0.0 {
                    write!(f, "{}", *mean as i64)
                } else {
                    write!(f, "{mean:.1}")
                }
            }
        }
    }
}
