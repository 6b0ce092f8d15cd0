//! Deadlock classification
//!
//! A reveal counts as a deadlock when the numeric votes form a genuine
//! two-camp split: the extremes are far apart and each extreme holds a
//! substantial minority. A middle cluster is allowed; the target is real
//! polarization, not noise.

use std::collections::HashMap;

use crate::cards::Card;
use crate::store::ParticipantId;

/// Fewer numeric votes than this can never deadlock.
pub const MIN_NUMERIC_VOTES: usize = 2;

/// Minimum distance between the extremes.
pub const MIN_GAP: f64 = 8.0;

/// Minimum share of numeric votes each extreme must hold.
pub const MIN_EXTREME_SHARE: f64 = 0.4;

/// The two poles of a detected deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockReport {
    pub low: Card,
    pub high: Card,
}

/// Classify a revealed vote set.
///
/// Sentinel cards are dropped first. Requires at least
/// [`MIN_NUMERIC_VOTES`] numeric votes, a gap of at least [`MIN_GAP`]
/// between minimum and maximum, and both extremes each holding at least
/// [`MIN_EXTREME_SHARE`] of the numeric votes. Pure and invariant under
/// participant-id permutation.
pub fn detect(votes: &HashMap<ParticipantId, Card>) -> Option<DeadlockReport> {
    let numeric: Vec<(Card, f64)> = votes
        .values()
        .filter_map(|card| card.numeric().map(|value| (*card, value)))
        .collect();

    if numeric.len() < MIN_NUMERIC_VOTES {
        return None;
    }

    let (low, low_value) = numeric
        .iter()
        .copied()
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    let (high, high_value) = numeric
        .iter()
        .copied()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    // Covers the min == max case as well.
    if high_value - low_value < MIN_GAP {
        return None;
    }

    let total = numeric.len() as f64;
    let low_share = numeric.iter().filter(|(card, _)| *card == low).count() as f64 / total;
    let high_share = numeric.iter().filter(|(card, _)| *card == high).count() as f64 / total;

    if low_share < MIN_EXTREME_SHARE || high_share < MIN_EXTREME_SHARE {
        return None;
    }

    Some(DeadlockReport { low, high })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes_of(entries: &[(&str, Card)]) -> HashMap<ParticipantId, Card> {
        entries
            .iter()
            .map(|(id, card)| (id.to_string(), *card))
            .collect()
    }

    #[test]
    fn test_two_camp_split_is_deadlock() {
        let votes = votes_of(&[
            ("a", Card::One),
            ("b", Card::One),
            ("c", Card::Thirteen),
            ("d", Card::Thirteen),
        ]);
        let report = detect(&votes).expect("gap 12, shares 0.5/0.5");
        assert_eq!(report.low, Card::One);
        assert_eq!(report.high, Card::Thirteen);
    }

    #[test]
    fn test_narrow_gap_is_not_deadlock() {
        let votes = votes_of(&[("a", Card::Five), ("b", Card::Eight)]);
        assert_eq!(detect(&votes), None);
    }

    #[test]
    fn test_thin_extreme_is_not_deadlock() {
        let votes = votes_of(&[
            ("a", Card::Zero),
            ("b", Card::Zero),
            ("c", Card::Zero),
            ("d", Card::Zero),
            ("e", Card::Thirteen),
        ]);
        // Max share is 0.2, below the 0.4 floor.
        assert_eq!(detect(&votes), None);
    }

    #[test]
    fn test_middle_cluster_is_tolerated() {
        let votes = votes_of(&[
            ("a", Card::Zero),
            ("b", Card::Zero),
            ("c", Card::Five),
            ("d", Card::Thirteen),
            ("e", Card::Thirteen),
        ]);
        let report = detect(&votes).expect("both extremes hold 0.4");
        assert_eq!(report.low, Card::Zero);
        assert_eq!(report.high, Card::Thirteen);
    }

    #[test]
    fn test_fewer_than_two_numeric_votes_never_deadlocks() {
        assert_eq!(detect(&votes_of(&[])), None);
        assert_eq!(detect(&votes_of(&[("a", Card::Forty)])), None);
        assert_eq!(
            detect(&votes_of(&[
                ("a", Card::Forty),
                ("b", Card::Unknown),
                ("c", Card::Coffee),
            ])),
            None
        );
    }

    #[test]
    fn test_unanimous_votes_are_not_deadlock() {
        let votes = votes_of(&[("a", Card::Eight), ("b", Card::Eight), ("c", Card::Eight)]);
        assert_eq!(detect(&votes), None);
    }

    #[test]
    fn test_invariant_under_id_permutation() {
        let forward = votes_of(&[
            ("a", Card::One),
            ("b", Card::One),
            ("c", Card::Thirteen),
            ("d", Card::Thirteen),
        ]);
        let relabeled = votes_of(&[
            ("d", Card::One),
            ("c", Card::One),
            ("b", Card::Thirteen),
            ("a", Card::Thirteen),
        ]);
        assert_eq!(detect(&forward), detect(&relabeled));
    }

    #[test]
    fn test_invariant_under_sentinel_relabeling() {
        let with_unknown = votes_of(&[
            ("a", Card::One),
            ("b", Card::Thirteen),
            ("c", Card::Unknown),
        ]);
        let with_coffee = votes_of(&[
            ("a", Card::One),
            ("b", Card::Thirteen),
            ("c", Card::Coffee),
        ]);
        assert_eq!(detect(&with_unknown), detect(&with_coffee));
    }

    #[test]
    fn test_sentinels_do_not_dilute_shares() {
        // 1/1/13/13 plus two sentinels: shares stay 0.5 over numeric votes.
        let votes = votes_of(&[
            ("a", Card::One),
            ("b", Card::One),
            ("c", Card::Thirteen),
            ("d", Card::Thirteen),
            ("e", Card::Unknown),
            ("f", Card::Coffee),
        ]);
        assert!(detect(&votes).is_some());
    }
}
