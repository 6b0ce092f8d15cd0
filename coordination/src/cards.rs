//! The estimation card deck
//!
//! A fixed modified-Fibonacci deck plus two non-numeric sentinels:
//! `?` ("I have no idea") and `☕` ("I need a break"). Sentinels are
//! excluded from averages and deadlock analysis.

use serde::{Deserialize, Serialize};

/// A single estimation card.
///
/// Serializes as its face string (`"13"`, `"?"`, `"☕"`) so stored votes
/// stay human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Card {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "13")]
    Thirteen,
    #[serde(rename = "20")]
    Twenty,
    #[serde(rename = "40")]
    Forty,
    #[serde(rename = "?")]
    Unknown,
    #[serde(rename = "☕")]
    Coffee,
}

/// The full deck in display order.
pub const DECK: &[Card] = &[
    Card::Zero,
    Card::One,
    Card::Two,
    Card::Three,
    Card::Five,
    Card::Eight,
    Card::Thirteen,
    Card::Twenty,
    Card::Forty,
    Card::Unknown,
    Card::Coffee,
];

impl Card {
    /// The face string shown on the card.
    pub fn as_str(&self) -> &'static str {
        match self {
            Card::Zero => "0",
            Card::One => "1",
            Card::Two => "2",
            Card::Three => "3",
            Card::Five => "5",
            Card::Eight => "8",
            Card::Thirteen => "13",
            Card::Twenty => "20",
            Card::Forty => "40",
            Card::Unknown => "?",
            Card::Coffee => "☕",
        }
    }

    /// Numeric value of the card, or `None` for the sentinels.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Card::Zero => Some(0.0),
            Card::One => Some(1.0),
            Card::Two => Some(2.0),
            Card::Three => Some(3.0),
            Card::Five => Some(5.0),
            Card::Eight => Some(8.0),
            Card::Thirteen => Some(13.0),
            Card::Twenty => Some(20.0),
            Card::Forty => Some(40.0),
            Card::Unknown | Card::Coffee => None,
        }
    }

    /// Whether this card is one of the non-numeric sentinels.
    pub fn is_sentinel(&self) -> bool {
        self.numeric().is_none()
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for face strings outside the deck.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown card value: {0}")]
pub struct UnknownCard(pub String);

impl std::str::FromStr for Card {
    type Err = UnknownCard;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DECK.iter()
            .find(|card| card.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownCard(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_roundtrip() {
        for card in DECK {
            let parsed: Card = card.as_str().parse().unwrap();
            assert_eq!(parsed, *card);
        }
    }

    #[test]
    fn test_invalid_face_rejected() {
        assert!("4".parse::<Card>().is_err());
        assert!("".parse::<Card>().is_err());
    }

    #[test]
    fn test_sentinels_have_no_numeric_value() {
        assert!(Card::Unknown.is_sentinel());
        assert!(Card::Coffee.is_sentinel());
        assert_eq!(Card::Unknown.numeric(), None);
        assert_eq!(Card::Thirteen.numeric(), Some(13.0));
    }

    #[test]
    fn test_serde_uses_face_strings() {
        assert_eq!(serde_json::to_string(&Card::Thirteen).unwrap(), "\"13\"");
        assert_eq!(serde_json::to_string(&Card::Coffee).unwrap(), "\"☕\"");
        let card: Card = serde_json::from_str("\"?\"").unwrap();
        assert_eq!(card, Card::Unknown);
    }
}
