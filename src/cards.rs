//! The 40-card Italian deck: suits, ranks, deck construction and the static
//! scoring tables used by the rule engines.

use std::fmt::{self, Display};
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Bastoni,
    Coppe,
    Denari,
    Spade,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Bastoni, Suit::Coppe, Suit::Denari, Suit::Spade];

    pub fn as_str(self) -> &'static str {
        match self {
            Suit::Bastoni => "bastoni",
            Suit::Coppe => "coppe",
            Suit::Denari => "denari",
            Suit::Spade => "spade",
        }
    }
}

impl Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suit {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bastoni" => Ok(Suit::Bastoni),
            "coppe" => Ok(Suit::Coppe),
            "denari" => Ok(Suit::Denari),
            "spade" => Ok(Suit::Spade),
            _ => Err(ParseCardError),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Asso,
    Due,
    Tre,
    Quattro,
    Cinque,
    Sei,
    Sette,
    Fante,
    Cavallo,
    Re,
}

impl Rank {
    pub const ALL: [Rank; 10] = [
        Rank::Asso,
        Rank::Due,
        Rank::Tre,
        Rank::Quattro,
        Rank::Cinque,
        Rank::Sei,
        Rank::Sette,
        Rank::Fante,
        Rank::Cavallo,
        Rank::Re,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Asso => "1",
            Rank::Due => "2",
            Rank::Tre => "3",
            Rank::Quattro => "4",
            Rank::Cinque => "5",
            Rank::Sei => "6",
            Rank::Sette => "7",
            Rank::Fante => "fante",
            Rank::Cavallo => "cavallo",
            Rank::Re => "re",
        }
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Rank::Asso),
            "2" => Ok(Rank::Due),
            "3" => Ok(Rank::Tre),
            "4" => Ok(Rank::Quattro),
            "5" => Ok(Rank::Cinque),
            "6" => Ok(Rank::Sei),
            "7" => Ok(Rank::Sette),
            "fante" => Ok(Rank::Fante),
            "cavallo" => Ok(Rank::Cavallo),
            "re" => Ok(Rank::Re),
            _ => Err(ParseCardError),
        }
    }
}

/// A playing card, equal by value. The wire format is `suit:rank`,
/// e.g. `denari:7` or `coppe:re`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.suit, self.rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseCardError;

impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (suit, rank) = s.split_once(':').ok_or(ParseCardError)?;
        Ok(Card {
            suit: suit.parse()?,
            rank: rank.parse()?,
        })
    }
}

/// Every (suit, rank) pair exactly once.
pub fn deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(40);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            cards.push(Card { suit, rank });
        }
    }
    cards
}

pub fn shuffled_deck() -> Vec<Card> {
    let mut cards = deck();
    cards.shuffle(&mut thread_rng());
    cards
}

/// Briscola point values; the whole deck sums to 120.
pub fn trick_points(rank: Rank) -> u32 {
    match rank {
        Rank::Asso => 11,
        Rank::Tre => 10,
        Rank::Re => 4,
        Rank::Cavallo => 3,
        Rank::Fante => 2,
        _ => 0,
    }
}

/// Briscola capture order within a suit: 2 < 4 < 5 < 6 < 7 < fante <
/// cavallo < re < 3 < asso.
pub fn trick_strength(rank: Rank) -> u8 {
    match rank {
        Rank::Due => 0,
        Rank::Quattro => 1,
        Rank::Cinque => 2,
        Rank::Sei => 3,
        Rank::Sette => 4,
        Rank::Fante => 5,
        Rank::Cavallo => 6,
        Rank::Re => 7,
        Rank::Tre => 8,
        Rank::Asso => 9,
    }
}

/// Scopa face values used by the capture sum.
pub fn face_value(rank: Rank) -> i32 {
    match rank {
        Rank::Asso => 1,
        Rank::Due => 2,
        Rank::Tre => 3,
        Rank::Quattro => 4,
        Rank::Cinque => 5,
        Rank::Sei => 6,
        Rank::Sette => 7,
        Rank::Fante => 8,
        Rank::Cavallo => 9,
        Rank::Re => 10,
    }
}

/// Primiera values, distinct from face values.
pub fn primiera_points(rank: Rank) -> u32 {
    match rank {
        Rank::Sette => 21,
        Rank::Sei => 18,
        Rank::Asso => 16,
        Rank::Cinque => 15,
        Rank::Quattro => 14,
        Rank::Tre => 13,
        Rank::Due => 12,
        Rank::Re | Rank::Cavallo | Rank::Fante => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn deck_has_every_card_once() {
        let deck = deck();
        assert_eq!(deck.len(), 40);
        let distinct: HashSet<Card> = deck.iter().copied().collect();
        assert_eq!(distinct.len(), 40);
    }

    #[test]
    fn trick_points_sum_to_120() {
        let total: u32 = deck().iter().map(|c| trick_points(c.rank)).sum();
        assert_eq!(total, 120);
    }

    #[test]
    fn card_wire_format_round_trips() {
        for card in deck() {
            let parsed: Card = card.to_string().parse().expect("round trip");
            assert_eq!(parsed, card);
        }
        assert_eq!(
            "denari:7".parse::<Card>(),
            Ok(Card {
                suit: Suit::Denari,
                rank: Rank::Sette,
            })
        );
    }

    #[test]
    fn malformed_cards_are_rejected() {
        for bad in ["", "denari", "denari:", "denari:11", "cups:3", "denari:7:1"] {
            assert!(bad.parse::<Card>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn strength_orders_every_rank_distinctly() {
        let distinct: HashSet<u8> = Rank::ALL.iter().map(|&r| trick_strength(r)).collect();
        assert_eq!(distinct.len(), Rank::ALL.len());
        assert!(trick_strength(Rank::Asso) > trick_strength(Rank::Tre));
        assert!(trick_strength(Rank::Tre) > trick_strength(Rank::Re));
    }
}
