//! Briscola: two seats, three-card hands, one face-up trump card that
//! outranks everything else.

use serde::{Deserialize, Serialize};

use crate::cards::{self, Card};
use crate::error::GameError;
use crate::game::{Core, GameStatus};
use crate::protocol::Frame;

pub const VERSION: u32 = 1;
pub const SEATS: usize = 2;
pub const HAND_SIZE: usize = 3;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Briscola {
    trump: Option<Card>,
    trump_drawn: bool,
    /// Cards of the trick in flight, in play order.
    played: Vec<(usize, Card)>,
}

impl Briscola {
    pub(super) fn reset_round(&mut self) {
        self.played.clear();
    }
}

pub(super) fn deal(core: &mut Core, state: &mut Briscola) {
    for _ in 0..HAND_SIZE {
        for offset in 0..core.players.len() {
            let seat = (core.current + offset) % core.players.len();
            core.draw_card(seat);
        }
    }

    let Some(card) = core.deck.pop() else { return };
    state.trump = Some(card);
    state.trump_drawn = false;
    core.broadcast(Frame::event("show_briscola").arg(card));
}

/// Does `card` take the trick from the incumbent `best`?
fn beats(card: Card, best: Card, trump: Option<Card>) -> bool {
    let trump_suit = trump.map(|c| c.suit);
    (card.suit == best.suit
        && cards::trick_strength(card.rank) > cards::trick_strength(best.rank))
        || (Some(card.suit) == trump_suit && Some(best.suit) != trump_suit)
}

pub(super) fn play(core: &mut Core, state: &mut Briscola, card: Card) -> Result<(), GameError> {
    let seat = core.current;
    {
        let hand = &mut core.players[seat].hand;
        let Some(pos) = hand.iter().position(|c| *c == card) else {
            return Err(GameError::Rule("You don't have that card"));
        };
        hand.remove(pos);
    }
    state.played.push((seat, card));
    core.broadcast(Frame::event("play_card").arg(seat).arg(card));

    let seats = core.players.len();
    if state.played.len() == seats {
        // the first card holds the trick unless a later one beats it
        let mut winning = state.played[0];
        for &(player, card) in &state.played[1..] {
            if beats(card, winning.1, state.trump) {
                winning = (player, card);
            }
        }
        let winner = winning.0;

        let taken: Vec<Card> = state.played.iter().map(|&(_, c)| c).collect();
        core.players[winner].captured.extend(taken);
        state.played.clear();
        core.current = winner;
        core.broadcast(Frame::event("take").arg(winner));

        if !core.deck.is_empty() {
            for offset in 0..seats {
                let seat = (core.current + offset) % seats;
                if !core.deck.is_empty() {
                    core.draw_card(seat);
                } else if let Some(trump) = state.trump {
                    // deck exhausted mid-draw: the face-up trump is the last card
                    state.trump_drawn = true;
                    core.players[seat].hand.push(trump);
                    core.broadcast(Frame::event("draw_briscola").arg(seat));
                }
            }
        } else if core.players.iter().all(|p| p.hand.is_empty()) {
            let results: Vec<u32> = core
                .players
                .iter()
                .map(|p| p.captured.iter().map(|c| cards::trick_points(c.rank)).sum())
                .collect();
            core.status = GameStatus::Ended;
            core.conclude(&results);
            return Ok(());
        }
    } else {
        core.advance_turn();
    }

    core.send_player(core.current, Frame::event("turn"));
    Ok(())
}

pub(super) fn board_state(core: &Core, state: &Briscola, viewer: Option<usize>) -> Vec<Frame> {
    let mut frames = Vec::new();

    for (seat, player) in core.players.iter().enumerate() {
        for &card in &player.hand {
            frames.push(if viewer == Some(seat) {
                Frame::event("draw_card").arg(seat).arg(card)
            } else {
                Frame::event("draw_card").arg(seat)
            });
        }
    }

    if !state.trump_drawn {
        if let Some(trump) = state.trump {
            frames.push(Frame::event("show_briscola").arg(trump));
        }
    }

    for &(seat, card) in &state.played {
        frames.push(if viewer == Some(seat) {
            Frame::event("draw_card").arg(seat).arg(card)
        } else {
            Frame::event("draw_card").arg(seat)
        });
        frames.push(Frame::event("play_card").arg(seat).arg(card));
    }

    for (seat, player) in core.players.iter().enumerate() {
        if !player.captured.is_empty() {
            frames.push(Frame::event("points").arg(seat).arg(player.captured.len()));
        }
    }

    frames.push(Frame::event("deck_count").arg("deck").arg(core.deck.len()));

    if viewer == Some(core.current) {
        frames.push(Frame::event("turn"));
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};
    use crate::game::testing::{drain, seated_game};
    use crate::game::{Rules, Variant};

    fn card(suit: Suit, rank: Rank) -> Card {
        Card { suit, rank }
    }

    fn play_current(game: &mut crate::game::Game, card: Card) {
        let seat = game.core.current;
        let conn = *game.core.players[seat].conns.iter().next().expect("conn");
        let token = game.core.players[seat].token().clone();
        game.handle_frame(conn, &token, &format!("play|{card}"))
            .expect("legal play");
    }

    fn rig(
        game: &mut crate::game::Game,
        trump: Card,
        hands: [Vec<Card>; 2],
        deck: Vec<Card>,
    ) {
        game.core.status = GameStatus::Started;
        game.core.current = 0;
        game.core.deck = deck;
        for (seat, hand) in hands.into_iter().enumerate() {
            game.core.players[seat].hand = hand;
        }
        let Rules::Briscola(state) = &mut game.rules else {
            panic!("briscola game");
        };
        state.trump = Some(trump);
    }

    #[test]
    fn higher_rank_of_the_led_suit_takes_the_trick() {
        let (mut game, _rx) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Spade, Rank::Due),
            [
                vec![card(Suit::Denari, Rank::Sette), card(Suit::Coppe, Rank::Due)],
                vec![card(Suit::Denari, Rank::Fante), card(Suit::Coppe, Rank::Sei)],
            ],
            Vec::new(),
        );

        play_current(&mut game, card(Suit::Denari, Rank::Sette));
        assert_eq!(game.core.current, 1);
        play_current(&mut game, card(Suit::Denari, Rank::Fante));

        assert_eq!(game.core.current, 1);
        assert_eq!(
            game.core.players[1].captured,
            vec![
                card(Suit::Denari, Rank::Sette),
                card(Suit::Denari, Rank::Fante)
            ]
        );
    }

    #[test]
    fn trump_beats_any_plain_suit() {
        let (mut game, _rx) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Spade, Rank::Due),
            [
                vec![card(Suit::Denari, Rank::Re), card(Suit::Coppe, Rank::Due)],
                vec![
                    card(Suit::Spade, Rank::Quattro),
                    card(Suit::Coppe, Rank::Sei),
                ],
            ],
            Vec::new(),
        );

        play_current(&mut game, card(Suit::Denari, Rank::Re));
        play_current(&mut game, card(Suit::Spade, Rank::Quattro));

        assert_eq!(game.core.current, 1);
        assert_eq!(game.core.players[1].captured.len(), 2);
    }

    #[test]
    fn an_unbeaten_lead_card_wins_by_default() {
        let (mut game, _rx) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Spade, Rank::Due),
            [
                vec![card(Suit::Coppe, Rank::Due), card(Suit::Coppe, Rank::Tre)],
                vec![
                    card(Suit::Denari, Rank::Asso),
                    card(Suit::Bastoni, Rank::Re),
                ],
            ],
            Vec::new(),
        );

        play_current(&mut game, card(Suit::Coppe, Rank::Due));
        play_current(&mut game, card(Suit::Denari, Rank::Asso));

        assert_eq!(game.core.current, 0);
        assert_eq!(game.core.players[0].captured.len(), 2);
    }

    #[test]
    fn the_trump_card_is_drawn_last() {
        let (mut game, mut receivers) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Bastoni, Rank::Sette),
            [
                vec![card(Suit::Denari, Rank::Sei)],
                vec![card(Suit::Denari, Rank::Cinque)],
            ],
            vec![card(Suit::Coppe, Rank::Cinque)],
        );

        play_current(&mut game, card(Suit::Denari, Rank::Sei));
        play_current(&mut game, card(Suit::Denari, Rank::Cinque));

        // winner draws the last deck card, the loser takes the trump
        assert_eq!(game.core.current, 0);
        assert_eq!(game.core.players[0].hand, vec![card(Suit::Coppe, Rank::Cinque)]);
        assert_eq!(
            game.core.players[1].hand,
            vec![card(Suit::Bastoni, Rank::Sette)]
        );
        let Rules::Briscola(state) = &game.rules else {
            panic!("briscola game");
        };
        assert!(state.trump_drawn);
        let frames = drain(&mut receivers[0]);
        assert!(frames.contains(&"draw_briscola|1".to_owned()));
    }

    #[test]
    fn the_last_trick_ends_the_hand_with_exact_scores() {
        let (mut game, mut receivers) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Spade, Rank::Due),
            [
                vec![card(Suit::Denari, Rank::Asso)],
                vec![card(Suit::Denari, Rank::Tre)],
            ],
            Vec::new(),
        );
        game.core.players[0].captured = vec![
            card(Suit::Coppe, Rank::Re),
            card(Suit::Coppe, Rank::Cavallo),
        ];
        game.core.players[1].captured = vec![card(Suit::Bastoni, Rank::Fante)];

        play_current(&mut game, card(Suit::Denari, Rank::Asso));
        play_current(&mut game, card(Suit::Denari, Rank::Tre));

        // 4 + 3 from the old pile plus 11 + 10 from the trick against 2
        assert_eq!(game.core.status, GameStatus::Ended);
        let frames = drain(&mut receivers[1]);
        assert!(frames.contains(&"results|28|2".to_owned()));
        assert!(game.core.players.iter().all(|p| p.hand.is_empty()));
        assert!(game.core.players.iter().all(|p| !p.ready));
    }

    #[test]
    fn replay_hides_the_other_hand() {
        let (mut game, _rx) = seated_game(Variant::Briscola);
        rig(
            &mut game,
            card(Suit::Spade, Rank::Due),
            [
                vec![card(Suit::Denari, Rank::Sette)],
                vec![card(Suit::Coppe, Rank::Sei)],
            ],
            vec![card(Suit::Bastoni, Rank::Asso)],
        );

        let Rules::Briscola(state) = &game.rules else {
            panic!("briscola game");
        };
        let frames: Vec<String> = board_state(&game.core, state, Some(0))
            .into_iter()
            .map(Frame::into_string)
            .collect();
        assert_eq!(
            frames,
            vec![
                "draw_card|0|denari:7".to_owned(),
                "draw_card|1".to_owned(),
                "show_briscola|spade:2".to_owned(),
                "deck_count|deck|1".to_owned(),
                "turn".to_owned(),
            ]
        );
    }
}
