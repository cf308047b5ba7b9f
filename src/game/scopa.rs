//! Scopa: capture table cards by matching sums, sweep bonuses and a
//! four-category scoring breakdown.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::cards::{self, Card, Rank, Suit};
use crate::error::GameError;
use crate::game::{Core, GameStatus};
use crate::protocol::Frame;

pub const VERSION: u32 = 1;
pub const SEATS: usize = 2;
pub const HAND_SIZE: usize = 6;
pub const TABLE_SIZE: usize = 4;

/// The play sub-machine within a turn. `TurnFinished` is internal and is
/// reduced to `Hand` (or the end of the round) before the turn yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Hand,
    Capture,
    TurnFinished,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Hand => "hand",
            Phase::Capture => "capture",
            Phase::TurnFinished => "turn_finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Scopa {
    table: Vec<Card>,
    phase: Phase,
    last_taker: usize,
    /// The played card a capture is being chosen for; set while in `Capture`.
    active: Option<Card>,
    takeable: Vec<Card>,
    selected: Vec<Card>,
    /// One sweep pile per seat, holding the card that made each sweep.
    sweeps: Vec<Vec<Card>>,
}

impl Default for Scopa {
    fn default() -> Self {
        Scopa {
            table: Vec::new(),
            phase: Phase::Hand,
            last_taker: 0,
            active: None,
            takeable: Vec::new(),
            selected: Vec::new(),
            sweeps: vec![Vec::new(); SEATS],
        }
    }
}

impl Scopa {
    pub(super) fn phase(&self) -> Phase {
        self.phase
    }

    pub(super) fn reset_round(&mut self) {
        self.table.clear();
        self.phase = Phase::Hand;
        self.last_taker = 0;
        self.active = None;
        self.takeable.clear();
        self.selected.clear();
        self.sweeps = vec![Vec::new(); SEATS];
    }
}

pub(super) fn deal(core: &mut Core, state: &mut Scopa) {
    deal_hands(core);
    for _ in 0..TABLE_SIZE {
        let Some(card) = core.deck.pop() else { break };
        state.table.push(card);
        core.broadcast(Frame::event("add_to_table").arg(card));
    }
}

fn deal_hands(core: &mut Core) {
    for _ in 0..HAND_SIZE {
        for offset in 0..core.players.len() {
            let seat = (core.current + offset) % core.players.len();
            core.draw_card(seat);
        }
    }
}

/// What a played card may capture: a same-rank table card is the only legal
/// offer when one exists; otherwise every table card that participates in
/// some exact-sum combination.
fn capture_offer(state: &Scopa, card: Card) -> Vec<Card> {
    let same_rank: Vec<Card> = state
        .table
        .iter()
        .copied()
        .filter(|c| c.rank == card.rank)
        .collect();
    if !same_rank.is_empty() {
        return same_rank;
    }
    takeable(&state.table, card, &[])
}

/// The membership set of the capture search: table cards (excluding `used`)
/// whose value can be part of at least one combination exactly summing to
/// the active card's value minus the `used` values, in table order.
fn takeable(table: &[Card], active: Card, used: &[Card]) -> Vec<Card> {
    let spent: i32 = used.iter().map(|c| cards::face_value(c.rank)).sum();
    let target = cards::face_value(active.rank) - spent;

    let mut values: Vec<i32> = table
        .iter()
        .filter(|c| !used.contains(c))
        .map(|c| cards::face_value(c.rank))
        .filter(|&v| v <= target)
        .collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let valid = combinations(target, &values, 0);
    table
        .iter()
        .copied()
        .filter(|c| !used.contains(c) && valid.contains(&cards::face_value(c.rank)))
        .collect()
}

/// Values that exactly complete `target` on their own or participate in some
/// recursive completion using later entries of `values`.
fn combinations(target: i32, values: &[i32], from: usize) -> BTreeSet<i32> {
    let mut out = BTreeSet::new();
    for (i, &value) in values.iter().enumerate().skip(from) {
        let remainder = target - value;
        if remainder < 0 {
            continue;
        }
        if remainder == 0 {
            out.insert(value);
            continue;
        }
        let nested = combinations(remainder, values, i + 1);
        if !nested.is_empty() {
            out.insert(value);
            out.extend(nested);
        }
    }
    out
}

pub(super) fn play(core: &mut Core, state: &mut Scopa, card: Card) -> Result<(), GameError> {
    if state.phase != Phase::Hand {
        return Err(GameError::Rule("You can't play a card now"));
    }
    if !core.players[core.current].hand.contains(&card) {
        return Err(GameError::Rule("You don't have that card"));
    }

    let offer = capture_offer(state, card);
    if offer.is_empty() {
        core.broadcast(Frame::event("play_card").arg(core.current).arg(card));
        let hand = &mut core.players[core.current].hand;
        if let Some(pos) = hand.iter().position(|c| *c == card) {
            hand.remove(pos);
        }
        state.table.push(card);
        state.phase = Phase::TurnFinished;
    } else {
        state.active = Some(card);
        state.takeable = offer;
        state.selected.clear();
        core.broadcast(Frame::event("activate_card").arg(core.current).arg(card));
        core.send_player(
            core.current,
            Frame::event("capture_takeable_cards").args(&state.takeable),
        );
        state.phase = Phase::Capture;
    }

    if state.phase == Phase::TurnFinished && finish_turn(core, state) {
        return Ok(());
    }

    core.broadcast(Frame::event("turn_status").arg(state.phase));
    core.send_player(core.current, Frame::event("turn"));
    Ok(())
}

pub(super) fn take_choice(
    core: &mut Core,
    state: &mut Scopa,
    card: Card,
) -> Result<(), GameError> {
    if state.phase != Phase::Capture {
        return Err(GameError::Rule("You can't take a card now"));
    }
    let offered = state.takeable.contains(&card);
    if !offered && !state.selected.contains(&card) {
        return Err(GameError::Rule("You can't swap that card"));
    }
    let Some(active) = state.active else {
        return Err(GameError::Rule("You can't take a card now"));
    };

    let old_takeable = state.takeable.clone();
    if offered {
        state.takeable.retain(|c| *c != card);
        state.selected.push(card);
    } else {
        state.selected.retain(|c| *c != card);
        state.takeable.push(card);
    }

    let selected_sum: i32 = state
        .selected
        .iter()
        .map(|c| cards::face_value(c.rank))
        .sum();

    // recompute what is still combinable and publish only the membership
    // delta; the toggled card goes out separately either way
    let new_takeable = takeable(&state.table, active, &state.selected);
    let delta: Vec<Card> = state
        .table
        .iter()
        .copied()
        .filter(|c| old_takeable.contains(c) != new_takeable.contains(c))
        .collect();
    state.takeable = new_takeable;
    core.send_player(
        core.current,
        Frame::event("capture_takeable_cards").args(&delta),
    );
    core.broadcast(Frame::event("capture_selected_cards").arg(card));

    if selected_sum == cards::face_value(active.rank) {
        let seat = core.current;
        {
            let hand = &mut core.players[seat].hand;
            if let Some(pos) = hand.iter().position(|c| *c == active) {
                hand.remove(pos);
            }
        }
        core.players[seat].captured.push(active);
        let selected = std::mem::take(&mut state.selected);
        state.table.retain(|c| !selected.contains(c));
        core.players[seat].captured.extend(selected);

        let is_sweep = state.table.is_empty();
        core.broadcast(Frame::event("take").arg(seat).arg(u8::from(is_sweep)));
        state.last_taker = seat;
        if is_sweep {
            state.sweeps[seat].push(active);
        }

        state.phase = Phase::Hand;
        state.active = None;
        state.takeable.clear();
        core.broadcast(Frame::event("turn_status").arg(state.phase));

        if finish_turn(core, state) {
            return Ok(());
        }
    }

    core.send_player(core.current, Frame::event("turn"));
    Ok(())
}

/// Advance the turn; deal fresh hands or conclude the round once both hands
/// are empty. Returns true when the round ended.
fn finish_turn(core: &mut Core, state: &mut Scopa) -> bool {
    let seats = core.players.len();
    core.advance_turn();

    if core.players.iter().all(|p| p.hand.is_empty()) {
        if !core.deck.is_empty() {
            deal_hands(core);
        } else {
            if !state.table.is_empty() {
                core.broadcast(Frame::event("take_all").arg(state.last_taker));
                let leftovers = std::mem::take(&mut state.table);
                core.players[state.last_taker].captured.extend(leftovers);
            }

            core.status = GameStatus::Ended;
            core.broadcast(Frame::event("results_prepare"));

            let cards_points = score_cards(core);
            let denari_points = score_denari(core);
            let primiera_points = score_primiera(core);
            let settebello_points = score_settebello(core);
            let sweep_points: Vec<u32> =
                state.sweeps.iter().map(|pile| pile.len() as u32).collect();
            core.broadcast(
                Frame::event("results_detail")
                    .arg("scopa")
                    .args(&sweep_points),
            );

            let results: Vec<u32> = (0..seats)
                .map(|seat| {
                    sweep_points[seat]
                        + cards_points[seat]
                        + denari_points[seat]
                        + primiera_points[seat]
                        + settebello_points[seat]
                })
                .collect();
            core.conclude(&results);
            for pile in &mut state.sweeps {
                pile.clear();
            }
            return true;
        }
    }

    state.phase = Phase::Hand;
    false
}

// ========== Scoring categories ==========

/// Most captured cards; a 20-20 split awards nobody.
fn score_cards(core: &Core) -> Vec<u32> {
    let scores: Vec<usize> = core.players.iter().map(|p| p.captured.len()).collect();
    core.broadcast(Frame::event("results_detail").arg("cards").args(&scores));

    let best = scores.iter().copied().max().unwrap_or(0);
    let mut points = vec![0; scores.len()];
    if best != 20 {
        if let Some(winner) = scores.iter().position(|&s| s == best) {
            points[winner] = 1;
        }
    }
    points
}

/// Most coin-suit cards; a 5-5 split awards nobody.
fn score_denari(core: &Core) -> Vec<u32> {
    let scores: Vec<usize> = core
        .players
        .iter()
        .map(|p| p.captured.iter().filter(|c| c.suit == Suit::Denari).count())
        .collect();
    core.broadcast(Frame::event("results_detail").arg("denari").args(&scores));

    let best = scores.iter().copied().max().unwrap_or(0);
    let mut points = vec![0; scores.len()];
    if best != 5 {
        if let Some(winner) = scores.iter().position(|&s| s == best) {
            points[winner] = 1;
        }
    }
    points
}

/// Best card per suit under the primiera table, summed; ties award nobody.
/// The detail frame carries each player's total and, per suit, the rank of
/// the counted card (`0` for an uncaptured suit).
fn score_primiera(core: &Core) -> Vec<u32> {
    let mut scores: Vec<u32> = Vec::with_capacity(core.players.len());
    let mut shown: Vec<Vec<String>> = Vec::with_capacity(core.players.len());

    for player in &core.players {
        let mut total = 0;
        let mut ranks = Vec::with_capacity(Suit::ALL.len());
        for suit in Suit::ALL {
            let mut best: Option<Card> = None;
            for &card in player.captured.iter().filter(|c| c.suit == suit) {
                if best.map_or(true, |b| {
                    cards::primiera_points(card.rank) > cards::primiera_points(b.rank)
                }) {
                    best = Some(card);
                }
            }
            match best {
                Some(card) => {
                    total += cards::primiera_points(card.rank);
                    ranks.push(card.rank.to_string());
                }
                None => ranks.push("0".to_owned()),
            }
        }
        scores.push(total);
        shown.push(ranks);
    }

    let mut frame = Frame::event("results_detail").arg("primiera").args(&scores);
    for (i, suit) in Suit::ALL.iter().enumerate() {
        frame = frame.arg(suit);
        for ranks in &shown {
            frame = frame.arg(&ranks[i]);
        }
    }
    core.broadcast(frame);

    let mut ordered = scores.clone();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    let mut points = vec![0; scores.len()];
    if ordered.len() > 1 && ordered[0] != ordered[1] {
        if let Some(winner) = scores.iter().position(|&s| s == ordered[0]) {
            points[winner] = 1;
        }
    }
    points
}

/// One point for holding the sette of denari.
fn score_settebello(core: &Core) -> Vec<u32> {
    let settebello = Card {
        suit: Suit::Denari,
        rank: Rank::Sette,
    };
    let points: Vec<u32> = core
        .players
        .iter()
        .map(|p| u32::from(p.captured.contains(&settebello)))
        .collect();
    core.broadcast(
        Frame::event("results_detail")
            .arg("settebello")
            .args(&points),
    );
    points
}

pub(super) fn board_state(core: &Core, state: &Scopa, viewer: Option<usize>) -> Vec<Frame> {
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

    for &card in &state.table {
        frames.push(Frame::event("add_to_table").arg(card));
    }

    // pile heights are capped to keep hidden information hidden without
    // flattening the deck visuals
    for (seat, player) in core.players.iter().enumerate() {
        if !player.captured.is_empty() {
            let height = player
                .captured
                .len()
                .saturating_sub(state.sweeps[seat].len())
                .min(6);
            frames.push(Frame::event("points").arg(seat).arg(height));
        }
        if !state.sweeps[seat].is_empty() {
            frames.push(
                Frame::event("points_scopa")
                    .arg(seat)
                    .args(&state.sweeps[seat]),
            );
        }
    }

    frames.push(Frame::event("deck_count").arg("deck").arg(core.deck.len()));

    frames.push(Frame::event("turn_status").arg(state.phase));
    if state.phase == Phase::Capture {
        if let Some(active) = state.active {
            frames.push(Frame::event("activate_card").arg(core.current).arg(active));
            if viewer == Some(core.current) {
                frames.push(Frame::event("capture_takeable_cards").args(&state.takeable));
            }
            frames.push(Frame::event("capture_selected_cards").args(&state.selected));
        }
    }

    if viewer == Some(core.current) {
        frames.push(Frame::event("turn"));
    }

    frames
}
