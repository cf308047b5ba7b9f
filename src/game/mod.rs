//! Game sessions: seats, the turn state machine, the messaging layer and
//! command dispatch. The rule engines live in the submodules.

pub mod briscola;
pub mod scopa;

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};

use axum::extract::ws::Message;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cards::{self, Card};
use crate::error::{CommandFailure, GameError};
use crate::protocol::{self, Arg, CommandSpec, Frame, PlayerBinding};

pub type ConnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    NotStarted,
    Started,
    Ended,
}

impl Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::NotStarted => "not_started",
            GameStatus::Started => "started",
            GameStatus::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Opaque per-browser identity carried by the session cookie. Player
/// equality is by token only, never by display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

#[derive(Debug, Serialize, Deserialize)]
pub struct Player {
    token: SessionToken,
    pub name: String,
    pub ready: bool,
    pub hand: Vec<Card>,
    pub captured: Vec<Card>,
    /// Live connections for this seat; rebuilt empty on resume.
    #[serde(skip)]
    pub conns: HashSet<ConnId>,
}

impl Player {
    pub fn new(token: SessionToken, name: String) -> Self {
        Player {
            token,
            name,
            ready: true,
            hand: Vec::new(),
            captured: Vec::new(),
            conns: HashSet::new(),
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// End-of-round reset: hand and pile emptied, rematch vote withdrawn.
    pub fn reset(&mut self) {
        self.ready = false;
        self.hand.clear();
        self.captured.clear();
    }
}

/// Outbound message queues, one per attached connection. Enqueues are
/// non-blocking; a per-connection writer task drains them to the socket, so
/// every frame enqueued under the game lock reaches each connection in
/// exactly that order.
#[derive(Debug, Default)]
pub struct Outboxes {
    map: HashMap<ConnId, mpsc::UnboundedSender<Message>>,
}

impl Outboxes {
    pub fn attach(&mut self, conn: ConnId, tx: mpsc::UnboundedSender<Message>) {
        self.map.insert(conn, tx);
    }

    pub fn detach(&mut self, conn: ConnId) {
        self.map.remove(&conn);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn send_str(&self, conn: ConnId, frame: &str) {
        if let Some(tx) = self.map.get(&conn) {
            if tx.send(Message::Text(frame.to_owned())).is_err() {
                tracing::debug!(conn, "dropping frame for a closed connection");
            }
        }
    }
}

// ========== Core: seats, deck, turn pointer, messaging ==========

#[derive(Debug, Serialize, Deserialize)]
pub struct Core {
    pub players: Vec<Player>,
    /// Consumed from the end.
    pub deck: Vec<Card>,
    pub status: GameStatus,
    starting: usize,
    pub current: usize,
    #[serde(skip)]
    pub conns: Outboxes,
}

impl Core {
    fn new(seats: usize) -> Self {
        Core {
            players: Vec::new(),
            deck: Vec::new(),
            status: GameStatus::NotStarted,
            starting: thread_rng().gen_range(0..seats),
            current: 0,
            conns: Outboxes::default(),
        }
    }

    /// Seat lookup by session token.
    pub fn resolve(&self, token: &SessionToken) -> Option<usize> {
        self.players.iter().position(|p| p.token == *token)
    }

    pub fn detach_conn(&mut self, conn: ConnId) {
        self.conns.detach(conn);
        for player in &mut self.players {
            player.conns.remove(&conn);
        }
    }

    fn seats(&self) -> usize {
        self.players.len()
    }

    pub(crate) fn advance_turn(&mut self) {
        self.current = (self.current + 1) % self.seats();
    }

    pub fn broadcast(&self, frame: Frame) {
        let frame = frame.into_string();
        for &conn in self.conns.map.keys() {
            self.conns.send_str(conn, &frame);
        }
    }

    pub fn send_conn(&self, conn: ConnId, frame: Frame) {
        self.conns.send_str(conn, &frame.into_string());
    }

    pub fn send_player(&self, seat: usize, frame: Frame) {
        let frame = frame.into_string();
        for &conn in &self.players[seat].conns {
            self.conns.send_str(conn, &frame);
        }
    }

    fn send_others_of_conn(&self, conn: ConnId, frame: Frame) {
        let frame = frame.into_string();
        for &other in self.conns.map.keys() {
            if other != conn {
                self.conns.send_str(other, &frame);
            }
        }
    }

    fn send_others_of_player(&self, seat: usize, frame: Frame) {
        let frame = frame.into_string();
        for &other in self.conns.map.keys() {
            if !self.players[seat].conns.contains(&other) {
                self.conns.send_str(other, &frame);
            }
        }
    }

    fn roster(&self) -> Frame {
        Frame::event("players").args(self.players.iter().map(|p| &p.name))
    }

    /// Deal one card to a seat: the card is visible to that seat only.
    pub fn draw_card(&mut self, seat: usize) {
        // callers only deal while the deck has cards
        let Some(card) = self.deck.pop() else { return };
        self.players[seat].hand.push(card);
        self.send_player(seat, Frame::event("draw_card").arg(seat).arg(card));
        self.send_others_of_player(seat, Frame::event("draw_card").arg(seat));
    }

    /// Announce the hand's results, rotate the starting seat and reset every
    /// player for a possible rematch.
    pub fn conclude(&mut self, results: &[u32]) {
        self.broadcast(Frame::event("results").args(results));
        self.starting = (self.starting + 1) % self.seats();
        for player in &mut self.players {
            player.reset();
        }
    }
}

// ========== Variants ==========

/// The playable game family. New variants register here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Briscola,
    Scopa,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Briscola, Variant::Scopa];

    pub fn from_name(name: &str) -> Option<Variant> {
        match name {
            "briscola" => Some(Variant::Briscola),
            "scopa" => Some(Variant::Scopa),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Briscola => "briscola",
            Variant::Scopa => "scopa",
        }
    }

    /// Rule version; bumped whenever a variant's logic changes incompatibly
    /// with previously saved games.
    pub fn version(self) -> u32 {
        match self {
            Variant::Briscola => briscola::VERSION,
            Variant::Scopa => scopa::VERSION,
        }
    }

    pub fn seats(self) -> usize {
        match self {
            Variant::Briscola => briscola::SEATS,
            Variant::Scopa => scopa::SEATS,
        }
    }

    pub fn new_game(self) -> Game {
        let rules = match self {
            Variant::Briscola => Rules::Briscola(briscola::Briscola::default()),
            Variant::Scopa => Rules::Scopa(scopa::Scopa::default()),
        };
        Game {
            core: Core::new(self.seats()),
            rules,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rules {
    Briscola(briscola::Briscola),
    Scopa(scopa::Scopa),
}

/// One running game session. All access is serialized by the owning
/// handle's mutex, so handlers mutate and broadcast without interleaving.
#[derive(Debug, Serialize, Deserialize)]
pub struct Game {
    pub core: Core,
    pub rules: Rules,
}

impl Game {
    pub fn variant(&self) -> Variant {
        match self.rules {
            Rules::Briscola(_) => Variant::Briscola,
            Rules::Scopa(_) => Variant::Scopa,
        }
    }

    fn commands(&self) -> &'static [CommandSpec] {
        match self.rules {
            Rules::Briscola(_) => protocol::BRISCOLA_COMMANDS,
            Rules::Scopa(_) => protocol::SCOPA_COMMANDS,
        }
    }

    // ========== Dispatch ==========

    /// Decode, validate and run one inbound frame. Errors out of the rule
    /// handlers are tagged with the command name; everything earlier is not.
    pub fn handle_frame(
        &mut self,
        conn: ConnId,
        token: &SessionToken,
        text: &str,
    ) -> Result<(), CommandFailure> {
        let (name, raw_args) = protocol::split_frame(text);
        let spec = protocol::lookup(self.commands(), name).ok_or_else(|| {
            CommandFailure::untagged(GameError::UnknownCommand(name.to_owned()))
        })?;

        if let Some(required) = spec.status {
            if self.core.status != required {
                return Err(CommandFailure::untagged(GameError::WrongStatus));
            }
        }
        if spec.current_player {
            let owns_turn = self
                .core
                .players
                .get(self.core.current)
                .is_some_and(|p| p.conns.contains(&conn));
            if !owns_turn {
                return Err(CommandFailure::untagged(GameError::NotYourTurn));
            }
        }

        let seat = match spec.binding {
            PlayerBinding::None => None,
            PlayerBinding::Optional => self.core.resolve(token),
            PlayerBinding::Required => Some(
                self.core
                    .resolve(token)
                    .ok_or_else(|| CommandFailure::untagged(GameError::NotAPlayer))?,
            ),
        };

        let args = protocol::coerce(spec, &raw_args).map_err(CommandFailure::untagged)?;

        self.invoke(conn, token, seat, spec.name, &args)
            .map_err(|error| CommandFailure::tagged(error, spec.name))
    }

    fn invoke(
        &mut self,
        conn: ConnId,
        token: &SessionToken,
        seat: Option<usize>,
        name: &str,
        args: &[Arg],
    ) -> Result<(), GameError> {
        match (name, args) {
            ("current_state", _) => {
                self.send_current_state(conn, seat);
                Ok(())
            }
            ("join", [Arg::Str(player_name)]) => {
                self.join(conn, token, player_name);
                Ok(())
            }
            ("name", [Arg::Str(player_name)]) => {
                let seat = seat.ok_or(GameError::NotAPlayer)?;
                self.rename(seat, player_name);
                Ok(())
            }
            ("rematch", _) => {
                let seat = seat.ok_or(GameError::NotAPlayer)?;
                self.rematch(seat);
                Ok(())
            }
            ("play", [Arg::Card(card)]) => {
                let Game { core, rules } = self;
                match rules {
                    Rules::Briscola(state) => briscola::play(core, state, *card),
                    Rules::Scopa(state) => scopa::play(core, state, *card),
                }
            }
            ("take_choice", [Arg::Card(card)]) => {
                let Game { core, rules } = self;
                match rules {
                    Rules::Scopa(state) => scopa::take_choice(core, state, *card),
                    Rules::Briscola(_) => Err(GameError::UnknownCommand(name.to_owned())),
                }
            }
            _ => Err(GameError::UnknownCommand(name.to_owned())),
        }
    }

    // ========== Shared commands ==========

    /// Seat the caller (or reattach them to their existing seat). A full
    /// table is not an error: the connection just gets a state replay and
    /// stays on as a spectator.
    fn join(&mut self, conn: ConnId, token: &SessionToken, name: &str) {
        let seats = self.variant().seats();
        let seat = match self.core.resolve(token) {
            Some(seat) => {
                self.core.players[seat].name = name.to_owned();
                seat
            }
            None => {
                if self.core.players.len() >= seats {
                    self.send_current_state(conn, None);
                    return;
                }
                self.core
                    .players
                    .push(Player::new(token.clone(), name.to_owned()));
                let roster = self.core.roster();
                self.core.send_others_of_conn(conn, roster);
                self.core.players.len() - 1
            }
        };

        self.core.players[seat].conns.insert(conn);
        self.send_current_state(conn, Some(seat));

        if self.core.players.len() == seats && self.core.status == GameStatus::NotStarted {
            self.core.players.shuffle(&mut thread_rng());
            self.prepare_start();
        }
    }

    fn rename(&mut self, seat: usize, name: &str) {
        self.core.players[seat].name = name.to_owned();
        let roster = self.core.roster();
        self.core.broadcast(roster);
    }

    /// Record a rematch vote; unanimity starts the next hand.
    fn rematch(&mut self, seat: usize) {
        self.core.players[seat].ready = true;
        if self.core.players.iter().all(|p| p.ready) {
            self.prepare_start();
        }
    }

    // ========== State machine ==========

    /// Shuffle a fresh deck and begin play from the starting seat. Driven by
    /// `join` once the table fills and by unanimous `rematch` votes.
    pub fn prepare_start(&mut self) {
        let Game { core, rules } = self;
        match rules {
            Rules::Briscola(state) => state.reset_round(),
            Rules::Scopa(state) => state.reset_round(),
        }

        core.deck = cards::shuffled_deck();
        core.current = core.starting;
        core.status = GameStatus::Started;

        let roster = core.roster();
        core.broadcast(roster);
        for seat in 0..core.players.len() {
            core.send_player(seat, Frame::event("player_id").arg(seat));
        }
        core.broadcast(Frame::event("begin"));

        match rules {
            Rules::Briscola(state) => briscola::deal(core, state),
            Rules::Scopa(state) => scopa::deal(core, state),
        }

        core.send_player(core.current, Frame::event("turn"));
        if let Rules::Scopa(state) = rules {
            core.send_player(core.current, Frame::event("turn_status").arg(state.phase()));
        }
    }

    /// Replay everything a connection needs to reconstruct the visible
    /// state. Never mutates game state, except that a replay of an ended
    /// game casts the caller's rematch vote.
    pub fn send_current_state(&mut self, conn: ConnId, seat: Option<usize>) {
        let core = &self.core;
        core.send_conn(conn, core.roster());
        if let Some(seat) = seat {
            if core.status != GameStatus::NotStarted {
                core.send_conn(conn, Frame::event("player_id").arg(seat));
            }
        }

        match core.status {
            GameStatus::Started => {
                core.send_conn(conn, Frame::event("animations").arg("off"));
                core.send_conn(conn, Frame::event("begin"));
                let frames = match &self.rules {
                    Rules::Briscola(state) => briscola::board_state(core, state, seat),
                    Rules::Scopa(state) => scopa::board_state(core, state, seat),
                };
                for frame in frames {
                    core.send_conn(conn, frame);
                }
                core.send_conn(conn, Frame::event("animations").arg("on"));
            }
            GameStatus::Ended => {
                if let Some(seat) = seat {
                    self.rematch(seat);
                }
            }
            GameStatus::NotStarted => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A game with two seated, connected players and their outbox receivers.
    /// Connection ids are `1` and `2`, tokens `player0` and `player1`.
    pub fn seated_game(variant: Variant) -> (Game, Vec<mpsc::UnboundedReceiver<Message>>) {
        let mut game = variant.new_game();
        let mut receivers = Vec::new();
        for seat in 0..variant.seats() {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = seat as ConnId + 1;
            game.core.conns.attach(conn, tx);
            let mut player = Player::new(
                SessionToken(format!("player{seat}")),
                format!("Player {seat}"),
            );
            player.conns.insert(conn);
            game.core.players.push(player);
            receivers.push(rx);
        }
        (game, receivers)
    }

    /// Drain every frame queued for one receiver.
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                frames.push(text);
            }
        }
        frames
    }

    /// The connection id and token of the seat whose turn it is.
    pub fn current_caller(game: &Game) -> (ConnId, SessionToken) {
        let seat = game.core.current;
        let conn = *game.core.players[seat]
            .conns
            .iter()
            .next()
            .expect("seat is connected");
        (conn, game.core.players[seat].token().clone())
    }
}
