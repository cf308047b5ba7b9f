//! Shared helpers for driving full games through the public command path.
#![allow(dead_code)]

use axum::extract::ws::Message;
use tavola::game::{ConnId, Game, SessionToken, Variant};
use tokio::sync::mpsc;

/// Create a game and seat two players through real `join` frames, which
/// starts play. Connection `seat + 1` belongs to token `player<seat>`, but
/// the start shuffles seat order; use [`caller`] and [`receiver_index`] to
/// address whoever holds a seat now.
pub fn started_game(variant: Variant) -> (Game, Vec<mpsc::UnboundedReceiver<Message>>) {
    let mut game = variant.new_game();
    let mut receivers = Vec::new();
    for player in 0..variant.seats() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = player as ConnId + 1;
        game.core.conns.attach(conn, tx);
        receivers.push(rx);
        game.handle_frame(
            conn,
            &SessionToken(format!("player{player}")),
            &format!("join|Player {player}"),
        )
        .expect("join");
    }
    (game, receivers)
}

/// The connection id and token seated at `seat`.
pub fn caller(game: &Game, seat: usize) -> (ConnId, SessionToken) {
    let conn = *game.core.players[seat]
        .conns
        .iter()
        .next()
        .expect("seat is connected");
    (conn, game.core.players[seat].token().clone())
}

/// Which receiver from [`started_game`] belongs to `seat`.
pub fn receiver_index(game: &Game, seat: usize) -> usize {
    let (conn, _) = caller(game, seat);
    conn as usize - 1
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            frames.push(text);
        }
    }
    frames
}

/// Split a frame into its parts.
pub fn parts(frame: &str) -> Vec<&str> {
    frame.split('|').collect()
}
