//! The table of active games and the suspend/resume lifecycle.
//!
//! Games are evicted explicitly on last disconnect rather than garbage
//! collected: the detach path removes the entry and, for anything past
//! NOT_STARTED, snapshots it into the durable store. Attach and detach
//! transitions share one async mutex so a resume can never race a suspend
//! for the same key.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::game::{ConnId, Game, GameStatus, Variant};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameKey {
    pub variant: Variant,
    pub id: String,
}

/// One active game. The mutex serializes every command and broadcast for
/// this game; handlers never await while holding it.
pub struct GameHandle {
    pub key: GameKey,
    pub game: Mutex<Game>,
}

pub struct GameRegistry {
    games: DashMap<GameKey, Arc<GameHandle>>,
    lifecycle: tokio::sync::Mutex<()>,
    store: Store,
}

/// `/status` report entry for a running game.
#[derive(Debug, Serialize)]
pub struct ActiveGame {
    pub game_type: &'static str,
    pub game_id: String,
    pub players: Vec<String>,
    pub status: GameStatus,
}

impl GameRegistry {
    pub fn new(store: Store) -> Self {
        GameRegistry {
            games: DashMap::new(),
            lifecycle: tokio::sync::Mutex::new(()),
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register a connection with the game under `key`, reviving a saved
    /// game if one is stored and still valid, or creating a fresh one.
    pub async fn attach(
        &self,
        key: GameKey,
        conn: ConnId,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Arc<GameHandle> {
        let _guard = self.lifecycle.lock().await;

        let handle = match self.games.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let game = match self.resume(&key).await {
                    Some(game) => game,
                    None => key.variant.new_game(),
                };
                let handle = Arc::new(GameHandle {
                    key: key.clone(),
                    game: Mutex::new(game),
                });
                self.games.insert(key, handle.clone());
                handle
            }
        };

        handle.game.lock().core.conns.attach(conn, tx);
        handle
    }

    async fn resume(&self, key: &GameKey) -> Option<Game> {
        let store = self.store.clone();
        let lookup = key.clone();
        match tokio::task::spawn_blocking(move || store.take_valid(&lookup)).await {
            Ok(Ok(Some(game))) => {
                tracing::info!(game = key.variant.name(), id = %key.id, "resumed saved game");
                Some(game)
            }
            Ok(Ok(None)) => None,
            Ok(Err(err)) => {
                tracing::warn!(
                    game = key.variant.name(),
                    id = %key.id,
                    error = %err,
                    "discarded unreadable saved game"
                );
                None
            }
            Err(err) => {
                tracing::error!(error = %err, "resume task failed");
                None
            }
        }
    }

    /// Drop a connection. When it was the last one the game is evicted and,
    /// unless it never started, suspended into the store.
    pub async fn detach(&self, handle: &Arc<GameHandle>, conn: ConnId) {
        let _guard = self.lifecycle.lock().await;

        let snapshot = {
            let mut game = handle.game.lock();
            game.core.detach_conn(conn);
            if !game.core.conns.is_empty() {
                return;
            }
            if game.core.status == GameStatus::NotStarted {
                None
            } else {
                Some(serde_json::to_string(&*game))
            }
        };
        self.games.remove(&handle.key);

        match snapshot {
            None => {}
            Some(Ok(state)) => {
                let store = self.store.clone();
                let key = handle.key.clone();
                let version = key.variant.version();
                let saved =
                    tokio::task::spawn_blocking(move || store.save(&key, version, &state)).await;
                match saved {
                    Ok(Ok(())) => {
                        tracing::info!(
                            game = handle.key.variant.name(),
                            id = %handle.key.id,
                            "suspended idle game"
                        );
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "failed to suspend game");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "suspend task failed");
                    }
                }
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "failed to serialize game for suspend");
            }
        }
    }

    pub fn active_overview(&self) -> Vec<ActiveGame> {
        self.games
            .iter()
            .map(|entry| {
                let game = entry.value().game.lock();
                ActiveGame {
                    game_type: entry.key().variant.name(),
                    game_id: entry.key().id.clone(),
                    players: game.core.players.iter().map(|p| p.name.clone()).collect(),
                    status: game.core.status,
                }
            })
            .collect()
    }
}
