//! The durable saved-game store.
//!
//! One SQLite table keyed by `(game_type, game_id)`, holding the rule
//! version, the save timestamp and the JSON snapshot. The connection is
//! opened and closed per operation so nothing is ever held across a
//! suspension point. A saved row is valid while it is younger than seven
//! days and its version matches the variant's current rule version.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::game::{Game, Variant};
use crate::registry::GameKey;

const MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;
const SWEEP_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

/// `/status` report entry for a suspended game.
#[derive(Debug, serde::Serialize)]
pub struct SavedSummary {
    pub game_type: String,
    pub game_id: String,
    pub saved_at: i64,
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn is_valid(version: u32, saved_at: i64, current_version: u32) -> bool {
    version == current_version && now() - saved_at < MAX_AGE_SECS
}

impl Store {
    pub fn new(path: PathBuf) -> Self {
        Store { path }
    }

    /// Create the data directory and schema.
    pub fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.open().map(|_| ())
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS saved_games (
                game_type TEXT NOT NULL,
                game_id   TEXT NOT NULL,
                version   INTEGER NOT NULL,
                saved_at  INTEGER NOT NULL,
                state     TEXT NOT NULL,
                PRIMARY KEY (game_type, game_id)
            )",
        )?;
        Ok(conn)
    }

    pub fn save(&self, key: &GameKey, version: u32, state: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO saved_games
                (game_type, game_id, version, saved_at, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.variant.name(), key.id, version, now(), state],
        )?;
        Ok(())
    }

    /// Load and consume the saved game under `key` if it is still valid.
    /// Invalid rows are left for the sweep; unreadable rows are discarded.
    pub fn take_valid(&self, key: &GameKey) -> Result<Option<Game>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT version, saved_at, state FROM saved_games
                 WHERE game_type = ?1 AND game_id = ?2",
                params![key.variant.name(), key.id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, saved_at, state)) = row else {
            return Ok(None);
        };
        if !is_valid(version, saved_at, key.variant.version()) {
            return Ok(None);
        }

        conn.execute(
            "DELETE FROM saved_games WHERE game_type = ?1 AND game_id = ?2",
            params![key.variant.name(), key.id],
        )?;
        let game: Game = serde_json::from_str(&state)?;
        Ok(Some(game))
    }

    /// Delete every row that no longer loads or no longer validates.
    /// Returns how many rows were removed.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let conn = self.open()?;
        let doomed: Vec<(String, String)> = {
            let mut stmt = conn.prepare(
                "SELECT game_type, game_id, version, saved_at, state FROM saved_games",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut doomed = Vec::new();
            for row in rows {
                let (game_type, game_id, version, saved_at, state) = row?;
                let keep = match Variant::from_name(&game_type) {
                    Some(variant) => {
                        is_valid(version, saved_at, variant.version())
                            && serde_json::from_str::<Game>(&state).is_ok()
                    }
                    None => false,
                };
                if !keep {
                    doomed.push((game_type, game_id));
                }
            }
            doomed
        };

        for (game_type, game_id) in &doomed {
            conn.execute(
                "DELETE FROM saved_games WHERE game_type = ?1 AND game_id = ?2",
                params![game_type, game_id],
            )?;
        }
        Ok(doomed.len())
    }

    /// Valid saved games, for the `/status` report.
    pub fn list_valid(&self) -> Result<Vec<SavedSummary>, StoreError> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT game_type, game_id, version, saved_at FROM saved_games")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut saved = Vec::new();
        for row in rows {
            let (game_type, game_id, version, saved_at) = row?;
            let valid = Variant::from_name(&game_type)
                .is_some_and(|variant| is_valid(version, saved_at, variant.version()));
            if valid {
                saved.push(SavedSummary {
                    game_type,
                    game_id,
                    saved_at,
                });
            }
        }
        Ok(saved)
    }
}

/// Periodic retention sweep; runs once at startup and then twice a day.
pub async fn sweep_loop(store: Store) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tick.tick().await;
        let swept = store.clone();
        match tokio::task::spawn_blocking(move || swept.sweep()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(removed)) => tracing::info!(removed, "swept stale saved games"),
            Ok(Err(err)) => tracing::warn!(error = %err, "saved-game sweep failed"),
            Err(err) => tracing::error!(error = %err, "sweep task failed"),
        }
    }
}
