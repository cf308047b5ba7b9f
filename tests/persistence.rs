//! Suspend/resume round-trips through the registry and the durable store.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::caller;
use tavola::game::{GameStatus, SessionToken, Variant};
use tavola::registry::{GameKey, GameRegistry};
use tavola::store::Store;
use tokio::sync::mpsc;

fn game_key(id: &str) -> GameKey {
    GameKey {
        variant: Variant::Briscola,
        id: id.to_owned(),
    }
}

fn fixture_store(dir: &tempfile::TempDir) -> Store {
    let store = Store::new(dir.path().join("games.db"));
    store.init().expect("store init");
    store
}

fn saved_rows(path: &Path) -> i64 {
    let conn = rusqlite::Connection::open(path).expect("open db");
    conn.query_row("SELECT COUNT(*) FROM saved_games", [], |row| row.get(0))
        .expect("count")
}

/// Seat two players and play one card, leaving a STARTED game behind.
async fn start_game(registry: &GameRegistry, key: &GameKey) -> Arc<tavola::registry::GameHandle> {
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let handle = registry.attach(key.clone(), 1, tx1).await;
    let (tx2, _rx2) = mpsc::unbounded_channel();
    let again = registry.attach(key.clone(), 2, tx2).await;
    assert!(Arc::ptr_eq(&handle, &again));

    {
        let mut game = handle.game.lock();
        game.handle_frame(1, &SessionToken("anna".into()), "join|Anna")
            .expect("join");
        game.handle_frame(2, &SessionToken("bruno".into()), "join|Bruno")
            .expect("join");
        assert_eq!(game.core.status, GameStatus::Started);

        let seat = game.core.current;
        let (conn, token) = caller(&game, seat);
        let card = game.core.players[seat].hand[0];
        game.handle_frame(conn, &token, &format!("play|{card}"))
            .expect("play");
    }
    handle
}

#[tokio::test]
async fn suspending_and_resuming_reproduces_the_same_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = fixture_store(&dir);
    let registry = GameRegistry::new(store.clone());
    let key = game_key("attico");

    let handle = start_game(&registry, &key).await;
    let before = serde_json::to_value(&*handle.game.lock()).expect("snapshot");

    registry.detach(&handle, 1).await;
    assert_eq!(saved_rows(&dir.path().join("games.db")), 0);
    registry.detach(&handle, 2).await;
    assert_eq!(saved_rows(&dir.path().join("games.db")), 1);

    let (tx, _rx) = mpsc::unbounded_channel();
    let resumed = registry.attach(key, 3, tx).await;
    let after = serde_json::to_value(&*resumed.game.lock()).expect("snapshot");
    assert_eq!(before, after);

    // the row is consumed on resume
    assert_eq!(saved_rows(&dir.path().join("games.db")), 0);
}

#[tokio::test]
async fn a_game_that_never_started_is_not_saved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = fixture_store(&dir);
    let registry = GameRegistry::new(store);
    let key = game_key("vuoto");

    let (tx, _rx) = mpsc::unbounded_channel();
    let handle = registry.attach(key.clone(), 1, tx).await;
    handle
        .game
        .lock()
        .handle_frame(1, &SessionToken("anna".into()), "join|Anna")
        .expect("join");
    registry.detach(&handle, 1).await;

    assert_eq!(saved_rows(&dir.path().join("games.db")), 0);
    let (tx, _rx) = mpsc::unbounded_channel();
    let fresh = registry.attach(key, 2, tx).await;
    assert!(fresh.game.lock().core.players.is_empty());
}

#[tokio::test]
async fn expired_rows_resume_fresh_and_are_swept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("games.db");
    let store = fixture_store(&dir);
    let registry = GameRegistry::new(store.clone());
    let key = game_key("scaduto");

    let handle = start_game(&registry, &key).await;
    registry.detach(&handle, 1).await;
    registry.detach(&handle, 2).await;

    // age the row past the seven-day window
    let conn = rusqlite::Connection::open(&db).expect("open db");
    conn.execute(
        "UPDATE saved_games SET saved_at = saved_at - 8 * 24 * 60 * 60",
        [],
    )
    .expect("age row");

    let (tx, _rx) = mpsc::unbounded_channel();
    let fresh = registry.attach(key, 3, tx).await;
    assert!(fresh.game.lock().core.players.is_empty());

    // the invalid row stays behind until the sweep deletes it
    assert_eq!(saved_rows(&db), 1);
    assert_eq!(store.sweep().expect("sweep"), 1);
    assert_eq!(saved_rows(&db), 0);
}

#[tokio::test]
async fn version_mismatches_resume_fresh_and_are_swept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("games.db");
    let store = fixture_store(&dir);
    let registry = GameRegistry::new(store.clone());
    let key = game_key("superato");

    let handle = start_game(&registry, &key).await;
    registry.detach(&handle, 1).await;
    registry.detach(&handle, 2).await;

    let conn = rusqlite::Connection::open(&db).expect("open db");
    conn.execute("UPDATE saved_games SET version = 99", [])
        .expect("bump version");

    let (tx, _rx) = mpsc::unbounded_channel();
    let fresh = registry.attach(key, 3, tx).await;
    assert!(fresh.game.lock().core.players.is_empty());
    assert_eq!(store.sweep().expect("sweep"), 1);
    assert_eq!(saved_rows(&db), 0);
}

#[tokio::test]
async fn corrupt_rows_are_discarded_on_resume() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("games.db");
    let store = fixture_store(&dir);
    let registry = GameRegistry::new(store);
    let key = game_key("rotto");

    let handle = start_game(&registry, &key).await;
    registry.detach(&handle, 1).await;
    registry.detach(&handle, 2).await;

    let conn = rusqlite::Connection::open(&db).expect("open db");
    conn.execute("UPDATE saved_games SET state = '{broken'", [])
        .expect("corrupt row");

    let (tx, _rx) = mpsc::unbounded_channel();
    let fresh = registry.attach(key, 3, tx).await;
    assert!(fresh.game.lock().core.players.is_empty());
    assert_eq!(saved_rows(&db), 0);
}
