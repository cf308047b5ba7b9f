//! The WebSocket endpoint: session identity, the per-connection read and
//! write loops, liveness, and the error path that keeps a client's view in
//! sync after any rejected command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::error::{CommandFailure, GameError};
use crate::game::{ConnId, SessionToken, Variant};
use crate::http::AppState;
use crate::protocol::Frame;
use crate::registry::{GameHandle, GameKey, GameRegistry};

const PING_INTERVAL: Duration = Duration::from_secs(15);
/// A connection that stays silent this long (not even a pong) is treated as
/// closed and funnels into the ordinary detach path.
const IDLE_TIMEOUT: Duration = Duration::from_secs(45);

const SESSION_COOKIE: &str = "session_id";
const SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub async fn ws_handler(
    State(state): State<AppState>,
    Path((game_type, game_id)): Path<(String, String)>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(variant) = Variant::from_name(&game_type) else {
        return (StatusCode::BAD_REQUEST, "unknown game type").into_response();
    };

    let token = cookie_token(&headers).unwrap_or_else(mint_token);
    let key = GameKey {
        variant,
        id: game_id,
    };
    let registry = state.registry.clone();
    let session = SessionToken(token.clone());
    let mut response = ws.on_upgrade(move |socket| serve(registry, key, session, socket));

    let cookie = format!(
        "{SESSION_COOKIE}={token}; Max-Age={SESSION_MAX_AGE_SECS}; SameSite=Lax; Path=/"
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_owned())
    })
}

fn mint_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

async fn serve(
    registry: Arc<GameRegistry>,
    key: GameKey,
    token: SessionToken,
    socket: WebSocket,
) {
    let conn: ConnId = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let (outbox, inbox) = mpsc::unbounded_channel();
    let handle = registry.attach(key, conn, outbox).await;

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, inbox));
    read_loop(&handle, conn, &token, stream).await;

    // detaching drops the outbox, which ends the writer
    registry.detach(&handle, conn).await;
    let _ = writer.await;
    tracing::debug!(conn, "connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut inbox: mpsc::UnboundedReceiver<Message>,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            queued = inbox.recv() => match queued {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_loop(
    handle: &Arc<GameHandle>,
    conn: ConnId,
    token: &SessionToken,
    mut stream: SplitStream<WebSocket>,
) {
    loop {
        let message = match tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await {
            Err(_) => {
                tracing::debug!(conn, "liveness window elapsed");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let failure = handle.game.lock().handle_frame(conn, token, &text).err();
                if let Some(failure) = failure {
                    report_failure(handle, conn, token, &failure);
                }
            }
            Message::Binary(_) => {
                report_failure(
                    handle,
                    conn,
                    token,
                    &CommandFailure::untagged(GameError::NotText),
                );
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// A rejected command must never leave the client stale: replay the full
/// state first, then report the error.
fn report_failure(
    handle: &Arc<GameHandle>,
    conn: ConnId,
    token: &SessionToken,
    failure: &CommandFailure,
) {
    let mut game = handle.game.lock();
    let _ = game.handle_frame(conn, token, "current_state");

    let mut frame = Frame::event("error").arg(&failure.error);
    if let Some(command) = &failure.command {
        frame = frame.arg(command);
    }
    game.core.send_conn(conn, frame);
}
