//! WebSocket connection handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use futures_util::{
    sink::{Sink, SinkExt},
    stream::StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::UserId,
    ui::{gateway::Session, state::AppState},
};

/// How long queued frames may take to flush after the session ends
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    // Reject before upgrading so unauthenticated clients never get a session
    let token = bearer_token(&headers)
        .or(query.token)
        .unwrap_or_default();
    let user_id = match state.gateway.authenticate(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("Rejected WebSocket connection: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

/// Token from `Authorization: Bearer <token>` (the scheme is optional)
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
        _ => value,
    }
    .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Spawns a task that drains the connection's outbound queue into the WebSocket sink.
///
/// The same task sends a ping every `ping_interval`. When the queue is closed
/// (every sender dropped) the remaining frames are flushed and a close frame is sent.
fn pusher_loop<S>(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: S,
    ping_interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    if sender.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for the pusher loop to flush what is queued and send the close frame.
///
/// The connection must already be detached so that the queue is closed.
async fn drain_outbound(mut send_task: tokio::task::JoinHandle<()>, session: &Session) {
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        tracing::warn!(
            "Connection {} did not drain within {:?}, dropping queued frames",
            session.connection_id,
            DRAIN_TIMEOUT
        );
        send_task.abort();
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let session = Session::new(user_id);
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    if let Err(e) = state.gateway.register(&session, tx.clone()).await {
        tracing::error!(
            "Failed to register connection {} for user {}: {}",
            session.connection_id,
            user_id,
            e
        );
        return;
    }
    tracing::info!(
        "User {} connected as {}",
        user_id,
        session.connection_id
    );

    let mut send_task = pusher_loop(rx, sender, state.settings.ping_interval);

    // Abandon the room lookup if the socket dies while it is in flight
    let joined = tokio::select! {
        joined = state.gateway.join_rooms(&session) => joined,
        _ = &mut send_task => {
            tracing::info!("Connection {} closed during auto-join", session.connection_id);
            state.gateway.close_session(&session).await;
            return;
        }
    };
    if let Err(error_frame) = joined {
        let _ = tx.send(error_frame);
        drop(tx);
        // Detaching drops the pusher's sender, so the queue drains and closes
        state.gateway.close_session(&session).await;
        drain_outbound(send_task, &session).await;
        return;
    }

    let gateway = state.gateway.clone();
    let idle_timeout = state.settings.ping_timeout;
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::warn!("WebSocket error on {}: {}", session.connection_id, e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::info!(
                        "Connection {} sent nothing for {:?}, closing",
                        session.connection_id,
                        idle_timeout
                    );
                    break;
                }
            };

            let reply = match msg {
                Message::Text(text) => gateway.handle_text(&session, text.as_str()).await,
                Message::Binary(_) => gateway.unsupported_frame(),
                Message::Ping(_) | Message::Pong(_) => {
                    // Ping replies are sent by axum; both count as liveness
                    continue;
                }
                Message::Close(_) => {
                    tracing::info!("Connection {} requested close", session.connection_id);
                    break;
                }
            };
            if tx.send(reply).is_err() {
                break;
            }
        }
    });

    // A dead sink stops the receiver; a finished receiver lets queued replies drain
    let sink_closed = tokio::select! {
        _ = &mut recv_task => false,
        _ = &mut send_task => {
            recv_task.abort();
            true
        }
    };

    state.gateway.close_session(&session).await;
    if !sink_closed {
        drain_outbound(send_task, &session).await;
    }
    tracing::info!(
        "User {} disconnected ({})",
        user_id,
        session.connection_id
    );
}
