use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::ConnectionSender;

/// Keepalive timings for a party connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// Time between server pings.
    pub ping_interval: Duration,
    /// How long a ping may go unanswered before the connection is dropped.
    pub pong_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Run the actor-per-connection pattern for an admitted party connection.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from the connection's channel
/// - Reader loop: feeds incoming text frames to the session handler
///
/// The connection was already admitted and greeted before the upgrade;
/// `rx` may hold frames queued in the meantime.
///
/// A close the server starts (pong timeout, `room_full`) ends the reader
/// loop as soon as the close frame is written, without waiting for the
/// client to answer it.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    connection_id: String,
    rx: mpsc::UnboundedReceiver<Message>,
    tx: ConnectionSender,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let keepalive = state.keepalive;
    let shutdown = Arc::new(Notify::new());

    tracing::debug!(connection_id = %connection_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, shutdown.clone()));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_shutdown = shutdown.clone();
    let ping_id = connection_id.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(keepalive.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, so the connection is gone
                break;
            }

            match timeout(keepalive.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(connection_id = %ping_id, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    // A half-open peer may never let the close frame out.
                    ping_shutdown.notify_one();
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let next = tokio::select! {
            _ = shutdown.notified() => {
                tracing::debug!(connection_id = %connection_id, "Server closed connection");
                break;
            }
            next = ws_receiver.next() => next,
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    state.sessions.handle_text(&connection_id, text.as_str());
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::debug!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    state.sessions.disconnect(&connection_id);

    tracing::debug!(connection_id = %connection_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
/// Signals `shutdown` once a close frame is out or the sink fails.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shutdown: Arc<Notify>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, so the connection is broken
            break;
        }
        if closing {
            break;
        }
    }
    shutdown.notify_one();
}
