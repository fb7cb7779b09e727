//! WebSocket connection supervisor.
//!
//! Accepts channels, enforces the connection cap and idle timeout, runs
//! per-connection reader/writer tasks, and dispatches CPU-bound audio
//! ingestion to blocking workers. All outbound frames for a channel go
//! through its single writer task, which keeps events totally ordered.

mod registry;

pub use registry::{close_entry, ConnectionEntry, ConnectionRegistry};

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::Frame;
use crate::session::{Session, SessionOutput};
use crate::state::AppState;

/// Buffer size of the per-connection writer channel.
const WRITER_BUFFER: usize = 256;

/// Commands consumed by a connection's writer task.
#[derive(Debug)]
pub enum WriterCommand {
    Frame(Frame),
    Close { reason: String },
}

/// Build the WebSocket router. Non-WebSocket requests to `/ws` are
/// rejected with 400 by the upgrade extractor.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("websocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_BUFFER);
    let writer_task = tokio::spawn(async move {
        while let Some(command) = writer_rx.recv().await {
            match command {
                WriterCommand::Frame(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("failed to serialize outbound frame: {e}");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                WriterCommand::Close { reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let session = Arc::new(Mutex::new(Session::new(
        state.config.clone(),
        state.toolkit.clone(),
        state.speaker.clone(),
        state.punctuator.clone(),
    )));

    // The cap is enforced before any session work happens; over-limit
    // sockets are closed right after the upgrade.
    let Some(conn_id) = state
        .registry
        .try_register(session.clone(), writer_tx.clone())
    else {
        let _ = writer_tx
            .send(WriterCommand::Close {
                reason: "Too many connections".to_string(),
            })
            .await;
        let _ = writer_task.await;
        return;
    };

    info!(conn_id, "websocket connection established");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(conn_id, "websocket error: {e}");
                break;
            }
        };

        state.registry.touch(conn_id);

        let keep_going = match message {
            Message::Text(text) => {
                // Protocol commands are handled inline on the channel task.
                let outputs = session.lock().on_text(text.as_str());
                dispatch(&writer_tx, outputs).await
            }
            Message::Binary(data) => {
                if data.is_empty() {
                    continue;
                }
                // Audio decoding is CPU-bound: run it on a blocking
                // worker, bounded by the configured pool size. Awaiting
                // the result keeps frames for this channel in submission
                // order.
                let permit = state.workers.clone().acquire_owned().await.ok();
                let session = session.clone();
                let outputs = tokio::task::spawn_blocking(move || {
                    let outputs = session.lock().on_binary(&data);
                    drop(permit);
                    outputs
                })
                .await
                .unwrap_or_else(|e| {
                    // A failure in one worker task never poisons the
                    // pool; the client sees a generic Failed event.
                    error!(conn_id, "audio worker failed: {e}");
                    vec![SessionOutput::Frame(Frame::failed(
                        crate::protocol::ErrorCode::MessageProcessing,
                        "Error processing audio data",
                    ))]
                });
                dispatch(&writer_tx, outputs).await
            }
            Message::Close(_) => {
                info!(conn_id, "connection closed by client");
                false
            }
            // Ping/Pong are answered by axum.
            Message::Ping(_) | Message::Pong(_) => true,
        };

        if !keep_going {
            break;
        }
    }

    // Best-effort terminal events if the session is still open.
    if state.registry.remove(conn_id).is_some() {
        let outputs = session.lock().close();
        dispatch(&writer_tx, outputs).await;
    }
    drop(writer_tx);
    let _ = writer_task.await;

    info!(conn_id, "websocket connection terminated");
}

/// Forward session outputs to the writer task. Returns false once the
/// session requested the channel be closed.
async fn dispatch(writer: &mpsc::Sender<WriterCommand>, outputs: Vec<SessionOutput>) -> bool {
    for output in outputs {
        let command = match output {
            SessionOutput::Frame(frame) => WriterCommand::Frame(frame),
            SessionOutput::Close { reason } => {
                let _ = writer
                    .send(WriterCommand::Close {
                        reason: reason.to_string(),
                    })
                    .await;
                return false;
            }
        };
        if writer.send(command).await.is_err() {
            return false;
        }
    }
    true
}

/// Close every live connection with terminal events (shutdown path).
pub async fn shutdown(registry: &ConnectionRegistry) {
    let connections = registry.drain();
    if connections.is_empty() {
        return;
    }
    info!(count = connections.len(), "closing live connections");
    for (_, entry) in connections {
        close_entry(&entry, "Server shutdown").await;
    }
}
