use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientEvent, ServerEvent},
    services::lobby_service,
    state::{SharedState, connections::ConnectionId},
};

/// Handle the full lifecycle of one lobby WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(event) = events_rx.recv() => match encode(&event) {
                    Some(message) => message,
                    None => continue,
                },
                Some(control) = control_rx.recv() => control,
                else => break,
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state.connections().register(connection_id, events_tx);
    info!(%connection_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_text_frame(&state, connection_id, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "client closed the connection");
                let _ = control_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(%connection_id, "ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    lobby_service::handle_disconnect(&state, connection_id).await;
    info!(%connection_id, "client disconnected");

    finalize(writer_task, control_tx).await;
}

/// Parse one text frame and apply it; malformed frames are answered with `error`.
pub async fn handle_text_frame(state: &SharedState, connection_id: ConnectionId, text: &str) {
    debug!(%connection_id, payload = %text, "received client frame");

    match ClientEvent::from_json_str(text) {
        Ok(event) => lobby_service::handle_event(state, connection_id, event).await,
        Err(err) => {
            warn!(%connection_id, error = %err, "failed to parse or validate client event");
            state
                .connections()
                .send(connection_id, ServerEvent::error(err.to_string()));
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(event = event.name(), error = %err, "failed to serialize outbound event");
            None
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
///
/// The event queue closes once the connection is deregistered, the control
/// queue once `control_tx` is dropped here.
async fn finalize(writer_task: JoinHandle<()>, control_tx: mpsc::UnboundedSender<Message>) {
    drop(control_tx);
    let _ = writer_task.await;
}
