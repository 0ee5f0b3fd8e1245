use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::dispatch;
use crate::notify::{ConnectionId, Event};
use crate::state::AppState;

/// Client-to-server socket messages, mirroring the event names the driver
/// and rider apps emit.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientMessage {
    DriverOnline { driver_id: Uuid },
    UserConnect { user_id: Uuid },
    AcceptBooking { booking_id: Uuid, driver_id: Uuid },
    RejectBooking { booking_id: Uuid, driver_id: Uuid },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.notifier.subscribe();

    info!(connection_id = %connection_id, "socket connected");

    // Forward bus envelopes addressed to this connection (or to everyone).
    let mut send_task = tokio::spawn(async move {
        loop {
            let envelope = match rx.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, skipped, "socket fell behind the event bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if !envelope.is_for(connection_id) {
                continue;
            }

            let json = match serde_json::to_string(&envelope.event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for socket");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                handle_client_message(&recv_state, connection_id, &text).await;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Dropping the bindings removes this driver from dispatch candidacy.
    state.notifier.unbind(connection_id);
    info!(connection_id = %connection_id, "socket disconnected");
}

async fn handle_client_message(state: &Arc<AppState>, connection_id: ConnectionId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(connection_id = %connection_id, error = %err, "unparseable socket message");
            return;
        }
    };

    match message {
        ClientMessage::DriverOnline { driver_id } => {
            state.notifier.bind_driver(driver_id, connection_id);
            match state.drivers.mark_online(driver_id) {
                Ok(driver) => {
                    state.notifier.broadcast(Event::DriverStatusUpdate {
                        driver_id: driver.id,
                        status: driver.status,
                        is_available: driver.is_available,
                    });
                    info!(driver_id = %driver_id, "driver online");
                }
                Err(err) => {
                    warn!(driver_id = %driver_id, error = %err, "driver_online for unknown driver");
                    state.notifier.unbind(connection_id);
                }
            }
        }
        ClientMessage::UserConnect { user_id } => {
            state.notifier.bind_user(user_id, connection_id);
            info!(user_id = %user_id, "user connected");
        }
        ClientMessage::AcceptBooking {
            booking_id,
            driver_id,
        } => {
            let result = dispatch::accept(state, booking_id, driver_id).await;
            acknowledge(state, connection_id, booking_id, "accept_booking", result.err());
        }
        ClientMessage::RejectBooking {
            booking_id,
            driver_id,
        } => {
            let result = dispatch::reject(state, booking_id, driver_id).await;
            acknowledge(state, connection_id, booking_id, "reject_booking", result.err());
        }
    }
}

/// Directed ack so the driver client learns whether its accept/reject
/// applied; failures are also logged server-side.
fn acknowledge(
    state: &AppState,
    connection_id: ConnectionId,
    booking_id: Uuid,
    action: &'static str,
    error: Option<crate::error::AppError>,
) {
    if let Some(err) = &error {
        warn!(booking_id = %booking_id, action, error = %err, "socket action failed");
    }

    state.notifier.send_to_connection(
        connection_id,
        Event::ActionAck {
            booking_id,
            action,
            ok: error.is_none(),
            error: error.map(|err| err.to_string()),
        },
    );
}
