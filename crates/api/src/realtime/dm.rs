use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use palaver_domain::chat::{Message, Participant, SendMessageInput};
use palaver_domain::error::DomainError;
use palaver_domain::identity::ActorIdentity;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::observability;
use crate::state::AppState;

use super::protocol::{frame, DmClientEvent, DmServerEvent};
use super::rooms::{RoomEvent, RoomKey, RoomRegistry};
use super::{handshake_actor, HandshakeQuery};

const OUTBOUND_BUFFER: usize = 64;

pub async fn dm_ws(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    Extension(auth): Extension<AuthContext>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let actor = handshake_actor(&auth, &query, &state.config.jwt_secret)?;
    observability::register_ws_connection("dm");
    Ok(ws.on_upgrade(move |socket| handle_dm_socket(socket, state, actor)))
}

/// One task per connection. Joined rooms each get a forwarder task that
/// feeds the shared outbound queue; the loop below owns the sink, so
/// frames from any number of rooms serialize onto the socket.
async fn handle_dm_socket(socket: WebSocket, state: AppState, actor: ActorIdentity) {
    let (mut sink, mut incoming) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();
    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(state.config.ws_heartbeat_secs.max(1)));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::debug!(user_id = %actor.user_id, "dm channel connected");

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let Some(text) = outbound else { break };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = incoming.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_dm_event(&state, &actor, &text, &mut joined, &out_tx).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    for handle in joined.into_values() {
        handle.abort();
    }
    tracing::debug!(user_id = %actor.user_id, "dm channel disconnected");
}

pub(crate) async fn handle_dm_event(
    state: &AppState,
    actor: &ActorIdentity,
    text: &str,
    joined: &mut HashMap<String, JoinHandle<()>>,
    out_tx: &mpsc::Sender<String>,
) {
    let event = match serde_json::from_str::<DmClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            observability::register_ws_event("dm", "unknown", "malformed");
            send_error(out_tx, format!("malformed event: {err}")).await;
            return;
        }
    };

    match event {
        DmClientEvent::Join { thread_id } => {
            if joined.contains_key(&thread_id) {
                observability::register_ws_event("dm", "join", "noop");
                return;
            }
            match state.messaging.is_member(&thread_id, &actor.user_id).await {
                Ok(true) => {
                    let receiver = state
                        .rooms
                        .subscribe(&RoomKey::Thread(thread_id.clone()))
                        .await;
                    let handle =
                        spawn_room_forwarder(receiver, out_tx.clone(), actor.user_id.clone());
                    joined.insert(thread_id, handle);
                    observability::register_ws_event("dm", "join", "ok");
                }
                // A deny gets no reply so the channel never reveals
                // whether the thread exists.
                Ok(false) => {
                    tracing::debug!(user_id = %actor.user_id, thread_id, "join denied");
                    observability::register_ws_event("dm", "join", "denied");
                }
                Err(err) => {
                    tracing::warn!(error = %err, thread_id, "membership lookup failed");
                    observability::register_ws_event("dm", "join", "error");
                }
            }
        }
        DmClientEvent::Leave { thread_id } => {
            if let Some(handle) = joined.remove(&thread_id) {
                handle.abort();
                observability::register_ws_event("dm", "leave", "ok");
            } else {
                observability::register_ws_event("dm", "leave", "noop");
            }
        }
        DmClientEvent::Typing { thread_id, typing } => {
            // Only relayed for rooms this connection has joined, which
            // doubles as the membership check.
            if !joined.contains_key(&thread_id) {
                observability::register_ws_event("dm", "typing", "denied");
                return;
            }
            broadcast_typing(&state.rooms, &thread_id, &actor.user_id, typing).await;
            observability::register_ws_event("dm", "typing", "ok");
        }
        DmClientEvent::Send {
            thread_id,
            text,
            attachments,
        } => {
            let input = SendMessageInput {
                thread_id,
                body: text,
                attachments,
            };
            match state.messaging.send_message(actor, input).await {
                Ok(message) => {
                    broadcast_message(&state.rooms, &message).await;
                    observability::register_ws_event("dm", "send", "ok");
                }
                Err(DomainError::Forbidden(_)) => {
                    observability::register_ws_event("dm", "send", "denied");
                }
                Err(DomainError::Validation(message)) => {
                    observability::register_ws_event("dm", "send", "invalid");
                    send_error(out_tx, message).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "send failed");
                    observability::register_ws_event("dm", "send", "error");
                    send_error(out_tx, "message could not be delivered".to_string()).await;
                }
            }
        }
        DmClientEvent::Read {
            thread_id,
            last_read_message_id,
        } => {
            match state
                .messaging
                .mark_read(actor, &thread_id, last_read_message_id)
                .await
            {
                Ok(participant) => {
                    broadcast_read(&state.rooms, &participant).await;
                    observability::register_ws_event("dm", "read", "ok");
                }
                Err(DomainError::Forbidden(_)) => {
                    observability::register_ws_event("dm", "read", "denied");
                }
                Err(DomainError::Validation(message)) => {
                    observability::register_ws_event("dm", "read", "invalid");
                    send_error(out_tx, message).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "read receipt failed");
                    observability::register_ws_event("dm", "read", "error");
                }
            }
        }
    }
}

/// Copies room frames into a connection's outbound queue, dropping
/// frames addressed away from this user. Ends when the room sender or
/// the connection goes away.
fn spawn_room_forwarder(
    mut receiver: broadcast::Receiver<RoomEvent>,
    out_tx: mpsc::Sender<String>,
    user_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.skip_user.as_deref() == Some(user_id.as_str()) {
                        continue;
                    }
                    if out_tx.send(event.frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, user_id, "room forwarder lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_error(out_tx: &mpsc::Sender<String>, message: String) {
    let _ = out_tx
        .send(frame(&DmServerEvent::Error { message }))
        .await;
}

/// New messages reach every member in the room, sender included, so
/// every open client renders from the same stream.
pub async fn broadcast_message(rooms: &RoomRegistry, message: &Message) {
    let key = RoomKey::Thread(message.thread_id.clone());
    let event = RoomEvent {
        event: "message",
        frame: frame(&DmServerEvent::Message {
            message: message.clone(),
        }),
        skip_user: None,
    };
    rooms.publish(&key, event).await;
}

pub async fn broadcast_read(rooms: &RoomRegistry, participant: &Participant) {
    let key = RoomKey::Thread(participant.thread_id.clone());
    let event = RoomEvent {
        event: "read",
        frame: frame(&DmServerEvent::Read {
            thread_id: participant.thread_id.clone(),
            user_id: participant.user_id.clone(),
            last_read_message_id: participant.last_read_message_id.clone(),
            last_read_at_ms: participant.last_read_at_ms.unwrap_or_default(),
        }),
        skip_user: Some(participant.user_id.clone()),
    };
    rooms.publish(&key, event).await;
}

pub async fn broadcast_typing(rooms: &RoomRegistry, thread_id: &str, user_id: &str, typing: bool) {
    let key = RoomKey::Thread(thread_id.to_string());
    let event = RoomEvent {
        event: "typing",
        frame: frame(&DmServerEvent::Typing {
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            typing,
        }),
        skip_user: Some(user_id.to_string()),
    };
    rooms.publish(&key, event).await;
}
