use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use palaver_domain::error::DomainError;
use palaver_domain::identity::ActorIdentity;
use palaver_domain::notifications::clamp_recent_limit;
use tokio::sync::broadcast;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::observability;
use crate::state::AppState;

use super::protocol::{frame, NotificationClientEvent, NotificationServerEvent};
use super::rooms::RoomKey;
use super::{handshake_actor, HandshakeQuery};

pub async fn notifications_ws(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    Extension(auth): Extension<AuthContext>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let actor = handshake_actor(&auth, &query, &state.config.jwt_secret)?;
    observability::register_ws_connection("notifications");
    Ok(ws.on_upgrade(move |socket| handle_notification_socket(socket, state, actor)))
}

/// The notification channel has exactly one room per connection, the
/// user's own, subscribed implicitly at connect. Every device a user
/// keeps open holds its own subscription to the same room.
async fn handle_notification_socket(socket: WebSocket, state: AppState, actor: ActorIdentity) {
    let (mut sink, mut incoming) = socket.split();
    let mut room = state
        .rooms
        .subscribe(&RoomKey::User(actor.user_id.clone()))
        .await;
    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(state.config.ws_heartbeat_secs.max(1)));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::debug!(user_id = %actor.user_id, "notification channel connected");

    loop {
        tokio::select! {
            pushed = room.recv() => {
                match pushed {
                    Ok(event) => {
                        if sink.send(WsMessage::Text(event.frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, user_id = %actor.user_id, "notification stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = incoming.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_notification_event(&state, &actor, &text).await;
                        if let Some(reply) = reply {
                            if sink.send(WsMessage::Text(reply)).await.is_err() {
                                break;
                            }
                        }
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

    tracing::debug!(user_id = %actor.user_id, "notification channel disconnected");
}

/// Handles one client event and returns the direct reply frame, if
/// any. Mutations reply over the room broadcast instead, so sibling
/// devices converge on the same count.
async fn handle_notification_event(
    state: &AppState,
    actor: &ActorIdentity,
    text: &str,
) -> Option<String> {
    let event = match serde_json::from_str::<NotificationClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            observability::register_ws_event("notifications", "unknown", "malformed");
            return Some(error_frame(format!("malformed event: {err}")));
        }
    };

    match event {
        NotificationClientEvent::GetUnreadCount => {
            match state.notifications.unread_count(&actor.user_id).await {
                Ok(count) => {
                    observability::register_ws_event("notifications", "get_unread_count", "ok");
                    Some(frame(&NotificationServerEvent::UnreadCount { count }))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unread count lookup failed");
                    observability::register_ws_event("notifications", "get_unread_count", "error");
                    Some(error_frame("unread count unavailable".to_string()))
                }
            }
        }
        NotificationClientEvent::MarkRead { notification_id } => {
            match state
                .notifications
                .mark_read(&actor.user_id, &notification_id)
                .await
            {
                Ok(_) => {
                    observability::register_ws_event("notifications", "mark_read", "ok");
                    None
                }
                Err(DomainError::NotFound) => {
                    observability::register_ws_event("notifications", "mark_read", "not_found");
                    Some(error_frame("notification not found".to_string()))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "mark read failed");
                    observability::register_ws_event("notifications", "mark_read", "error");
                    Some(error_frame("notification could not be updated".to_string()))
                }
            }
        }
        NotificationClientEvent::MarkAllRead => {
            match state.notifications.mark_all_read(&actor.user_id).await {
                Ok(_) => {
                    observability::register_ws_event("notifications", "mark_all_read", "ok");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "mark all read failed");
                    observability::register_ws_event("notifications", "mark_all_read", "error");
                    Some(error_frame("notifications could not be updated".to_string()))
                }
            }
        }
        NotificationClientEvent::GetRecent { limit } => {
            let limit = clamp_recent_limit(limit);
            match state
                .notifications
                .list(&actor.user_id, false, Some(limit))
                .await
            {
                Ok(notifications) => {
                    observability::register_ws_event("notifications", "get_recent", "ok");
                    Some(frame(&NotificationServerEvent::RecentNotifications {
                        notifications,
                    }))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "recent notifications lookup failed");
                    observability::register_ws_event("notifications", "get_recent", "error");
                    Some(error_frame("recent notifications unavailable".to_string()))
                }
            }
        }
    }
}

fn error_frame(message: String) -> String {
    frame(&NotificationServerEvent::Error { message })
}
