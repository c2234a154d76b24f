use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use palaver_domain::chat::{
    build_message_page, Attachment, Message, SendMessageInput, ThreadCreate, ThreadSummary,
};
use palaver_domain::identity::ActorIdentity;
use palaver_domain::notifications::Notification;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::{self, AuthContext};
use crate::observability;
use crate::realtime;
use crate::state::AppState;
use crate::validation::validate;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/threads", post(create_thread).get(list_threads))
        .route(
            "/threads/:thread_id/messages",
            get(list_messages).post(send_message),
        )
        .route("/threads/:thread_id/read", post(mark_thread_read))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route(
            "/notifications/:notification_id/read",
            put(mark_notification_read),
        )
        .route("/notifications/mark-all-read", put(mark_all_notifications_read))
        .route("/notifications/:notification_id", delete(delete_notification))
        .route("/notifications/clear-all", delete(clear_all_notifications))
        .route_layer(axum::middleware::from_fn(
            middleware::require_auth_middleware,
        ));

    // WebSocket upgrades sit outside the auth gate so the handshake can
    // also carry the token as a query parameter.
    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/dm", get(realtime::dm::dm_ws))
        .route(
            "/notifications/ws",
            get(realtime::notifications::notifications_ws),
        );

    let mut app = Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::metrics_layer))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(middleware::trace_layer())
        .layer(middleware::propagate_request_id_layer())
        .layer(middleware::set_request_id_layer())
        .layer(middleware::timeout_layer());

    if state.config.app_env != "test" {
        app = app.layer(middleware::rate_limit_layer());
    }

    app.with_state(state)
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    match (&auth.user_id, auth.is_authenticated) {
        (Some(user_id), true) => Ok(ActorIdentity::with_user_id(user_id.clone())),
        _ => Err(ApiError::Unauthorized),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.app_env,
    }))
}

async fn metrics() -> Result<String, ApiError> {
    observability::render_metrics().ok_or(ApiError::Internal)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateThreadRequest {
    // May be empty: zero or two-plus ids fall through to plain
    // creation, only the exactly-one case participates in 1:1 reuse.
    participant_ids: Vec<String>,
    #[validate(length(max = 200, message = "title exceeds max length"))]
    title: Option<String>,
    #[serde(default)]
    is_group: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadCreatedResponse {
    thread_id: String,
    reused: bool,
}

async fn create_thread(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_identity(&auth)?;
    validate(&payload)?;

    let handle = state
        .messaging
        .create_or_reuse_thread(
            &actor,
            ThreadCreate {
                participant_ids: payload.participant_ids,
                title: payload.title,
                is_group: payload.is_group,
            },
        )
        .await?;

    let status = if handle.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(ThreadCreatedResponse {
            thread_id: handle.thread.thread_id,
            reused: handle.reused,
        }),
    ))
}

#[derive(Serialize)]
struct ThreadListResponse {
    threads: Vec<ThreadSummary>,
}

async fn list_threads(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let threads = state.messaging.list_threads(&actor).await?;
    Ok(Json(ThreadListResponse { threads }))
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    take: Option<usize>,
    before: Option<i64>,
}

#[derive(Serialize)]
struct MessageListResponse {
    messages: Vec<Message>,
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(thread_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let page = build_message_page(query.take, query.before);
    let messages = state.messaging.list_messages(&thread_id, &actor, page).await?;
    Ok(Json(MessageListResponse { messages }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    text: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: Message,
}

async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(thread_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor_identity(&auth)?;
    let message = state
        .messaging
        .send_message(
            &actor,
            SendMessageInput {
                thread_id,
                body: payload.text,
                attachments: payload.attachments,
            },
        )
        .await?;

    // REST sends feed the same rooms the channel does, so connected
    // clients see messages regardless of which surface produced them.
    realtime::dm::broadcast_message(&state.rooms, &message).await;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    last_read_message_id: Option<String>,
}

async fn mark_thread_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(thread_id): Path<String>,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_identity(&auth)?;
    let participant = state
        .messaging
        .mark_read(&actor, &thread_id, payload.last_read_message_id)
        .await?;

    realtime::dm::broadcast_read(&state.rooms, &participant).await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsQuery {
    #[serde(default)]
    unread_only: bool,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct NotificationListResponse {
    notifications: Vec<Notification>,
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let notifications = state
        .notifications
        .list(&actor.user_id, query.unread_only, query.limit)
        .await?;
    Ok(Json(NotificationListResponse { notifications }))
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_identity(&auth)?;
    let count = state.notifications.unread_count(&actor.user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

#[derive(Serialize)]
struct NotificationResponse {
    notification: Notification,
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let notification = state
        .notifications
        .mark_read(&actor.user_id, &notification_id)
        .await?;
    Ok(Json(NotificationResponse { notification }))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_identity(&auth)?;
    let updated = state.notifications.mark_all_read(&actor.user_id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .notifications
        .delete(&actor.user_id, &notification_id)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn clear_all_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_identity(&auth)?;
    let removed = state.notifications.clear_all(&actor.user_id).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
