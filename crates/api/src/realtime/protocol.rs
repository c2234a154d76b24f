use palaver_domain::chat::{Attachment, Message};
use palaver_domain::notifications::Notification;
use serde::{Deserialize, Serialize};

/// Client-initiated events on the direct-message channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DmClientEvent {
    Join {
        thread_id: String,
    },
    Leave {
        thread_id: String,
    },
    Typing {
        thread_id: String,
        typing: bool,
    },
    Send {
        thread_id: String,
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    Read {
        thread_id: String,
        #[serde(default)]
        last_read_message_id: Option<String>,
    },
}

/// Server-pushed events on the direct-message channel. Event names and
/// payload shapes are wire contract, not implementation detail.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DmServerEvent {
    Message {
        message: Message,
    },
    Typing {
        thread_id: String,
        user_id: String,
        typing: bool,
    },
    Read {
        thread_id: String,
        user_id: String,
        last_read_message_id: Option<String>,
        last_read_at_ms: i64,
    },
    Error {
        message: String,
    },
}

/// Client-initiated events on the notification channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NotificationClientEvent {
    GetUnreadCount,
    MarkRead { notification_id: String },
    MarkAllRead,
    GetRecent {
        #[serde(default)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NotificationServerEvent {
    NewNotification { notification: Notification },
    UnreadCount { count: u64 },
    RecentNotifications { notifications: Vec<Notification> },
    Error { message: String },
}

pub fn frame<T: Serialize>(event: &T) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"event":"error","message":"failed to serialize event"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_wire_shapes() {
        let join: DmClientEvent =
            serde_json::from_str(r#"{"event":"join","threadId":"t1"}"#).expect("join");
        assert!(matches!(join, DmClientEvent::Join { thread_id } if thread_id == "t1"));

        let send: DmClientEvent = serde_json::from_str(
            r#"{"event":"send","threadId":"t1","text":"hi","attachments":[{"name":"a.png","url":"https://cdn/a.png","mimeType":"image/png"}]}"#,
        )
        .expect("send");
        match send {
            DmClientEvent::Send { attachments, .. } => {
                assert_eq!(attachments[0].mime_type.as_deref(), Some("image/png"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let read: DmClientEvent =
            serde_json::from_str(r#"{"event":"read","threadId":"t1"}"#).expect("read");
        assert!(matches!(
            read,
            DmClientEvent::Read {
                last_read_message_id: None,
                ..
            }
        ));

        let count: NotificationClientEvent =
            serde_json::from_str(r#"{"event":"get_unread_count"}"#).expect("count");
        assert!(matches!(count, NotificationClientEvent::GetUnreadCount));
    }

    #[test]
    fn server_events_serialize_with_snake_case_names() {
        let frame = frame(&NotificationServerEvent::UnreadCount { count: 3 });
        let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["event"], "unread_count");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn unknown_client_event_is_rejected() {
        let result = serde_json::from_str::<DmClientEvent>(r#"{"event":"steal","threadId":"t1"}"#);
        assert!(result.is_err());
    }
}
