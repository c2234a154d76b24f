use std::sync::Arc;

use palaver_domain::DomainResult;
use palaver_domain::notifications::Notification;
use palaver_domain::ports::BoxFuture;
use palaver_domain::ports::realtime::NotificationPusher;

use super::protocol::{NotificationServerEvent, frame};
use super::rooms::{RoomEvent, RoomKey, RoomRegistry};

/// Bridges the fan-out service onto the room registry: pushes land in
/// the recipient's personal room, reaching every connected device.
pub struct RoomPusher {
    rooms: Arc<RoomRegistry>,
}

impl RoomPusher {
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self { rooms }
    }
}

impl NotificationPusher for RoomPusher {
    fn push_new(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let key = RoomKey::User(user_id.to_string());
        let event = RoomEvent {
            event: "new_notification",
            frame: frame(&NotificationServerEvent::NewNotification {
                notification: notification.clone(),
            }),
            skip_user: None,
        };
        Box::pin(async move {
            self.rooms.publish(&key, event).await;
            Ok(())
        })
    }

    fn push_unread_count(&self, user_id: &str, count: u64) -> BoxFuture<'_, DomainResult<()>> {
        let key = RoomKey::User(user_id.to_string());
        let event = RoomEvent {
            event: "unread_count",
            frame: frame(&NotificationServerEvent::UnreadCount { count }),
            skip_user: None,
        };
        Box::pin(async move {
            self.rooms.publish(&key, event).await;
            Ok(())
        })
    }
}
