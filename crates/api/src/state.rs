use std::sync::Arc;

use palaver_domain::chat::MessagingService;
use palaver_domain::notifications::NotificationService;
use palaver_infra::config::AppConfig;
use palaver_infra::repositories::{InMemoryChatRepository, InMemoryNotificationRepository};

use crate::realtime::pusher::RoomPusher;
use crate::realtime::rooms::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub rooms: Arc<RoomRegistry>,
    pub messaging: MessagingService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let rooms = Arc::new(RoomRegistry::new(config.realtime_room_buffer));
        let messaging = MessagingService::new(Arc::new(InMemoryChatRepository::new()));
        let notifications = NotificationService::new(
            Arc::new(InMemoryNotificationRepository::new()),
            Arc::new(RoomPusher::new(rooms.clone())),
        );
        Self {
            config,
            rooms,
            messaging,
            notifications,
        }
    }
}
