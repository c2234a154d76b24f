use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::notifications::NotificationRepository;
use crate::ports::realtime::NotificationPusher;
use crate::util::{now_ms, uuid_v7_without_dashes};

const MAX_TITLE_LENGTH: usize = 200;
const MAX_MESSAGE_LENGTH: usize = 2_000;
const MAX_RECENT_LIMIT: usize = 50;
const DEFAULT_RECENT_LIMIT: usize = 20;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: NotificationPriority,
    pub read: bool,
    pub read_at_ms: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct NotificationCreate {
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: NotificationPriority,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutFailure {
    pub user_id: String,
    pub error: String,
}

/// Per-recipient settled outcome of a multi-user fan-out. One failed
/// recipient never aborts the siblings.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub delivered: Vec<Notification>,
    pub failed: Vec<FanoutFailure>,
}

pub fn clamp_recent_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT)
}

#[derive(Clone)]
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
    pusher: Arc<dyn NotificationPusher>,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        pusher: Arc<dyn NotificationPusher>,
    ) -> Self {
        Self { repository, pusher }
    }

    /// Persist, push `new_notification` to the recipient's personal
    /// room, then recompute and push the unread count. The persisted row
    /// is the source of truth; push failures are logged and swallowed
    /// because the REST mirror reconciles on the next poll.
    pub async fn notify_user(
        &self,
        user_id: &str,
        input: NotificationCreate,
    ) -> DomainResult<Notification> {
        validate_notification_input(user_id, &input)?;
        let notification = Notification {
            notification_id: uuid_v7_without_dashes(),
            user_id: user_id.to_string(),
            notification_type: input.notification_type,
            title: input.title,
            message: input.message,
            image_url: input.image_url,
            link_url: input.link_url,
            metadata: input.metadata,
            priority: input.priority,
            read: false,
            read_at_ms: None,
            created_at_ms: now_ms(),
        };
        let notification = self.repository.create(&notification).await?;

        if let Err(err) = self.pusher.push_new(user_id, &notification).await {
            tracing::warn!(user_id, error = %err, "notification push failed; row is durable");
        }
        self.push_unread_count(user_id).await;

        Ok(notification)
    }

    /// All-settled fan-out: every recipient is attempted independently.
    pub async fn notify_many(
        &self,
        user_ids: &[String],
        input: NotificationCreate,
    ) -> DomainResult<FanoutReport> {
        let attempts = user_ids.iter().map(|user_id| {
            let input = input.clone();
            async move { (user_id, self.notify_user(user_id, input).await) }
        });

        let mut report = FanoutReport::default();
        for (user_id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(notification) => report.delivered.push(notification),
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "fan-out recipient failed");
                    report.failed.push(FanoutFailure {
                        user_id: user_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Notification>> {
        self.repository.list(user_id, unread_only, limit).await
    }

    pub async fn unread_count(&self, user_id: &str) -> DomainResult<u64> {
        self.repository.unread_count(user_id).await
    }

    pub async fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> DomainResult<Notification> {
        let notification = self
            .repository
            .mark_read(user_id, notification_id, now_ms())
            .await?;
        self.push_unread_count(user_id).await;
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> DomainResult<u64> {
        let updated = self.repository.mark_all_read(user_id, now_ms()).await?;
        self.push_unread_count(user_id).await;
        Ok(updated)
    }

    pub async fn delete(&self, user_id: &str, notification_id: &str) -> DomainResult<()> {
        self.repository.delete(user_id, notification_id).await?;
        self.push_unread_count(user_id).await;
        Ok(())
    }

    pub async fn clear_all(&self, user_id: &str) -> DomainResult<u64> {
        let removed = self.repository.clear_all(user_id).await?;
        self.push_unread_count(user_id).await;
        Ok(removed)
    }

    async fn push_unread_count(&self, user_id: &str) {
        match self.repository.unread_count(user_id).await {
            Ok(count) => {
                if let Err(err) = self.pusher.push_unread_count(user_id, count).await {
                    tracing::warn!(user_id, error = %err, "unread count push failed");
                }
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "unread count recompute failed");
            }
        }
    }
}

fn validate_notification_input(user_id: &str, input: &NotificationCreate) -> DomainResult<()> {
    if user_id.trim().is_empty() {
        return Err(DomainError::Validation("userId is required".into()));
    }
    if input.notification_type.trim().is_empty() {
        return Err(DomainError::Validation("type is required".into()));
    }
    if input.title.trim().is_empty() {
        return Err(DomainError::Validation("title is required".into()));
    }
    if input.title.chars().count() > MAX_TITLE_LENGTH {
        return Err(DomainError::Validation(format!(
            "title exceeds max length of {MAX_TITLE_LENGTH}"
        )));
    }
    if input.message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(DomainError::Validation(format!(
            "message exceeds max length of {MAX_MESSAGE_LENGTH}"
        )));
    }
    Ok(())
}
