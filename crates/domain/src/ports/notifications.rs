use crate::DomainResult;
use crate::notifications::Notification;

pub trait NotificationRepository: Send + Sync {
    fn create(
        &self,
        notification: &Notification,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Notification>>;

    fn get(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Notification>>>;

    /// Newest-first rows for one recipient.
    fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<usize>,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Notification>>>;

    fn unread_count(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;

    fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
        read_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Notification>>;

    fn mark_all_read(
        &self,
        user_id: &str,
        read_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;

    fn delete(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn clear_all(&self, user_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;
}
