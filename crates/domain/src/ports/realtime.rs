use crate::DomainResult;
use crate::notifications::Notification;

/// Live-push seam between the fan-out service and the channel layer.
/// The api crate implements this on top of its room registry; tests use
/// a recording mock. A push failure never invalidates the persisted row.
pub trait NotificationPusher: Send + Sync {
    fn push_new(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn push_unread_count(
        &self,
        user_id: &str,
        count: u64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}

/// Pusher that drops everything; used where no channel layer is wired.
#[derive(Default)]
pub struct NoopPusher;

impl NotificationPusher for NoopPusher {
    fn push_new(
        &self,
        _user_id: &str,
        _notification: &Notification,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn push_unread_count(
        &self,
        _user_id: &str,
        _count: u64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
