use crate::DomainResult;
use crate::chat::{Message, MessagePage, Participant, Thread};

/// Persistence gateway for threads, participants and messages. Plain
/// statements with filters; no business logic lives behind this trait.
pub trait ChatRepository: Send + Sync {
    fn create_thread(&self, thread: &Thread) -> crate::ports::BoxFuture<'_, DomainResult<Thread>>;

    fn get_thread(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Thread>>>;

    /// Any non-group thread where both users hold a participant row.
    fn find_direct_thread(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Thread>>>;

    fn list_threads_for_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Thread>>>;

    fn create_participant(
        &self,
        participant: &Participant,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Participant>>;

    fn get_participant(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Participant>>>;

    fn list_participants(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Participant>>>;

    fn set_read_pointer(
        &self,
        thread_id: &str,
        user_id: &str,
        last_read_message_id: Option<String>,
        last_read_at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Participant>>;

    fn create_message(
        &self,
        message: &Message,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Message>>;

    fn get_message(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Newest-first page of messages strictly older than `before_ms`.
    fn list_messages(
        &self,
        thread_id: &str,
        page: &MessagePage,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Message>>>;

    fn latest_message(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Message>>>;

    /// Count of messages newer than `since_ms` (all messages when `None`)
    /// not authored by `exclude_sender`.
    fn count_messages_since(
        &self,
        thread_id: &str,
        exclude_sender: &str,
        since_ms: Option<i64>,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;
}
