use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::chat::ChatRepository;
use crate::util::{now_ms, uuid_v7_without_dashes};

const MAX_BODY_LENGTH: usize = 2_000;
const MAX_ATTACHMENT_COUNT: usize = 20;
const MAX_TITLE_LENGTH: usize = 200;
const MAX_MESSAGES_PER_PAGE: usize = 100;
const DEFAULT_MESSAGES_PER_PAGE: usize = 50;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Admin,
    Member,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub thread_id: String,
    pub is_group: bool,
    pub title: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub thread_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub last_read_message_id: Option<String>,
    pub last_read_at_ms: Option<i64>,
    pub notifications_muted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
    pub created_at_ms: i64,
}

/// Thread plus the per-viewer derived fields the thread list carries.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub last_message: Option<Message>,
    pub unread: u64,
}

#[derive(Clone, Debug)]
pub struct ThreadCreate {
    pub participant_ids: Vec<String>,
    pub title: Option<String>,
    pub is_group: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadHandle {
    pub thread: Thread,
    pub reused: bool,
}

#[derive(Clone, Debug)]
pub struct SendMessageInput {
    pub thread_id: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug)]
pub struct MessagePage {
    pub take: usize,
    pub before_ms: Option<i64>,
}

pub fn build_message_page(take: Option<usize>, before_ms: Option<i64>) -> MessagePage {
    MessagePage {
        take: take
            .unwrap_or(DEFAULT_MESSAGES_PER_PAGE)
            .clamp(1, MAX_MESSAGES_PER_PAGE),
        before_ms,
    }
}

#[derive(Clone)]
pub struct MessagingService {
    repository: Arc<dyn ChatRepository>,
}

impl MessagingService {
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    /// Membership guard. Absence is a deny, never an error; callers on
    /// the channel path drop the event silently, the API path maps the
    /// corresponding `Forbidden` to 403.
    pub async fn is_member(&self, thread_id: &str, user_id: &str) -> DomainResult<bool> {
        Ok(self
            .repository
            .get_participant(thread_id, user_id)
            .await?
            .is_some())
    }

    /// Creates a thread, or reuses the existing 1:1 thread when the
    /// request names exactly one other user and is not a group. Repeated
    /// "start chat with X" calls therefore never fork duplicate threads.
    /// Zero or two-plus ids with `is_group == false` fall through to
    /// unconditional creation.
    pub async fn create_or_reuse_thread(
        &self,
        actor: &ActorIdentity,
        input: ThreadCreate,
    ) -> DomainResult<ThreadHandle> {
        let input = validate_thread_create(input)?;
        let mut member_ids = vec![actor.user_id.clone()];
        for id in &input.participant_ids {
            if !member_ids.contains(id) {
                member_ids.push(id.clone());
            }
        }

        if !input.is_group && member_ids.len() == 2 {
            if let Some(existing) = self
                .repository
                .find_direct_thread(&member_ids[0], &member_ids[1])
                .await?
            {
                return Ok(ThreadHandle {
                    thread: existing,
                    reused: true,
                });
            }
        }

        let now = now_ms();
        let thread = Thread {
            thread_id: uuid_v7_without_dashes(),
            is_group: input.is_group,
            title: input.title,
            created_at_ms: now,
        };
        let thread = self.repository.create_thread(&thread).await?;

        for (index, user_id) in member_ids.iter().enumerate() {
            let participant = Participant {
                thread_id: thread.thread_id.clone(),
                user_id: user_id.clone(),
                role: if index == 0 {
                    ParticipantRole::Owner
                } else {
                    ParticipantRole::Member
                },
                last_read_message_id: None,
                last_read_at_ms: None,
                notifications_muted: false,
            };
            self.repository.create_participant(&participant).await?;
        }

        Ok(ThreadHandle {
            thread,
            reused: false,
        })
    }

    pub async fn get_thread(&self, thread_id: &str) -> DomainResult<Thread> {
        self.repository
            .get_thread(thread_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_participants(&self, thread_id: &str) -> DomainResult<Vec<Participant>> {
        self.repository.list_participants(thread_id).await
    }

    /// Appends a message and advances the sender's own read pointer to
    /// it, so a sender never sees their own message as unread.
    pub async fn send_message(
        &self,
        actor: &ActorIdentity,
        input: SendMessageInput,
    ) -> DomainResult<Message> {
        self.assert_member(&input.thread_id, &actor.user_id).await?;
        let body = input.body.trim().to_string();
        validate_message_input(&body, &input.attachments)?;

        let message = Message {
            message_id: uuid_v7_without_dashes(),
            thread_id: input.thread_id,
            sender_id: actor.user_id.clone(),
            body,
            attachments: input.attachments,
            created_at_ms: now_ms(),
        };
        let message = self.repository.create_message(&message).await?;

        self.repository
            .set_read_pointer(
                &message.thread_id,
                &actor.user_id,
                Some(message.message_id.clone()),
                now_ms(),
            )
            .await?;

        Ok(message)
    }

    /// Moves the caller's read pointer. A supplied id must reference a
    /// message of this thread; an omitted id clears the pointer to "now".
    pub async fn mark_read(
        &self,
        actor: &ActorIdentity,
        thread_id: &str,
        last_read_message_id: Option<String>,
    ) -> DomainResult<Participant> {
        self.assert_member(thread_id, &actor.user_id).await?;

        if let Some(message_id) = &last_read_message_id {
            self.repository
                .get_message(thread_id, message_id)
                .await?
                .ok_or_else(|| {
                    DomainError::Validation(
                        "lastReadMessageId does not reference a message in this thread".into(),
                    )
                })?;
        }

        self.repository
            .set_read_pointer(thread_id, &actor.user_id, last_read_message_id, now_ms())
            .await
    }

    pub async fn list_threads(&self, actor: &ActorIdentity) -> DomainResult<Vec<ThreadSummary>> {
        let threads = self.repository.list_threads_for_user(&actor.user_id).await?;
        let mut summaries = Vec::with_capacity(threads.len());
        for thread in threads {
            let last_message = self.repository.latest_message(&thread.thread_id).await?;
            let unread = self.unread_for(&actor.user_id, &thread.thread_id).await?;
            summaries.push(ThreadSummary {
                thread,
                last_message,
                unread,
            });
        }
        summaries.sort_by(|a, b| {
            let a_ms = a
                .last_message
                .as_ref()
                .map_or(a.thread.created_at_ms, |m| m.created_at_ms);
            let b_ms = b
                .last_message
                .as_ref()
                .map_or(b.thread.created_at_ms, |m| m.created_at_ms);
            b_ms.cmp(&a_ms)
        });
        Ok(summaries)
    }

    /// Page of messages strictly older than `before_ms`, returned in
    /// ascending chronological order.
    pub async fn list_messages(
        &self,
        thread_id: &str,
        actor: &ActorIdentity,
        page: MessagePage,
    ) -> DomainResult<Vec<Message>> {
        self.assert_member(thread_id, &actor.user_id).await?;
        let mut messages = self.repository.list_messages(thread_id, &page).await?;
        messages.reverse();
        Ok(messages)
    }

    /// Derived unread count: messages after the caller's read horizon,
    /// not authored by the caller. Recomputed per request, never stored.
    pub async fn unread_for(&self, user_id: &str, thread_id: &str) -> DomainResult<u64> {
        let participant = self
            .repository
            .get_participant(thread_id, user_id)
            .await?
            .ok_or_else(not_a_member)?;
        self.repository
            .count_messages_since(thread_id, user_id, participant.last_read_at_ms)
            .await
    }

    async fn assert_member(&self, thread_id: &str, user_id: &str) -> DomainResult<()> {
        if self.is_member(thread_id, user_id).await? {
            Ok(())
        } else {
            Err(not_a_member())
        }
    }
}

fn not_a_member() -> DomainError {
    DomainError::Forbidden("user is not a member of this thread".into())
}

fn validate_thread_create(mut input: ThreadCreate) -> DomainResult<ThreadCreate> {
    input.participant_ids = input
        .participant_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .collect();
    if input.participant_ids.iter().any(String::is_empty) {
        return Err(DomainError::Validation(
            "participantIds must not contain empty ids".into(),
        ));
    }
    if let Some(title) = &input.title {
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(DomainError::Validation(format!(
                "title exceeds max length of {MAX_TITLE_LENGTH}"
            )));
        }
    }
    Ok(input)
}

fn validate_message_input(body: &str, attachments: &[Attachment]) -> DomainResult<()> {
    if body.is_empty() {
        return Err(DomainError::Validation("text is required".into()));
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(DomainError::Validation(format!(
            "text exceeds max length of {MAX_BODY_LENGTH}"
        )));
    }
    if attachments.len() > MAX_ATTACHMENT_COUNT {
        return Err(DomainError::Validation(format!(
            "attachments exceeds max of {MAX_ATTACHMENT_COUNT}"
        )));
    }
    for attachment in attachments {
        if attachment.name.trim().is_empty() || attachment.url.trim().is_empty() {
            return Err(DomainError::Validation(
                "attachments require a name and url".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MockChatRepo {
        threads: Arc<RwLock<HashMap<String, Thread>>>,
        participants: Arc<RwLock<HashMap<(String, String), Participant>>>,
        messages: Arc<RwLock<HashMap<(String, String), Message>>>,
        clock: AtomicI64,
    }

    impl MockChatRepo {
        // Monotonic stamps so ordering assertions are deterministic.
        fn tick(&self) -> i64 {
            self.clock.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    impl ChatRepository for MockChatRepo {
        fn create_thread(&self, thread: &Thread) -> BoxFuture<'_, DomainResult<Thread>> {
            let mut thread = thread.clone();
            thread.created_at_ms = self.tick();
            let threads = self.threads.clone();
            Box::pin(async move {
                let mut threads = threads.write().await;
                if threads.contains_key(&thread.thread_id) {
                    return Err(DomainError::Conflict);
                }
                threads.insert(thread.thread_id.clone(), thread.clone());
                Ok(thread)
            })
        }

        fn get_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
            let thread_id = thread_id.to_string();
            let threads = self.threads.clone();
            Box::pin(async move { Ok(threads.read().await.get(&thread_id).cloned()) })
        }

        fn find_direct_thread(
            &self,
            user_a: &str,
            user_b: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Thread>>> {
            let user_a = user_a.to_string();
            let user_b = user_b.to_string();
            let threads = self.threads.clone();
            let participants = self.participants.clone();
            Box::pin(async move {
                let participants = participants.read().await;
                let threads = threads.read().await;
                let found = threads
                    .values()
                    .find(|thread| {
                        !thread.is_group
                            && participants
                                .contains_key(&(thread.thread_id.clone(), user_a.clone()))
                            && participants
                                .contains_key(&(thread.thread_id.clone(), user_b.clone()))
                    })
                    .cloned();
                Ok(found)
            })
        }

        fn list_threads_for_user(
            &self,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<Thread>>> {
            let user_id = user_id.to_string();
            let threads = self.threads.clone();
            let participants = self.participants.clone();
            Box::pin(async move {
                let participants = participants.read().await;
                let threads = threads.read().await;
                let list = threads
                    .values()
                    .filter(|thread| {
                        participants.contains_key(&(thread.thread_id.clone(), user_id.clone()))
                    })
                    .cloned()
                    .collect();
                Ok(list)
            })
        }

        fn create_participant(
            &self,
            participant: &Participant,
        ) -> BoxFuture<'_, DomainResult<Participant>> {
            let participant = participant.clone();
            let participants = self.participants.clone();
            Box::pin(async move {
                let key = (participant.thread_id.clone(), participant.user_id.clone());
                let mut participants = participants.write().await;
                if participants.contains_key(&key) {
                    return Err(DomainError::Conflict);
                }
                participants.insert(key, participant.clone());
                Ok(participant)
            })
        }

        fn get_participant(
            &self,
            thread_id: &str,
            user_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Participant>>> {
            let key = (thread_id.to_string(), user_id.to_string());
            let participants = self.participants.clone();
            Box::pin(async move { Ok(participants.read().await.get(&key).cloned()) })
        }

        fn list_participants(
            &self,
            thread_id: &str,
        ) -> BoxFuture<'_, DomainResult<Vec<Participant>>> {
            let thread_id = thread_id.to_string();
            let participants = self.participants.clone();
            Box::pin(async move {
                let list = participants
                    .read()
                    .await
                    .values()
                    .filter(|participant| participant.thread_id == thread_id)
                    .cloned()
                    .collect();
                Ok(list)
            })
        }

        fn set_read_pointer(
            &self,
            thread_id: &str,
            user_id: &str,
            last_read_message_id: Option<String>,
            _last_read_at_ms: i64,
        ) -> BoxFuture<'_, DomainResult<Participant>> {
            let key = (thread_id.to_string(), user_id.to_string());
            let participants = self.participants.clone();
            let stamp = self.tick();
            Box::pin(async move {
                let mut participants = participants.write().await;
                let participant = participants.get_mut(&key).ok_or(DomainError::NotFound)?;
                participant.last_read_message_id = last_read_message_id;
                participant.last_read_at_ms = Some(stamp);
                Ok(participant.clone())
            })
        }

        fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
            let mut message = message.clone();
            message.created_at_ms = self.tick();
            let messages = self.messages.clone();
            Box::pin(async move {
                let key = (message.thread_id.clone(), message.message_id.clone());
                let mut messages = messages.write().await;
                if messages.contains_key(&key) {
                    return Err(DomainError::Conflict);
                }
                messages.insert(key, message.clone());
                Ok(message)
            })
        }

        fn get_message(
            &self,
            thread_id: &str,
            message_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
            let key = (thread_id.to_string(), message_id.to_string());
            let messages = self.messages.clone();
            Box::pin(async move { Ok(messages.read().await.get(&key).cloned()) })
        }

        fn list_messages(
            &self,
            thread_id: &str,
            page: &MessagePage,
        ) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
            let thread_id = thread_id.to_string();
            let page = page.clone();
            let messages = self.messages.clone();
            Box::pin(async move {
                let mut list: Vec<_> = messages
                    .read()
                    .await
                    .values()
                    .filter(|message| message.thread_id == thread_id)
                    .filter(|message| {
                        page.before_ms
                            .is_none_or(|before| message.created_at_ms < before)
                    })
                    .cloned()
                    .collect();
                list.sort_by(|a, b| {
                    b.created_at_ms
                        .cmp(&a.created_at_ms)
                        .then_with(|| b.message_id.cmp(&a.message_id))
                });
                list.truncate(page.take);
                Ok(list)
            })
        }

        fn latest_message(
            &self,
            thread_id: &str,
        ) -> BoxFuture<'_, DomainResult<Option<Message>>> {
            let thread_id = thread_id.to_string();
            let messages = self.messages.clone();
            Box::pin(async move {
                let messages = messages.read().await;
                let latest = messages
                    .values()
                    .filter(|message| message.thread_id == thread_id)
                    .max_by_key(|message| (message.created_at_ms, message.message_id.clone()))
                    .cloned();
                Ok(latest)
            })
        }

        fn count_messages_since(
            &self,
            thread_id: &str,
            exclude_sender: &str,
            since_ms: Option<i64>,
        ) -> BoxFuture<'_, DomainResult<u64>> {
            let thread_id = thread_id.to_string();
            let exclude_sender = exclude_sender.to_string();
            let messages = self.messages.clone();
            Box::pin(async move {
                let count = messages
                    .read()
                    .await
                    .values()
                    .filter(|message| {
                        message.thread_id == thread_id
                            && message.sender_id != exclude_sender
                            && since_ms.is_none_or(|since| message.created_at_ms > since)
                    })
                    .count();
                Ok(count as u64)
            })
        }
    }

    fn service() -> MessagingService {
        MessagingService::new(Arc::new(MockChatRepo::default()))
    }

    fn direct_create(other: &str) -> ThreadCreate {
        ThreadCreate {
            participant_ids: vec![other.to_string()],
            title: None,
            is_group: false,
        }
    }

    async fn send(service: &MessagingService, actor: &ActorIdentity, thread_id: &str, body: &str) {
        service
            .send_message(
                actor,
                SendMessageInput {
                    thread_id: thread_id.to_string(),
                    body: body.to_string(),
                    attachments: vec![],
                },
            )
            .await
            .expect("send");
    }

    #[tokio::test]
    async fn direct_thread_creation_is_idempotent() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");

        let first = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("first");
        assert!(!first.reused);

        let second = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("second");
        assert!(second.reused);
        assert_eq!(first.thread.thread_id, second.thread.thread_id);

        // Reuse also applies when the other side initiates.
        let bob = ActorIdentity::with_user_id("bob");
        let third = service
            .create_or_reuse_thread(&bob, direct_create("alice"))
            .await
            .expect("third");
        assert!(third.reused);
        assert_eq!(first.thread.thread_id, third.thread.thread_id);
    }

    #[tokio::test]
    async fn group_creation_never_reuses() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let create = ThreadCreate {
            participant_ids: vec!["bob".to_string()],
            title: Some("plans".to_string()),
            is_group: true,
        };

        let first = service
            .create_or_reuse_thread(&alice, create.clone())
            .await
            .expect("first");
        let second = service
            .create_or_reuse_thread(&alice, create)
            .await
            .expect("second");
        assert!(!second.reused);
        assert_ne!(first.thread.thread_id, second.thread.thread_id);
    }

    #[tokio::test]
    async fn multi_party_non_group_falls_through_to_creation() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let create = ThreadCreate {
            participant_ids: vec!["bob".to_string(), "carol".to_string()],
            title: None,
            is_group: false,
        };

        let first = service
            .create_or_reuse_thread(&alice, create.clone())
            .await
            .expect("first");
        let second = service
            .create_or_reuse_thread(&alice, create)
            .await
            .expect("second");
        assert!(!first.reused);
        assert!(!second.reused);
        assert_ne!(first.thread.thread_id, second.thread.thread_id);
    }

    #[tokio::test]
    async fn participant_roles_follow_listing_order() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let handle = service
            .create_or_reuse_thread(
                &alice,
                ThreadCreate {
                    participant_ids: vec!["bob".to_string(), "alice".to_string()],
                    title: None,
                    is_group: true,
                },
            )
            .await
            .expect("thread");

        let participants = service
            .list_participants(&handle.thread.thread_id)
            .await
            .expect("participants");
        assert_eq!(participants.len(), 2);
        for participant in participants {
            let expected = if participant.user_id == "alice" {
                ParticipantRole::Owner
            } else {
                ParticipantRole::Member
            };
            assert_eq!(participant.role, expected);
        }
    }

    #[tokio::test]
    async fn sending_keeps_own_unread_at_zero() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");
        let thread_id = handle.thread.thread_id;

        send(&service, &alice, &thread_id, "hi").await;
        send(&service, &alice, &thread_id, "you there?").await;

        assert_eq!(service.unread_for("alice", &thread_id).await.expect("count"), 0);
        assert_eq!(service.unread_for("bob", &thread_id).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn read_receipt_scenario_between_two_users() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let bob = ActorIdentity::with_user_id("bob");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");
        let thread_id = handle.thread.thread_id;

        send(&service, &alice, &thread_id, "hi").await;
        assert_eq!(service.unread_for("bob", &thread_id).await.expect("count"), 1);

        let messages = service
            .list_messages(&thread_id, &bob, build_message_page(None, None))
            .await
            .expect("messages");
        let last_id = messages.last().expect("message").message_id.clone();

        service
            .mark_read(&bob, &thread_id, Some(last_id))
            .await
            .expect("mark read");
        assert_eq!(service.unread_for("bob", &thread_id).await.expect("count"), 0);
        // Alice's state is untouched by Bob's read.
        assert_eq!(service.unread_for("alice", &thread_id).await.expect("count"), 0);

        send(&service, &bob, &thread_id, "hello").await;
        assert_eq!(service.unread_for("alice", &thread_id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn mark_read_without_id_clears_to_now() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let bob = ActorIdentity::with_user_id("bob");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");
        let thread_id = handle.thread.thread_id;

        send(&service, &alice, &thread_id, "hi").await;
        let participant = service
            .mark_read(&bob, &thread_id, None)
            .await
            .expect("mark read");
        assert!(participant.last_read_message_id.is_none());
        assert!(participant.last_read_at_ms.is_some());
        assert_eq!(service.unread_for("bob", &thread_id).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn mark_read_rejects_foreign_message_id() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");

        let err = service
            .mark_read(
                &alice,
                &handle.thread.thread_id,
                Some("not-a-message".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn non_member_is_forbidden() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let mallory = ActorIdentity::with_user_id("mallory");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");
        let thread_id = handle.thread.thread_id;

        let err = service
            .send_message(
                &mallory,
                SendMessageInput {
                    thread_id: thread_id.clone(),
                    body: "let me in".to_string(),
                    attachments: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = service
            .list_messages(&thread_id, &mallory, build_message_page(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        assert!(!service.is_member(&thread_id, "mallory").await.expect("guard"));
    }

    #[tokio::test]
    async fn messages_page_ascending_with_before_cursor() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let handle = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("thread");
        let thread_id = handle.thread.thread_id;

        for body in ["one", "two", "three", "four"] {
            send(&service, &alice, &thread_id, body).await;
        }

        let all = service
            .list_messages(&thread_id, &alice, build_message_page(None, None))
            .await
            .expect("messages");
        let bodies: Vec<_> = all.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two", "three", "four"]);

        let before = all[2].created_at_ms;
        let older = service
            .list_messages(&thread_id, &alice, build_message_page(None, Some(before)))
            .await
            .expect("messages");
        let bodies: Vec<_> = older.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one", "two"]);

        let capped = service
            .list_messages(&thread_id, &alice, build_message_page(Some(2), None))
            .await
            .expect("messages");
        let bodies: Vec<_> = capped.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["three", "four"]);
    }

    #[tokio::test]
    async fn thread_list_carries_last_message_and_unread() {
        let service = service();
        let alice = ActorIdentity::with_user_id("alice");
        let bob = ActorIdentity::with_user_id("bob");
        let direct = service
            .create_or_reuse_thread(&alice, direct_create("bob"))
            .await
            .expect("direct");
        service
            .create_or_reuse_thread(
                &alice,
                ThreadCreate {
                    participant_ids: vec!["bob".to_string(), "carol".to_string()],
                    title: Some("trio".to_string()),
                    is_group: true,
                },
            )
            .await
            .expect("group");

        send(&service, &alice, &direct.thread.thread_id, "ping").await;

        let threads = service.list_threads(&bob).await.expect("threads");
        assert_eq!(threads.len(), 2);
        // Thread with the newest activity sorts first.
        assert_eq!(threads[0].thread.thread_id, direct.thread.thread_id);
        assert_eq!(threads[0].unread, 1);
        assert_eq!(
            threads[0].last_message.as_ref().map(|m| m.body.as_str()),
            Some("ping")
        );
        assert_eq!(threads[1].unread, 0);
        assert!(threads[1].last_message.is_none());
    }

    #[test]
    fn message_validation_rejects_bad_input() {
        assert!(validate_message_input("", &[]).is_err());
        assert!(validate_message_input(&"x".repeat(2_001), &[]).is_err());
        let blank = Attachment {
            name: " ".to_string(),
            url: "https://cdn.example/a.png".to_string(),
            mime_type: None,
        };
        assert!(validate_message_input("ok", &[blank]).is_err());
    }

    #[test]
    fn page_builder_clamps_take() {
        assert_eq!(build_message_page(Some(9_999), None).take, 100);
        assert_eq!(build_message_page(Some(0), None).take, 1);
        assert_eq!(build_message_page(None, None).take, 50);
    }
}
