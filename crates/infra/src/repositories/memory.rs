use std::collections::HashMap;
use std::sync::Arc;

use palaver_domain::DomainResult;
use palaver_domain::chat::{Message, MessagePage, Participant, Thread};
use palaver_domain::error::DomainError;
use palaver_domain::notifications::Notification;
use palaver_domain::ports::BoxFuture;
use palaver_domain::ports::chat::ChatRepository;
use palaver_domain::ports::notifications::NotificationRepository;
use tokio::sync::RwLock;

/// In-memory persistence gateway. Single-instance deployments and the
/// test suite run on this; swapping in a relational backend means
/// re-implementing the two repository traits, nothing above them.
#[derive(Default)]
pub struct InMemoryChatRepository {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
    participants: Arc<RwLock<HashMap<(String, String), Participant>>>,
    messages: Arc<RwLock<HashMap<(String, String), Message>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatRepository for InMemoryChatRepository {
    fn create_thread(&self, thread: &Thread) -> BoxFuture<'_, DomainResult<Thread>> {
        let thread = thread.clone();
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
                .filter(|thread| !thread.is_group)
                .find(|thread| {
                    participants.contains_key(&(thread.thread_id.clone(), user_a.clone()))
                        && participants.contains_key(&(thread.thread_id.clone(), user_b.clone()))
                })
                .cloned();
            Ok(found)
        })
    }

    fn list_threads_for_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Thread>>> {
        let user_id = user_id.to_string();
        let threads = self.threads.clone();
        let participants = self.participants.clone();
        Box::pin(async move {
            let participants = participants.read().await;
            let threads = threads.read().await;
            let mut list: Vec<_> = threads
                .values()
                .filter(|thread| {
                    participants.contains_key(&(thread.thread_id.clone(), user_id.clone()))
                })
                .cloned()
                .collect();
            list.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
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
            // (threadId, userId) is unique; a user appears at most once
            // per thread.
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
        last_read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Participant>> {
        let key = (thread_id.to_string(), user_id.to_string());
        let participants = self.participants.clone();
        Box::pin(async move {
            let mut participants = participants.write().await;
            let participant = participants.get_mut(&key).ok_or(DomainError::NotFound)?;
            participant.last_read_message_id = last_read_message_id;
            participant.last_read_at_ms = Some(last_read_at_ms);
            Ok(participant.clone())
        })
    }

    fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let message = message.clone();
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
            // Creation time is the ordering key; ids (UUIDv7) break ties
            // in insertion order.
            list.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.message_id.cmp(&a.message_id))
            });
            list.truncate(page.take);
            Ok(list)
        })
    }

    fn latest_message(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let thread_id = thread_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let messages = messages.read().await;
            let latest = messages
                .values()
                .filter(|message| message.thread_id == thread_id)
                .max_by(|a, b| {
                    a.created_at_ms
                        .cmp(&b.created_at_ms)
                        .then_with(|| a.message_id.cmp(&b.message_id))
                })
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

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    rows: Arc<RwLock<HashMap<String, Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>> {
        let notification = notification.clone();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            if rows.contains_key(&notification.notification_id) {
                return Err(DomainError::Conflict);
            }
            rows.insert(notification.notification_id.clone(), notification.clone());
            Ok(notification)
        })
    }

    fn get(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Notification>>> {
        let user_id = user_id.to_string();
        let notification_id = notification_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let rows = rows.read().await;
            Ok(rows
                .get(&notification_id)
                .filter(|row| row.user_id == user_id)
                .cloned())
        })
    }

    fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<usize>,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let user_id = user_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut list: Vec<_> = rows
                .read()
                .await
                .values()
                .filter(|row| row.user_id == user_id && (!unread_only || !row.read))
                .cloned()
                .collect();
            list.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.notification_id.cmp(&a.notification_id))
            });
            if let Some(limit) = limit {
                list.truncate(limit);
            }
            Ok(list)
        })
    }

    fn unread_count(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let count = rows
                .read()
                .await
                .values()
                .filter(|row| row.user_id == user_id && !row.read)
                .count();
            Ok(count as u64)
        })
    }

    fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Notification>> {
        let user_id = user_id.to_string();
        let notification_id = notification_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let row = rows
                .get_mut(&notification_id)
                .filter(|row| row.user_id == user_id)
                .ok_or(DomainError::NotFound)?;
            row.read = true;
            row.read_at_ms = Some(read_at_ms);
            Ok(row.clone())
        })
    }

    fn mark_all_read(&self, user_id: &str, read_at_ms: i64) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let mut updated = 0;
            for row in rows.values_mut() {
                if row.user_id == user_id && !row.read {
                    row.read = true;
                    row.read_at_ms = Some(read_at_ms);
                    updated += 1;
                }
            }
            Ok(updated)
        })
    }

    fn delete(&self, user_id: &str, notification_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let user_id = user_id.to_string();
        let notification_id = notification_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            match rows.get(&notification_id) {
                Some(row) if row.user_id == user_id => {
                    rows.remove(&notification_id);
                    Ok(())
                }
                _ => Err(DomainError::NotFound),
            }
        })
    }

    fn clear_all(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let rows = self.rows.clone();
        Box::pin(async move {
            let mut rows = rows.write().await;
            let before = rows.len();
            rows.retain(|_, row| row.user_id != user_id);
            Ok((before - rows.len()) as u64)
        })
    }
}
