mod memory;

pub use memory::{InMemoryChatRepository, InMemoryNotificationRepository};
