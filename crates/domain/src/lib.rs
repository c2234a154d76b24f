pub mod chat;
pub mod error;
pub mod identity;
pub mod notifications;
pub mod ports;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
