use serde::{Deserialize, Serialize};

/// Identity resolved by the auth layer before any domain call reaches
/// this crate. The messaging core never authenticates; it trusts this
/// value as-is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: String,
}

impl ActorIdentity {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
