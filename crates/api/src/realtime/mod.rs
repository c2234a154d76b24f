pub mod dm;
pub mod notifications;
pub mod protocol;
pub mod pusher;
pub mod rooms;

use palaver_domain::identity::ActorIdentity;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::{AuthContext, decode_identity};

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// Resolves the connection's identity at handshake time, honoring both
/// the `Authorization` header (already resolved into `AuthContext`) and
/// a `token` query parameter. No identity means the upgrade is refused
/// outright, never silently degraded.
pub fn handshake_actor(
    auth: &AuthContext,
    query: &HandshakeQuery,
    jwt_secret: &str,
) -> Result<ActorIdentity, ApiError> {
    if auth.is_authenticated {
        if let Some(user_id) = &auth.user_id {
            return Ok(ActorIdentity::with_user_id(user_id.clone()));
        }
    }

    let token = query.token.as_deref().ok_or(ApiError::Unauthorized)?;
    let context = decode_identity(token, jwt_secret).map_err(|_| ApiError::Unauthorized)?;
    let user_id = context.user_id.ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity::with_user_id(user_id))
}
