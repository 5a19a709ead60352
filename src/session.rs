use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::{db::UserId, AppError};

/// Session key under which the auth layer stores the signed-in user's id.
pub const USER_ID: &str = "user_id";

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow::anyhow!(msg)))?;

        let Some(user_id) = session.get::<UserId>(USER_ID).await? else {
            return Err(AppError::Unauthorized);
        };

        Ok(Caller(user_id))
    }
}
