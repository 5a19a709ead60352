use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    db::{MessageId, RoomId, UserId, NO_MESSAGES_READ},
    session::Caller,
    AppError, AppResult,
};

use super::room;

/// The user's read pointer for a room, or [`NO_MESSAGES_READ`] when nothing
/// has been read (or no receipt exists). Never writes.
pub async fn last_read(
    db_pool: &SqlitePool,
    room_id: RoomId,
    user_id: UserId,
) -> AppResult<MessageId> {
    let stored: Option<Option<MessageId>> =
        sqlx::query_scalar("SELECT last_message FROM read_receipts WHERE room_id=? AND user_id=?")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

    Ok(stored.flatten().unwrap_or(NO_MESSAGES_READ))
}

/// Overwrites the read pointer. Moving it backward is allowed; concurrent
/// writers race and the last one wins.
pub async fn mark_as_read(
    db_pool: &SqlitePool,
    user_id: UserId,
    room_id: RoomId,
    message_id: MessageId,
) -> AppResult<()> {
    if !room::exists(db_pool, room_id).await? {
        return Err(AppError::NotFound(format!("room {room_id} not found")));
    }

    let in_room = sqlx::query_scalar::<_, i64>("SELECT 1 FROM messages WHERE id=? AND room_id=?")
        .bind(message_id)
        .bind(room_id)
        .fetch_optional(db_pool)
        .await?
        .is_some();
    if !in_room {
        return Err(AppError::NotFound(format!("message {message_id} not found in room {room_id}")));
    }

    let updated =
        sqlx::query("UPDATE read_receipts SET last_message=? WHERE room_id=? AND user_id=?")
            .bind(message_id)
            .bind(room_id)
            .bind(user_id)
            .execute(db_pool)
            .await?
            .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound(format!("read receipt for room {room_id} not found")));
    }

    tracing::debug!(room_id, user_id, message_id, "read pointer moved");
    Ok(())
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkAsReadQuery {
    room_id: Option<RoomId>,
    last_message: Option<MessageId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_as_read_handler(
    State(db_pool): State<SqlitePool>,
    Caller(user_id): Caller,
    payload: Result<Json<MarkAsReadQuery>, JsonRejection>,
) -> AppResult<Json<&'static str>> {
    let Json(MarkAsReadQuery { room_id, last_message }) = payload?;
    let (Some(room_id), Some(last_message)) = (room_id, last_message) else {
        return Err(AppError::Validation("room_id and last_message are required".into()));
    };

    mark_as_read(&db_pool, user_id, room_id, last_message).await?;
    Ok(Json("done"))
}
