use std::collections::BTreeMap;

use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::{
    db::{Message, MessageId, RoomId, UserId},
    session::Caller,
    AppError, AppResult,
};

use super::room;

/// Where a client left off in one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomCursor {
    pub room_id: RoomId,
    pub last_message: MessageId,
}

/// Appends a message to the room's log and hands it to live subscribers.
/// Read receipts are left alone.
pub async fn insert_message(
    db_pool: &SqlitePool,
    tx: &broadcast::Sender<Message>,
    author: UserId,
    room_id: RoomId,
    content: String,
) -> AppResult<Message> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("content may not be blank".into()));
    }
    if !room::exists(db_pool, room_id).await? {
        return Err(AppError::NotFound(format!("room {room_id} not found")));
    }
    if !room::is_member(db_pool, room_id, author).await? {
        return Err(AppError::Forbidden(format!("not a member of room {room_id}")));
    }

    let created_at = OffsetDateTime::now_utc();
    let id = sqlx::query(
        "INSERT INTO messages (room_id,author,content,created_at) VALUES (?,?,?,?)",
    )
    .bind(room_id)
    .bind(author)
    .bind(&content)
    .bind(created_at)
    .execute(db_pool)
    .await?
    .last_insert_rowid();

    let message = Message {
        id,
        room: room_id,
        author,
        content,
        created_at,
    };

    tracing::debug!(message_id = id, room_id, author, "message posted");
    // no live subscribers is fine
    let _ = tx.send(message.clone());

    Ok(message)
}

pub async fn messages_after(
    db_pool: &SqlitePool,
    room_id: RoomId,
    last_message: MessageId,
) -> sqlx::Result<Vec<Message>> {
    sqlx::query_as(
        "SELECT id,room_id AS room,author,content,created_at FROM messages \
         WHERE room_id=? AND id>? ORDER BY id",
    )
    .bind(room_id)
    .bind(last_message)
    .fetch_all(db_pool)
    .await
}

/// Collects every message newer than each cursor. Membership in all requested
/// rooms is checked up front; one foreign room fails the whole request.
pub async fn new_messages(
    db_pool: &SqlitePool,
    user_id: UserId,
    cursors: &[RoomCursor],
) -> AppResult<BTreeMap<RoomId, Vec<Message>>> {
    let mut delivered = BTreeMap::new();
    if cursors.is_empty() {
        return Ok(delivered);
    }

    for cursor in cursors {
        if !room::is_member(db_pool, cursor.room_id, user_id).await? {
            tracing::warn!(
                room_id = cursor.room_id,
                user_id,
                "new message request for foreign room"
            );
            return Err(AppError::Forbidden(format!("not a member of room {}", cursor.room_id)));
        }
    }

    for cursor in cursors {
        let messages = messages_after(db_pool, cursor.room_id, cursor.last_message).await?;
        delivered.insert(cursor.room_id, messages);
    }

    Ok(delivered)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageQuery {
    room: Option<RoomId>,
    content: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_msg(
    State(db_pool): State<SqlitePool>,
    State(tx): State<broadcast::Sender<Message>>,
    Caller(user_id): Caller,
    payload: Result<Json<SendMessageQuery>, JsonRejection>,
) -> AppResult<Json<Message>> {
    let Json(SendMessageQuery { room, content }) = payload?;
    let (Some(room), Some(content)) = (room, content) else {
        return Err(AppError::Validation("room and content are required".into()));
    };

    Ok(Json(insert_message(&db_pool, &tx, user_id, room, content).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CursorQuery {
    room_id: Option<RoomId>,
    last_message: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewMessagesQuery {
    room_list: Option<Vec<CursorQuery>>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get_new_messages(
    State(db_pool): State<SqlitePool>,
    Caller(user_id): Caller,
    payload: Result<Json<NewMessagesQuery>, JsonRejection>,
) -> AppResult<Json<BTreeMap<RoomId, Vec<Message>>>> {
    let Json(NewMessagesQuery { room_list }) = payload?;
    let room_list = room_list.ok_or_else(|| AppError::Validation("room_list is required".into()))?;

    let cursors = room_list
        .into_iter()
        .map(|c| match (c.room_id, c.last_message) {
            (Some(room_id), Some(last_message)) => Ok(RoomCursor { room_id, last_message }),
            _ => Err(AppError::Validation("each entry needs room_id and last_message".into())),
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(new_messages(&db_pool, user_id, &cursors).await?))
}
