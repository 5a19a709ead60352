use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use time::OffsetDateTime;

use crate::{
    db::{MessageId, Room, RoomId, UserId},
    session::Caller,
    AppResult,
};

use super::receipts;

#[derive(FromRow)]
struct RoomRow {
    id: RoomId,
    title: Option<String>,
    owner: UserId,
    created_at: OffsetDateTime,
}

/// A room as seen by one member, with that member's read pointer.
#[derive(Debug, Serialize)]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: Room,
    pub last_message: MessageId,
}

pub(crate) async fn members<'e>(
    executor: impl SqliteExecutor<'e>,
    room_id: RoomId,
) -> sqlx::Result<Vec<UserId>> {
    sqlx::query_scalar("SELECT user_id FROM room_members WHERE room_id=? ORDER BY user_id")
        .bind(room_id)
        .fetch_all(executor)
        .await
}

pub(crate) async fn exists(db_pool: &SqlitePool, room_id: RoomId) -> sqlx::Result<bool> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT 1 FROM rooms WHERE id=?")
        .bind(room_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Membership is read from the member set itself, so empty rooms are covered too.
pub(crate) async fn is_member(
    db_pool: &SqlitePool,
    room_id: RoomId,
    user_id: UserId,
) -> sqlx::Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM room_members WHERE room_id=? AND user_id=?")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;
    Ok(found.is_some())
}

pub async fn get_room(db_pool: &SqlitePool, room_id: RoomId) -> AppResult<Option<Room>> {
    let Some(row): Option<RoomRow> =
        sqlx::query_as("SELECT id,title,owner,created_at FROM rooms WHERE id=?")
            .bind(room_id)
            .fetch_optional(db_pool)
            .await?
    else {
        return Ok(None);
    };

    let members = members(db_pool, row.id).await?;
    Ok(Some(Room {
        id: row.id,
        title: row.title,
        owner: row.owner,
        members,
        created_at: row.created_at,
    }))
}

pub async fn rooms_of(db_pool: &SqlitePool, user_id: UserId) -> AppResult<Vec<RoomSummary>> {
    let rows: Vec<RoomRow> = sqlx::query_as(
        "SELECT r.id,r.title,r.owner,r.created_at FROM rooms r \
         JOIN room_members m ON m.room_id = r.id \
         WHERE m.user_id=? ORDER BY r.id",
    )
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for row in rows {
        let members = members(db_pool, row.id).await?;
        let last_message = receipts::last_read(db_pool, row.id, user_id).await?;
        rooms.push(RoomSummary {
            room: Room {
                id: row.id,
                title: row.title,
                owner: row.owner,
                members,
                created_at: row.created_at,
            },
            last_message,
        });
    }

    Ok(rooms)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    Caller(user_id): Caller,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(rooms_of(&db_pool, user_id).await?))
}
