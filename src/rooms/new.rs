use std::collections::BTreeSet;

use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    db::{Room, UserId},
    session::Caller,
    AppError, AppResult,
};

use super::room;

pub const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    title: Option<String>,
    members: Option<Vec<UserId>>,
}

fn validate_title(title: Option<String>) -> AppResult<Option<String>> {
    let Some(title) = title else {
        return Ok(None);
    };

    if title.trim().is_empty() {
        return Err(AppError::Validation("title may not be blank".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title is longer than {MAX_TITLE_LEN} characters"
        )));
    }

    Ok(Some(title))
}

/// Creates a room owned by `owner`. The owner is always a member, and every
/// member starts with an empty read receipt.
pub async fn insert_room(
    db_pool: &SqlitePool,
    owner: UserId,
    title: Option<String>,
    members: Vec<UserId>,
) -> AppResult<Room> {
    let title = validate_title(title)?;

    if let Some(bad) = members.iter().find(|id| **id <= 0) {
        return Err(AppError::Validation(format!("invalid member id {bad}")));
    }
    let members: BTreeSet<UserId> = members.into_iter().chain([owner]).collect();

    let created_at = OffsetDateTime::now_utc();
    let mut tx = db_pool.begin().await?;

    let room_id = sqlx::query("INSERT INTO rooms (title,owner,created_at) VALUES (?,?,?)")
        .bind(&title)
        .bind(owner)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for user_id in &members {
        sqlx::query("INSERT INTO room_members (room_id,user_id) VALUES (?,?)")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO read_receipts (room_id,user_id,last_message) VALUES (?,?,NULL)")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }

    let members = room::members(&mut *tx, room_id).await?;
    tx.commit().await?;

    tracing::info!(room_id, owner, members = members.len(), "room created");

    Ok(Room {
        id: room_id,
        title,
        owner,
        members,
        created_at,
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    Caller(user_id): Caller,
    payload: Result<Json<NewRoomQuery>, JsonRejection>,
) -> AppResult<Json<Room>> {
    let Json(NewRoomQuery { title, members }) = payload?;
    let members = members.ok_or_else(|| AppError::Validation("members is required".into()))?;

    Ok(Json(insert_room(&db_pool, user_id, title, members).await?))
}
