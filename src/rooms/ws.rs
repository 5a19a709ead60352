use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};

use crate::{
    db::{Message, RoomId, UserId, NO_MESSAGES_READ},
    session::Caller,
    AppError, AppResult,
};

use super::{msg, room};

const OUTBOX_CAPACITY: usize = 64;

#[derive(Deserialize)]
struct LiveMessage {
    content: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<RoomId>,
    State(db_pool): State<SqlitePool>,
    State(tx): State<broadcast::Sender<Message>>,
    Caller(user_id): Caller,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if !room::is_member(&db_pool, room_id, user_id).await? {
        return Err(AppError::Forbidden(format!("not a member of room {room_id}")));
    }

    Ok(ws.on_upgrade(move |stream| live(stream, db_pool, tx, room_id, user_id)))
}

/// Sends the room's history, then every new message of the room. Posts that
/// fail come back to the sender as `{"error": ...}` frames.
async fn live(
    stream: WebSocket,
    db_pool: SqlitePool,
    tx: broadcast::Sender<Message>,
    room_id: RoomId,
    user_id: UserId,
) {
    tracing::debug!(room_id, user_id, "live connection opened");

    // subscribe before reading history so nothing falls in between
    let mut rx = tx.subscribe();
    let (mut sender, mut receiver) = stream.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let mut write_task = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if sender.send(WsMessage::text(text)).await.is_err() {
                break;
            }
        }
    });

    let history = match msg::messages_after(&db_pool, room_id, NO_MESSAGES_READ).await {
        Ok(history) => history,
        Err(err) => {
            tracing::error!(room_id, error = %err, "failed to load room history");
            Vec::new()
        }
    };
    let history_end = history.last().map_or(NO_MESSAGES_READ, |m| m.id);
    for message in &history {
        let Ok(text) = serde_json::to_string(message) else {
            continue;
        };
        if outbox.send(text).await.is_err() {
            return;
        }
    }

    let forward_outbox = outbox.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            let message = match rx.recv().await {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(room_id, skipped, "live receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            // already delivered as history
            if message.room != room_id || message.id <= history_end {
                continue;
            }

            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if forward_outbox.send(text).await.is_err() {
                break;
            }
        }
    });

    let mut post_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let reply = match serde_json::from_str::<LiveMessage>(text.as_str()) {
                Ok(LiveMessage { content }) => {
                    match msg::insert_message(&db_pool, &tx, user_id, room_id, content).await {
                        Ok(_) => continue,
                        Err(err) => err.public_message(),
                    }
                }
                Err(_) => "expected {\"content\": string}".to_owned(),
            };

            tracing::debug!(room_id, user_id, error = %reply, "live post rejected");
            if outbox.send(json!({ "error": reply }).to_string()).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => post_task.abort(),
        _ = &mut post_task => forward_task.abort(),
        _ = &mut write_task => {
            forward_task.abort();
            post_task.abort();
        }
    };
    write_task.abort();

    tracing::debug!(room_id, user_id, "live connection closed");
}
