mod msg;
mod new;
mod receipts;
mod room;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use msg::{insert_message, messages_after, new_messages, RoomCursor};
pub use new::{insert_room, MAX_TITLE_LEN};
pub use receipts::{last_read, mark_as_read};
pub use room::{get_room, rooms_of, RoomSummary};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/add_room", post(new::new_room))
        .route("/rooms", get(room::list_rooms))
        .route("/rooms/{room_id}/ws", get(ws::room_ws))
        .route("/new_message", post(msg::send_msg))
        .route("/get_new_messages", post(msg::get_new_messages))
        .route("/mark_as_read", post(receipts::mark_as_read_handler))
}
