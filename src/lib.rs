pub mod appresult;
pub mod config;
pub mod db;
pub mod rooms;
pub mod session;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub tx: broadcast::Sender<db::Message>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, broadcast_capacity: usize) -> Self {
        Self {
            db_pool,
            tx: broadcast::channel(broadcast_capacity).0,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().nest("/chat", rooms::router())
}

/// Wraps `router` with sessions, request tracing and CORS.
pub fn app(router: Router<AppState>, state: AppState, session_expiry: time::Duration) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(session_expiry));

    router
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
