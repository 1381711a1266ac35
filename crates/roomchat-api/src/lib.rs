//! JSON HTTP surface over [`roomchat_core::Chat`].

pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod rooms;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use roomchat_core::{Chat, ChatResult, SessionKeys};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: Arc<Chat>,
    pub keys: Arc<SessionKeys>,
}

/// Public auth routes plus the bearer-protected room routes.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/join", post(rooms::join_room))
        .route("/rooms/{code}", get(rooms::get_room))
        .route("/rooms/{code}/membership", delete(rooms::leave_room))
        .route("/rooms/{code}/dismiss", post(rooms::dismiss_room))
        .route(
            "/rooms/{code}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run a storage-bound core call off the async runtime.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> ChatResult<T>
where
    F: FnOnce(&Chat) -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || f(&chat))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}
