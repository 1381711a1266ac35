mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use roomchat_api::{AppState, AppStateInner};
use roomchat_core::{Chat, CredentialHasher, SessionKeys};
use roomchat_gateway::connection;
use roomchat_gateway::dispatcher::Dispatcher;

use crate::config::ServerConfig;

#[derive(Clone)]
struct GatewayState {
    chat: Arc<Chat>,
    dispatcher: Dispatcher,
    keys: Arc<SessionKeys>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomchat=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if config.uses_default_secret() {
        warn!("ROOMCHAT_JWT_SECRET is unset, using the development placeholder");
    }

    // Init database
    let db = roomchat_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    // Shared state
    let dispatcher = Dispatcher::new();
    let chat = Arc::new(Chat::new(
        db,
        CredentialHasher::default(),
        Arc::new(dispatcher.clone()),
    ));
    let keys = Arc::new(SessionKeys::new(&config.jwt_secret, config.token_ttl()));

    let app_state: AppState = Arc::new(AppStateInner {
        chat: chat.clone(),
        keys: keys.clone(),
    });
    let gateway_state = GatewayState {
        chat,
        dispatcher,
        keys,
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = roomchat_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("roomchat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.chat, state.dispatcher, state.keys)
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
