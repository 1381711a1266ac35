use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use roomchat_core::{Chat, SessionKeys};
use roomchat_types::events::{GatewayCommand, GatewayEvent};
use roomchat_types::models::Identity;

use crate::dispatcher::Dispatcher;
use crate::session::Session;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket has to send `identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket connection from identify handshake to disconnect.
pub async fn handle_connection(
    socket: WebSocket,
    chat: Arc<Chat>,
    dispatcher: Dispatcher,
    keys: Arc<SessionKeys>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with a session token
    let Some(identity) = wait_for_identify(&mut receiver, &keys).await else {
        warn!("WebSocket client failed to identify, closing");
        let _ = send_event(&mut sender, &GatewayEvent::error("identify failed")).await;
        return;
    };

    info!("{} ({}) connected to gateway", identity.username, identity.account_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id: identity.account_id,
        username: identity.username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, chat, dispatcher, identity).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    chat: Arc<Chat>,
    dispatcher: Dispatcher,
    identity: Identity,
) {
    let username = identity.username.clone();
    let account_id = identity.account_id;
    let (mut session, mut events_rx) = Session::open(chat, dispatcher, identity);

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward this connection's queued events to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client on this task so the session outlives the loop
    let recv_loop = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username,
                            account_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        session.handle_malformed();
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    // Wait for either side to finish
    tokio::select! {
        _ = &mut send_task => {}
        _ = recv_loop => {}
    }
    send_task.abort();

    session.close();
    info!("{} ({}) disconnected from gateway", username, account_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    keys: &SessionKeys,
) -> Option<Identity> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return keys.verify(&token);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
