use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use roomchat_core::{Chat, ChatError, ChatResult};
use roomchat_types::events::{GatewayCommand, GatewayEvent};
use roomchat_types::models::Identity;

use crate::dispatcher::Dispatcher;
use crate::state::ConnectionState;

/// One identified gateway connection: its identity, its subscriptions and
/// its queue in the dispatcher. Command failures are reported to this
/// connection only.
pub struct Session {
    chat: Arc<Chat>,
    dispatcher: Dispatcher,
    conn_id: Uuid,
    state: ConnectionState,
}

impl Session {
    /// Register with the dispatcher. Events for this connection arrive on
    /// the returned receiver.
    pub fn open(
        chat: Arc<Chat>,
        dispatcher: Dispatcher,
        identity: Identity,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>) {
        let (conn_id, rx) = dispatcher.register(identity.account_id);
        let state = ConnectionState::Authenticated(identity);
        (
            Self {
                chat,
                dispatcher,
                conn_id,
                state,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn identity(&self) -> Option<Identity> {
        self.state.identity().cloned()
    }

    pub async fn handle(&mut self, cmd: GatewayCommand) {
        self.forget_revoked();

        let Some(identity) = self.identity() else {
            self.reply(GatewayEvent::error("connection is not identified"));
            return;
        };

        match cmd {
            GatewayCommand::Identify { .. } => {
                self.reply(GatewayEvent::error("connection is already identified"));
            }

            GatewayCommand::Join { room, username } => {
                if username.is_some_and(|u| u != identity.username) {
                    warn!(
                        "{} ({}) tried to join {} under another name",
                        identity.username, identity.account_id, room
                    );
                    self.reply(GatewayEvent::error("username does not match session"));
                    return;
                }
                self.subscribe(identity, room).await;
            }

            GatewayCommand::Message { room, message } => {
                let author = identity.clone();
                let code = room.clone();
                let result = blocking(&self.chat, move |chat| chat.append(&author, &code, &message)).await;
                if let Err(e) = result {
                    self.reply_error(&identity, &e);
                }
            }

            GatewayCommand::Leave { room } => {
                if self.state.unsubscribe(&room) && self.dispatcher.unsubscribe(self.conn_id, &room) {
                    info!("{} ({}) unsubscribed from {}", identity.username, identity.account_id, room);
                    self.dispatcher
                        .publish(&room, GatewayEvent::left(&room, &identity.username));
                }
            }
        }
    }

    /// Drop rooms the dispatcher no longer delivers to this connection,
    /// e.g. after the account left the room.
    fn forget_revoked(&mut self) {
        let dispatcher = &self.dispatcher;
        let conn_id = self.conn_id;
        let dropped = self
            .state
            .retain_rooms(|room| dispatcher.is_subscribed(conn_id, room));
        if !dropped.is_empty() {
            debug!("Connection {} lost rooms {:?}", conn_id, dropped);
        }
    }

    /// A text frame that did not parse as a command.
    pub fn handle_malformed(&self) {
        self.reply(GatewayEvent::error("malformed command"));
    }

    async fn subscribe(&mut self, identity: Identity, room: String) {
        let who = identity.clone();
        let code = room.clone();
        match blocking(&self.chat, move |chat| chat.is_member(&who, &code)).await {
            Ok(true) => {}
            Ok(false) => {
                self.reply_error(&identity, &ChatError::NotAMember);
                return;
            }
            Err(e) => {
                self.reply_error(&identity, &e);
                return;
            }
        }

        if let Err(e) = self.state.subscribe(&room) {
            self.reply(GatewayEvent::error(e.to_string()));
            return;
        }

        if self.dispatcher.subscribe(self.conn_id, &room) {
            info!("{} ({}) subscribed to {}", identity.username, identity.account_id, room);
            self.dispatcher
                .publish(&room, GatewayEvent::joined(&room, &identity.username));
        }
    }

    fn reply(&self, event: GatewayEvent) {
        self.dispatcher.send_to(self.conn_id, event);
    }

    fn reply_error(&self, identity: &Identity, err: &ChatError) {
        let message = match err {
            ChatError::Storage(e) => {
                error!("{} ({}) command failed: {:#}", identity.username, identity.account_id, e);
                "internal error".to_string()
            }
            other => {
                debug!("{} ({}) command rejected: {}", identity.username, identity.account_id, other);
                other.to_string()
            }
        };
        self.reply(GatewayEvent::error(message));
    }

    /// Unsubscribe from everything and tell each room the user left.
    pub fn close(mut self) {
        let username = self
            .state
            .identity()
            .map(|identity| identity.username.clone())
            .unwrap_or_default();
        self.state.disconnect();

        for room in self.dispatcher.disconnect(self.conn_id) {
            self.dispatcher
                .publish(&room, GatewayEvent::left(&room, &username));
        }
    }
}

/// Run a storage-bound core call off the async runtime.
async fn blocking<T, F>(chat: &Arc<Chat>, f: F) -> ChatResult<T>
where
    F: FnOnce(&Chat) -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    let chat = chat.clone();
    tokio::task::spawn_blocking(move || f(&chat))
        .await
        .map_err(|e| ChatError::Storage(anyhow!("spawn_blocking join error: {}", e)))?
}
