//! Room membership and message model.
//!
//! [`Chat`] owns the storage handle and exposes the account directory, room
//! directory, membership ledger and message log as methods split across the
//! modules below. Every operation takes the caller's [`Identity`] explicitly.

pub mod accounts;
pub mod credentials;
pub mod error;
pub mod membership;
pub mod messages;
pub mod rooms;
pub mod session;
pub mod views;

mod convert;

use std::sync::Arc;

use roomchat_db::Database;
use roomchat_types::events::GatewayEvent;
use uuid::Uuid;

pub use credentials::CredentialHasher;
pub use error::{ChatError, ChatResult};
pub use membership::JoinOutcome;
pub use roomchat_types::models::Identity;
pub use session::SessionKeys;

/// Delivers room-scoped events to live connections.
///
/// `publish` is called while the storage writer is held, so implementations
/// must not block.
pub trait RoomPublisher: Send + Sync {
    /// Returns the number of connections the event was handed to.
    fn publish(&self, room: &str, event: GatewayEvent) -> usize;

    /// Drop every live subscription `account_id` holds on `room` after its
    /// membership is gone. Returns the number of connections unsubscribed.
    fn revoke(&self, account_id: Uuid, username: &str, room: &str) -> usize;
}

pub struct Chat {
    db: Database,
    hasher: CredentialHasher,
    publisher: Arc<dyn RoomPublisher>,
    views: views::DismissedRooms,
}

impl Chat {
    pub fn new(db: Database, hasher: CredentialHasher, publisher: Arc<dyn RoomPublisher>) -> Self {
        Self {
            db,
            hasher,
            publisher,
            views: views::DismissedRooms::default(),
        }
    }
}
