use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use roomchat_core::RoomPublisher;
use roomchat_types::events::GatewayEvent;

/// Tracks live connections and which rooms each one is subscribed to, and
/// fans room events out to those connections.
///
/// All methods are synchronous: `publish` runs while the storage writer is
/// held, and every send is a non-blocking push onto a per-connection queue.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<Mutex<DispatcherInner>>,
}

/// A registered connection: the account it speaks for and its queue.
struct Connection {
    account_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Per-connection send channels: conn_id -> connection
    connections: HashMap<Uuid, Connection>,

    /// Room subscriptions: room code -> conn_ids
    rooms: HashMap<String, HashSet<Uuid>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatcherInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection for `account_id`. Returns its id and the queue
    /// its events land on.
    pub fn register(&self, account_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .connections
            .insert(conn_id, Connection { account_id, tx });
        (conn_id, rx)
    }

    /// Subscribe a registered connection to a room. Returns true only if it
    /// was not already subscribed.
    pub fn subscribe(&self, conn_id: Uuid, room: &str) -> bool {
        let mut inner = self.lock();
        if !inner.connections.contains_key(&conn_id) {
            return false;
        }
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id)
    }

    /// Returns true if the connection had been subscribed.
    pub fn unsubscribe(&self, conn_id: Uuid, room: &str) -> bool {
        let mut inner = self.lock();
        let Some(subscribers) = inner.rooms.get_mut(room) else {
            return false;
        };
        let removed = subscribers.remove(&conn_id);
        if subscribers.is_empty() {
            inner.rooms.remove(room);
        }
        removed
    }

    pub fn is_subscribed(&self, conn_id: Uuid, room: &str) -> bool {
        self.lock()
            .rooms
            .get(room)
            .is_some_and(|subscribers| subscribers.contains(&conn_id))
    }

    /// Unsubscribe every connection of `account_id` from `room`. The room,
    /// revoked connections included, is told the user left. Returns the
    /// number of connections unsubscribed.
    pub fn revoke(&self, account_id: Uuid, username: &str, room: &str) -> usize {
        let mut inner = self.lock();
        let DispatcherInner { connections, rooms } = &mut *inner;
        let Some(subscribers) = rooms.get_mut(room) else {
            return 0;
        };

        let revoked: Vec<Uuid> = subscribers
            .iter()
            .copied()
            .filter(|conn_id| {
                connections
                    .get(conn_id)
                    .is_some_and(|conn| conn.account_id == account_id)
            })
            .collect();
        if revoked.is_empty() {
            return 0;
        }

        let notice = GatewayEvent::left(room, username);
        for conn in subscribers.iter().filter_map(|conn_id| connections.get(conn_id)) {
            let _ = conn.tx.send(notice.clone());
        }

        for conn_id in &revoked {
            subscribers.remove(conn_id);
        }
        if subscribers.is_empty() {
            rooms.remove(room);
        }
        revoked.len()
    }

    /// Forget a connection entirely. Returns the rooms it was subscribed to.
    pub fn disconnect(&self, conn_id: Uuid) -> Vec<String> {
        let mut inner = self.lock();
        inner.connections.remove(&conn_id);

        let mut left = Vec::new();
        inner.rooms.retain(|room, subscribers| {
            if subscribers.remove(&conn_id) {
                left.push(room.clone());
            }
            !subscribers.is_empty()
        });
        left.sort();
        left
    }

    /// Send an event to a single connection.
    pub fn send_to(&self, conn_id: Uuid, event: GatewayEvent) -> bool {
        match self.lock().connections.get(&conn_id) {
            Some(conn) => conn.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Send an event to every connection subscribed to `room`. Connections
    /// whose queue is gone are skipped; `disconnect` cleans them up.
    pub fn publish(&self, room: &str, event: GatewayEvent) -> usize {
        let inner = self.lock();
        let Some(subscribers) = inner.rooms.get(room) else {
            return 0;
        };

        subscribers
            .iter()
            .filter_map(|conn_id| inner.connections.get(conn_id))
            .filter(|conn| conn.tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.lock().rooms.get(room).map_or(0, HashSet::len)
    }
}

impl RoomPublisher for Dispatcher {
    fn publish(&self, room: &str, event: GatewayEvent) -> usize {
        Dispatcher::publish(self, room, event)
    }

    fn revoke(&self, account_id: Uuid, username: &str, room: &str) -> usize {
        Dispatcher::revoke(self, account_id, username, room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(room: &str, n: usize) -> GatewayEvent {
        GatewayEvent::Notice {
            room: room.to_string(),
            message: format!("event {n}"),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn subscribe_is_idempotent() {
        let dispatcher = Dispatcher::new();
        let (conn, mut rx) = dispatcher.register(Uuid::new_v4());

        assert!(dispatcher.subscribe(conn, "7QXK"));
        assert!(!dispatcher.subscribe(conn, "7QXK"));
        assert_eq!(dispatcher.subscriber_count("7QXK"), 1);

        assert_eq!(dispatcher.publish("7QXK", notice("7QXK", 1)), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn unknown_connection_cannot_subscribe() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.subscribe(Uuid::new_v4(), "7QXK"));
        assert_eq!(dispatcher.subscriber_count("7QXK"), 0);
    }

    #[test]
    fn subscriber_sees_only_its_rooms_in_publish_order() {
        let dispatcher = Dispatcher::new();
        let (lobby_conn, mut lobby_rx) = dispatcher.register(Uuid::new_v4());
        let (games_conn, mut games_rx) = dispatcher.register(Uuid::new_v4());
        dispatcher.subscribe(lobby_conn, "LOBY");
        dispatcher.subscribe(games_conn, "GAME");

        for n in 0..5 {
            dispatcher.publish("LOBY", notice("LOBY", n));
            dispatcher.publish("GAME", notice("GAME", n));
        }

        let lobby: Vec<_> = (0..5).map(|n| notice("LOBY", n)).collect();
        let games: Vec<_> = (0..5).map(|n| notice("GAME", n)).collect();
        assert_eq!(drain(&mut lobby_rx), lobby);
        assert_eq!(drain(&mut games_rx), games);
    }

    #[test]
    fn publish_to_empty_room_reaches_nobody() {
        let dispatcher = Dispatcher::new();
        let (_conn, mut rx) = dispatcher.register(Uuid::new_v4());
        assert_eq!(dispatcher.publish("NONE", notice("NONE", 0)), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let (conn, mut rx) = dispatcher.register(Uuid::new_v4());
        dispatcher.subscribe(conn, "7QXK");

        assert!(dispatcher.unsubscribe(conn, "7QXK"));
        assert!(!dispatcher.unsubscribe(conn, "7QXK"));
        dispatcher.publish("7QXK", notice("7QXK", 0));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn disconnect_drops_every_subscription() {
        let dispatcher = Dispatcher::new();
        let (conn, _rx) = dispatcher.register(Uuid::new_v4());
        let (other, _other_rx) = dispatcher.register(Uuid::new_v4());
        dispatcher.subscribe(conn, "LOBY");
        dispatcher.subscribe(conn, "GAME");
        dispatcher.subscribe(other, "LOBY");

        assert_eq!(dispatcher.disconnect(conn), ["GAME", "LOBY"]);
        assert_eq!(dispatcher.subscriber_count("LOBY"), 1);
        assert_eq!(dispatcher.subscriber_count("GAME"), 0);
        assert!(!dispatcher.send_to(conn, notice("LOBY", 0)));
    }

    #[test]
    fn dropped_receiver_is_skipped() {
        let dispatcher = Dispatcher::new();
        let (gone, gone_rx) = dispatcher.register(Uuid::new_v4());
        let (live, mut live_rx) = dispatcher.register(Uuid::new_v4());
        dispatcher.subscribe(gone, "7QXK");
        dispatcher.subscribe(live, "7QXK");
        drop(gone_rx);

        assert_eq!(dispatcher.publish("7QXK", notice("7QXK", 0)), 1);
        assert_eq!(drain(&mut live_rx).len(), 1);
    }

    #[test]
    fn revoke_drops_only_that_accounts_connections() {
        let dispatcher = Dispatcher::new();
        let bob = Uuid::new_v4();
        let (phone, mut phone_rx) = dispatcher.register(bob);
        let (laptop, mut laptop_rx) = dispatcher.register(bob);
        let (alice, mut alice_rx) = dispatcher.register(Uuid::new_v4());
        for conn in [phone, laptop, alice] {
            dispatcher.subscribe(conn, "7QXK");
        }
        dispatcher.subscribe(phone, "GAME");

        assert_eq!(dispatcher.revoke(bob, "bob", "7QXK"), 2);

        let left = GatewayEvent::left("7QXK", "bob");
        assert_eq!(drain(&mut phone_rx), [left.clone()]);
        assert_eq!(drain(&mut laptop_rx), [left.clone()]);
        assert_eq!(drain(&mut alice_rx), [left]);

        dispatcher.publish("7QXK", notice("7QXK", 1));
        assert!(drain(&mut phone_rx).is_empty());
        assert!(drain(&mut laptop_rx).is_empty());
        assert_eq!(drain(&mut alice_rx).len(), 1);
        assert!(dispatcher.is_subscribed(phone, "GAME"));
        assert!(!dispatcher.is_subscribed(phone, "7QXK"));
    }

    #[test]
    fn revoke_without_subscriptions_sends_nothing() {
        let dispatcher = Dispatcher::new();
        let (alice, mut alice_rx) = dispatcher.register(Uuid::new_v4());
        dispatcher.subscribe(alice, "7QXK");

        assert_eq!(dispatcher.revoke(Uuid::new_v4(), "bob", "7QXK"), 0);
        assert_eq!(dispatcher.revoke(Uuid::new_v4(), "bob", "NONE"), 0);
        assert!(drain(&mut alice_rx).is_empty());
    }
}
