use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::notification::UserType;
use crate::observability::metrics::Metrics;
use crate::realtime::messages::{
    ClientMessage, DirectNotification, OrderUpdateData, ServerEvent, ServerMessage,
};
use crate::schedule::PeriodicTask;

/// What the registry asks a connection's writer task to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedUser {
    pub user_id: String,
    pub user_type: Option<UserType>,
    pub connection_count: usize,
}

struct Client {
    sender: OutboundSender,
    user: Option<(String, UserType)>,
    is_alive: bool,
    location: Option<GeoPoint>,
}

impl Client {
    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    fn push(&self, outbound: Outbound) -> bool {
        self.is_open() && self.sender.send(outbound).is_ok()
    }
}

/// Both indices live under one lock so they can only change together.
#[derive(Default)]
struct Connections {
    clients: HashMap<ConnectionId, Client>,
    by_user: HashMap<String, HashSet<ConnectionId>>,
}

impl Connections {
    fn remove(&mut self, id: &ConnectionId) -> Option<Client> {
        let client = self.clients.remove(id)?;

        if let Some((user_id, _)) = &client.user {
            if let Some(ids) = self.by_user.get_mut(user_id) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_user.remove(user_id);
                }
            }
        }

        Some(client)
    }
}

/// Registry of live WebSocket connections.
pub struct WebSocketManager {
    connections: Mutex<Connections>,
    driver_locations: DashMap<String, GeoPoint>,
    metrics: Metrics,
}

impl WebSocketManager {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            connections: Mutex::new(Connections::default()),
            driver_locations: DashMap::new(),
            metrics,
        }
    }

    /// Stores an anonymous connection and returns its fresh id.
    pub fn accept(&self, sender: OutboundSender) -> ConnectionId {
        let id = ConnectionId::generate();
        let mut connections = self.connections.lock();
        connections.clients.insert(
            id,
            Client {
                sender,
                user: None,
                is_alive: true,
                location: None,
            },
        );
        self.metrics
            .ws_connections
            .set(connections.clients.len() as i64);
        drop(connections);

        info!(connection_id = %id, "client connected");
        id
    }

    pub fn disconnect(&self, id: &ConnectionId) {
        let mut connections = self.connections.lock();
        let removed = connections.remove(id);
        self.metrics
            .ws_connections
            .set(connections.clients.len() as i64);
        drop(connections);

        if let Some(client) = removed {
            match client.user {
                Some((user_id, _)) => info!(connection_id = %id, user_id = %user_id, "client disconnected"),
                None => info!(connection_id = %id, "client disconnected"),
            }
        }
    }

    /// Parses and dispatches one inbound text frame. Bad frames are logged and dropped.
    pub fn handle_text(&self, id: &ConnectionId, raw: &str) {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => self.handle_message(id, message),
            Err(err) => warn!(connection_id = %id, error = %err, "ignoring malformed frame"),
        }
    }

    pub fn handle_message(&self, id: &ConnectionId, message: ClientMessage) {
        if !self.connections.lock().clients.contains_key(id) {
            return;
        }

        match message {
            ClientMessage::Register { user_id, user_type } => self.register(id, user_id, user_type),
            ClientMessage::DriverLocation { user_id, data } => {
                self.set_connection_location(id, data);
                self.update_driver_location(&user_id, data);
            }
            ClientMessage::OrderUpdate { data } => self.broadcast_order_update(data),
            ClientMessage::Notification { data } => self.route_notification(data),
            ClientMessage::Ping => {
                self.mark_alive(id);
                self.send_to_connection(id, &ServerMessage::new(ServerEvent::Pong));
            }
            ClientMessage::Unknown => debug!(connection_id = %id, "ignoring unknown frame type"),
        }
    }

    /// Confirms the peer answered; called on pong and other liveness signals.
    pub fn mark_alive(&self, id: &ConnectionId) {
        if let Some(client) = self.connections.lock().clients.get_mut(id) {
            client.is_alive = true;
        }
    }

    fn register(&self, id: &ConnectionId, user_id: String, user_type: UserType) {
        {
            let mut connections = self.connections.lock();
            let Some(client) = connections.clients.get_mut(id) else {
                return;
            };
            let previous = client.user.replace((user_id.clone(), user_type));

            if let Some((old_user, _)) = previous {
                if old_user != user_id {
                    if let Some(ids) = connections.by_user.get_mut(&old_user) {
                        ids.remove(id);
                        if ids.is_empty() {
                            connections.by_user.remove(&old_user);
                        }
                    }
                }
            }
            connections
                .by_user
                .entry(user_id.clone())
                .or_default()
                .insert(*id);
        }

        self.send_to_connection(
            id,
            &ServerMessage::new(ServerEvent::Registered)
                .message("registered for live notifications"),
        );
        info!(connection_id = %id, user_id = %user_id, user_type = %user_type, "user registered");
    }

    fn set_connection_location(&self, id: &ConnectionId, location: GeoPoint) {
        if let Some(client) = self.connections.lock().clients.get_mut(id) {
            if matches!(client.user, Some((_, UserType::Driver))) {
                client.location = Some(location);
            }
        }
    }

    /// Records a driver's position and broadcasts it to every connection.
    pub fn update_driver_location(&self, driver_id: &str, location: GeoPoint) {
        self.driver_locations.insert(driver_id.to_string(), location);

        self.broadcast(
            &ServerMessage::new(ServerEvent::DriverLocationUpdate)
                .data(json!({ "driverId": driver_id, "location": location }))
                .stamped(),
        );
    }

    fn broadcast_order_update(&self, update: OrderUpdateData) {
        let message = ServerMessage::new(ServerEvent::OrderStatusChanged)
            .message(update.status.phrase())
            .data(json!({
                "orderId": update.order_id,
                "status": update.status,
                "customerId": update.customer_id,
                "driverId": update.driver_id,
                "restaurantId": update.restaurant_id,
            }))
            .stamped();

        for user_id in [&update.customer_id, &update.driver_id, &update.restaurant_id]
            .into_iter()
            .flatten()
        {
            self.send_to_user(user_id, &message);
        }

        self.broadcast(&message);
    }

    fn route_notification(&self, notification: DirectNotification) {
        let mut message = ServerMessage::new(ServerEvent::Notification).stamped();
        message.title = notification.title.clone();
        message.message = notification.message.clone();
        message.data = serde_json::to_value(&notification).ok();

        match (&notification.recipient_id, notification.recipient_type) {
            (Some(recipient_id), _) => {
                self.send_to_user(recipient_id, &message);
            }
            (None, Some(user_type)) => {
                self.broadcast_to_user_type(user_type, &message);
            }
            (None, None) => debug!("notification frame without recipient dropped"),
        }
    }

    /// Delivers to every connection of `user_id`. Returns how many were reached;
    /// zero when the user is not connected.
    pub fn send_to_user(&self, user_id: &str, message: &ServerMessage) -> usize {
        let Some(text) = encode(message) else {
            return 0;
        };

        let connections = self.connections.lock();
        let Some(ids) = connections.by_user.get(user_id) else {
            return 0;
        };

        ids.iter()
            .filter_map(|id| connections.clients.get(id))
            .filter(|client| client.push(Outbound::Text(text.clone())))
            .count()
    }

    pub fn send_to_connection(&self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(text) = encode(message) else {
            return false;
        };

        self.connections
            .lock()
            .clients
            .get(id)
            .is_some_and(|client| client.push(Outbound::Text(text)))
    }

    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        self.fan_out(message, |_| true)
    }

    pub fn broadcast_to_user_type(&self, user_type: UserType, message: &ServerMessage) -> usize {
        self.fan_out(message, |client| {
            matches!(&client.user, Some((_, kind)) if *kind == user_type)
        })
    }

    fn fan_out(&self, message: &ServerMessage, include: impl Fn(&Client) -> bool) -> usize {
        let Some(text) = encode(message) else {
            return 0;
        };

        self.connections
            .lock()
            .clients
            .values()
            .filter(|client| include(client))
            .filter(|client| client.push(Outbound::Text(text.clone())))
            .count()
    }

    pub fn connected_users(&self) -> Vec<ConnectedUser> {
        let connections = self.connections.lock();
        let mut users: Vec<ConnectedUser> = connections
            .by_user
            .iter()
            .map(|(user_id, ids)| ConnectedUser {
                user_id: user_id.clone(),
                user_type: ids
                    .iter()
                    .find_map(|id| connections.clients.get(id))
                    .and_then(|client| client.user.as_ref().map(|(_, kind)| *kind)),
                connection_count: ids.len(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn driver_location(&self, driver_id: &str) -> Option<GeoPoint> {
        self.driver_locations.get(driver_id).map(|entry| *entry.value())
    }

    pub fn connection_location(&self, id: &ConnectionId) -> Option<GeoPoint> {
        self.connections
            .lock()
            .clients
            .get(id)
            .and_then(|client| client.location)
    }

    pub fn active_connections(&self) -> usize {
        self.connections.lock().clients.len()
    }

    /// One liveness pass: evicts connections that missed the previous ping and
    /// pings the rest. Returns the evicted ids.
    pub fn sweep(&self) -> Vec<ConnectionId> {
        let mut connections = self.connections.lock();

        let dead: Vec<ConnectionId> = connections
            .clients
            .iter()
            .filter(|(_, client)| !client.is_alive)
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            if let Some(client) = connections.remove(id) {
                let _ = client.sender.send(Outbound::Close);
            }
        }

        for client in connections.clients.values_mut() {
            client.is_alive = false;
            client.push(Outbound::Ping);
        }

        self.metrics
            .ws_connections
            .set(connections.clients.len() as i64);
        drop(connections);

        for id in &dead {
            warn!(connection_id = %id, "evicting unresponsive connection");
        }
        dead
    }

    pub fn start_heartbeat(self: Arc<Self>, period: Duration) -> PeriodicTask {
        PeriodicTask::spawn("ws-heartbeat", period, move || {
            let manager = self.clone();
            async move {
                manager.sweep();
            }
        })
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(error = %err, "failed to serialize server message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::{ConnectionId, Outbound, WebSocketManager};
    use crate::models::driver::GeoPoint;
    use crate::models::notification::UserType;
    use crate::observability::metrics::Metrics;
    use crate::realtime::messages::{ServerEvent, ServerMessage};

    fn manager() -> WebSocketManager {
        WebSocketManager::new(Metrics::new())
    }

    fn connect(manager: &WebSocketManager) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (manager.accept(tx), rx)
    }

    fn register(manager: &WebSocketManager, id: &ConnectionId, user: &str, kind: &str) {
        manager.handle_text(
            id,
            &json!({ "type": "register", "userId": user, "userType": kind }).to_string(),
        );
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Text(text) = outbound {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    #[test]
    fn register_binds_user_and_acknowledges() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);

        register(&manager, &id, "c1", "customer");

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "registered");

        let users = manager.connected_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "c1");
        assert_eq!(users[0].user_type, Some(UserType::Customer));
        assert_eq!(users[0].connection_count, 1);
    }

    #[test]
    fn send_to_user_reaches_every_device() {
        let manager = manager();
        let (phone, mut phone_rx) = connect(&manager);
        let (laptop, mut laptop_rx) = connect(&manager);
        let (_anon, mut anon_rx) = connect(&manager);
        register(&manager, &phone, "c1", "customer");
        register(&manager, &laptop, "c1", "customer");
        drain(&mut phone_rx);
        drain(&mut laptop_rx);

        let reached = manager.send_to_user(
            "c1",
            &ServerMessage::titled(ServerEvent::Notification, "hi", "there"),
        );

        assert_eq!(reached, 2);
        assert_eq!(drain(&mut phone_rx).len(), 1);
        assert_eq!(drain(&mut laptop_rx).len(), 1);
        assert!(drain(&mut anon_rx).is_empty());
    }

    #[test]
    fn send_to_unknown_user_is_a_noop() {
        let manager = manager();
        let reached = manager.send_to_user("ghost", &ServerMessage::new(ServerEvent::Pong));
        assert_eq!(reached, 0);
    }

    #[test]
    fn closed_connection_is_skipped_silently() {
        let manager = manager();
        let (id, rx) = connect(&manager);
        drop(rx);

        assert!(!manager.send_to_connection(&id, &ServerMessage::new(ServerEvent::Pong)));
        assert_eq!(manager.broadcast(&ServerMessage::new(ServerEvent::Pong)), 0);
    }

    #[test]
    fn broadcast_to_user_type_filters_by_role() {
        let manager = manager();
        let (driver, mut driver_rx) = connect(&manager);
        let (customer, mut customer_rx) = connect(&manager);
        register(&manager, &driver, "d1", "driver");
        register(&manager, &customer, "c1", "customer");
        drain(&mut driver_rx);
        drain(&mut customer_rx);

        let reached = manager.broadcast_to_user_type(
            UserType::Driver,
            &ServerMessage::titled(ServerEvent::SystemNotification, "shift", "starts soon"),
        );

        assert_eq!(reached, 1);
        assert_eq!(drain(&mut driver_rx).len(), 1);
        assert!(drain(&mut customer_rx).is_empty());
    }

    #[test]
    fn ping_frame_gets_pong() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);

        manager.handle_text(&id, r#"{"type":"ping"}"#);

        let frames = drain(&mut rx);
        assert_eq!(frames, vec![json!({ "type": "pong" })]);
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);

        manager.handle_text(&id, "not json");
        manager.handle_text(&id, r#"{"type":"typing"}"#);

        assert!(drain(&mut rx).is_empty());
        assert_eq!(manager.active_connections(), 1);
    }

    #[test]
    fn driver_location_frame_is_stored_and_broadcast() {
        let manager = manager();
        let (driver, mut driver_rx) = connect(&manager);
        let (_watcher, mut watcher_rx) = connect(&manager);
        register(&manager, &driver, "d1", "driver");
        drain(&mut driver_rx);

        manager.handle_text(
            &driver,
            &json!({
                "type": "driver_location",
                "userId": "d1",
                "data": { "lat": 15.35, "lng": 44.2 }
            })
            .to_string(),
        );

        let expected = GeoPoint {
            lat: 15.35,
            lng: 44.2,
        };
        assert_eq!(manager.driver_location("d1"), Some(expected));
        assert_eq!(manager.connection_location(&driver), Some(expected));

        let frames = drain(&mut watcher_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "driver_location_update");
        assert_eq!(frames[0]["data"]["driverId"], "d1");
    }

    #[test]
    fn order_update_reaches_parties_and_everyone() {
        let manager = manager();
        let (customer, mut customer_rx) = connect(&manager);
        let (_other, mut other_rx) = connect(&manager);
        register(&manager, &customer, "c1", "customer");
        drain(&mut customer_rx);

        manager.handle_text(
            &customer,
            &json!({
                "type": "order_update",
                "data": { "orderId": "o1", "status": "on_way", "customerId": "c1" }
            })
            .to_string(),
        );

        let customer_frames = drain(&mut customer_rx);
        assert_eq!(customer_frames.len(), 2);
        assert_eq!(customer_frames[0]["message"], "on the way");
        assert_eq!(drain(&mut other_rx).len(), 1);
    }

    #[test]
    fn notification_frame_without_id_targets_role() {
        let manager = manager();
        let (restaurant, mut restaurant_rx) = connect(&manager);
        let (driver, mut driver_rx) = connect(&manager);
        register(&manager, &restaurant, "r1", "restaurant");
        register(&manager, &driver, "d1", "driver");
        drain(&mut restaurant_rx);
        drain(&mut driver_rx);

        manager.handle_text(
            &driver,
            &json!({
                "type": "notification",
                "data": { "recipientType": "restaurant", "title": "late", "message": "5 min" }
            })
            .to_string(),
        );

        let frames = drain(&mut restaurant_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["title"], "late");
        assert!(drain(&mut driver_rx).is_empty());
    }

    #[test]
    fn silent_connection_is_evicted_from_both_maps() {
        let manager = manager();
        let (id, mut rx) = connect(&manager);
        register(&manager, &id, "d1", "driver");

        assert!(manager.sweep().is_empty());
        assert!(manager.sweep().contains(&id));

        assert_eq!(manager.active_connections(), 0);
        assert!(manager.connected_users().is_empty());

        let mut saw_ping = false;
        let mut saw_close = false;
        while let Ok(outbound) = rx.try_recv() {
            saw_ping |= outbound == Outbound::Ping;
            saw_close |= outbound == Outbound::Close;
        }
        assert!(saw_ping && saw_close);
    }

    #[test]
    fn pong_keeps_connection_alive_across_sweeps() {
        let manager = manager();
        let (id, _rx) = connect(&manager);

        for _ in 0..3 {
            assert!(manager.sweep().is_empty());
            manager.mark_alive(&id);
        }

        assert_eq!(manager.active_connections(), 1);
    }

    #[test]
    fn disconnect_cleans_user_index() {
        let manager = manager();
        let (first, _rx1) = connect(&manager);
        let (second, _rx2) = connect(&manager);
        register(&manager, &first, "c1", "customer");
        register(&manager, &second, "c1", "customer");

        manager.disconnect(&first);
        assert_eq!(manager.connected_users()[0].connection_count, 1);

        manager.disconnect(&second);
        assert!(manager.connected_users().is_empty());
    }
}
