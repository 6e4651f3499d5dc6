use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::driver::GeoPoint;
use crate::models::notification::UserType;
use crate::models::order::OrderStatus;

/// Frames accepted from WebSocket clients.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Register { user_id: String, user_type: UserType },
    #[serde(rename_all = "camelCase")]
    DriverLocation { user_id: String, data: GeoPoint },
    OrderUpdate { data: OrderUpdateData },
    Notification { data: DirectNotification },
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdateData {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub restaurant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectNotification {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub recipient_type: Option<UserType>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    Registered,
    Pong,
    Notification,
    DriverLocationUpdate,
    DriverLocationUpdated,
    OrderStatusChanged,
    DriverAssigned,
    OrderAssigned,
    DeliveryCompleted,
    OrderCancelled,
    RatingRequest,
    SystemNotification,
}

/// Frames pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub event: ServerEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ServerMessage {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            title: None,
            message: None,
            data: None,
            timestamp: None,
        }
    }

    pub fn titled(event: ServerEvent, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event).title(title).message(message)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ClientMessage, ServerEvent, ServerMessage};
    use crate::models::notification::UserType;
    use crate::models::order::OrderStatus;

    #[test]
    fn register_frame_uses_top_level_user_fields() {
        let frame: ClientMessage = serde_json::from_value(json!({
            "type": "register",
            "userId": "u1",
            "userType": "driver"
        }))
        .unwrap();

        assert_eq!(
            frame,
            ClientMessage::Register {
                user_id: "u1".to_string(),
                user_type: UserType::Driver
            }
        );
    }

    #[test]
    fn unrecognised_type_parses_as_unknown() {
        let frame: ClientMessage =
            serde_json::from_value(json!({ "type": "typing", "data": { "x": 1 } })).unwrap();
        assert_eq!(frame, ClientMessage::Unknown);
    }

    #[test]
    fn order_update_carries_closed_status() {
        let frame: ClientMessage = serde_json::from_value(json!({
            "type": "order_update",
            "data": { "orderId": "o1", "status": "preparing", "customerId": "c1" }
        }))
        .unwrap();

        match frame {
            ClientMessage::OrderUpdate { data } => {
                assert_eq!(data.status, OrderStatus::Preparing);
                assert_eq!(data.customer_id.as_deref(), Some("c1"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn server_frames_omit_empty_fields() {
        let value = serde_json::to_value(ServerMessage::new(ServerEvent::Pong)).unwrap();
        assert_eq!(value, json!({ "type": "pong" }));
    }
}
