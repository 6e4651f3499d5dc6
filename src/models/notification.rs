use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Customer,
    Driver,
    Restaurant,
    Admin,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Customer => "customer",
            UserType::Driver => "driver",
            UserType::Restaurant => "restaurant",
            UserType::Admin => "admin",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder,
    NewOrderAvailable,
    OrderStatusUpdated,
    DriverAssigned,
    OrderAssigned,
    DeliveryCompleted,
    OrderCancelled,
    RatingRequest,
}

/// A notification as handed to storage, before it gets an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient_type: UserType,
    pub recipient_id: String,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient_type: UserType,
    pub recipient_id: String,
    pub order_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(record: NewNotification) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: record.kind,
            title: record.title,
            message: record.message,
            recipient_type: record.recipient_type,
            recipient_id: record.recipient_id,
            order_id: record.order_id,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }
}
