use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OnWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Customer-facing phrase used by status-change notifications.
    pub fn phrase(self) -> &'static str {
        match self {
            OrderStatus::Pending => "order received",
            OrderStatus::Confirmed => "confirmed by restaurant",
            OrderStatus::Preparing => "being prepared",
            OrderStatus::OnWay => "on the way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OnWay => "on_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "on_way" => Ok(OrderStatus::OnWay),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub restaurant_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub customer_location: Option<GeoPoint>,
    #[serde(default)]
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Confirmed and not yet assigned to anyone.
    pub fn awaits_dispatch(&self) -> bool {
        self.status == OrderStatus::Confirmed && self.driver_id.is_none()
    }

    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.driver_id.as_deref() == Some(driver_id)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn status_round_trips_through_wire_names() {
        let status: OrderStatus = "on_way".parse().unwrap();
        assert_eq!(status, OrderStatus::OnWay);
        assert_eq!(serde_json::to_value(status).unwrap(), "on_way");
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn every_status_has_a_phrase() {
        assert_eq!(OrderStatus::Confirmed.phrase(), "confirmed by restaurant");
        assert_eq!(OrderStatus::OnWay.phrase(), "on the way");
    }
}
