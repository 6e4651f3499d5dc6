use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{StorageError, StorageResult};
use crate::models::driver::Driver;
use crate::models::notification::{NewNotification, Notification};
use crate::models::order::Order;
use crate::storage::{DriverUpdate, OrderUpdate, Storage};

/// Process-local storage used by the binary and the tests.
#[derive(Default)]
pub struct InMemoryStorage {
    orders: DashMap<String, Order>,
    drivers: DashMap<String, Driver>,
    notifications: RwLock<Vec<Notification>>,
}

#[derive(Deserialize, Default)]
struct Seed {
    #[serde(default)]
    orders: Vec<Order>,
    #[serde(default)]
    drivers: Vec<Driver>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"orders": [...], "drivers": [...]}` from a JSON file.
    pub fn from_seed_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read seed file {}: {err}", path.display()))?;
        let seed: Seed = serde_json::from_str(&raw)
            .map_err(|err| format!("invalid seed file {}: {err}", path.display()))?;

        let storage = Self::new();
        seed.orders.into_iter().for_each(|order| storage.insert_order(order));
        seed.drivers.into_iter().for_each(|driver| storage.insert_driver(driver));
        Ok(storage)
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn insert_driver(&self, driver: Driver) {
        self.drivers.insert(driver.id.clone(), driver);
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    pub fn notifications_for(&self, recipient_id: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_orders(&self) -> StorageResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn get_order(&self, id: &str) -> StorageResult<Option<Order>> {
        Ok(self.orders.get(id).map(|entry| entry.value().clone()))
    }

    async fn update_order(&self, id: &str, update: OrderUpdate) -> StorageResult<Order> {
        // The entry guard holds the shard lock, so check-and-set is atomic.
        let mut order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| StorageError::OrderNotFound(id.to_string()))?;

        if let Some(expected) = update.expected_driver {
            if order.driver_id != expected {
                return Err(StorageError::DriverMismatch {
                    order_id: id.to_string(),
                    expected,
                    actual: order.driver_id.clone(),
                });
            }
        }
        if let Some(expected) = update.expected_status {
            if order.status != expected {
                return Err(StorageError::StatusMismatch {
                    order_id: id.to_string(),
                    expected,
                    actual: order.status,
                });
            }
        }

        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(driver_id) = update.driver_id {
            order.driver_id = driver_id;
        }

        Ok(order.clone())
    }

    async fn get_drivers(&self) -> StorageResult<Vec<Driver>> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(drivers)
    }

    async fn get_driver(&self, id: &str) -> StorageResult<Option<Driver>> {
        Ok(self.drivers.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_available_drivers(&self) -> StorageResult<Vec<Driver>> {
        let drivers = self.get_drivers().await?;
        Ok(drivers.into_iter().filter(|d| d.is_available).collect())
    }

    async fn update_driver(&self, id: &str, update: DriverUpdate) -> StorageResult<Driver> {
        let mut driver = self
            .drivers
            .get_mut(id)
            .ok_or_else(|| StorageError::DriverNotFound(id.to_string()))?;

        if let Some(lat) = update.latitude {
            driver.latitude = Some(lat);
        }
        if let Some(lng) = update.longitude {
            driver.longitude = Some(lng);
        }
        if let Some(available) = update.is_available {
            driver.is_available = available;
        }

        Ok(driver.clone())
    }

    async fn create_notification(&self, record: NewNotification) -> StorageResult<Notification> {
        let notification = Notification::from_new(record);
        self.notifications.write().push(notification.clone());
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::InMemoryStorage;
    use crate::error::StorageError;
    use crate::models::order::{Order, OrderStatus};
    use crate::storage::{OrderUpdate, Storage};

    fn order(id: &str, driver_id: Option<&str>) -> Order {
        Order {
            id: id.to_string(),
            order_number: "1001".to_string(),
            status: OrderStatus::Confirmed,
            customer_id: "c1".to_string(),
            customer_name: None,
            restaurant_id: None,
            driver_id: driver_id.map(str::to_string),
            customer_location: None,
            total_amount: 20.0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn assignment_precondition_rejects_taken_order() {
        let storage = InMemoryStorage::new();
        storage.insert_order(order("o1", Some("d1")));

        let err = storage
            .update_order(
                "o1",
                OrderUpdate::assign("d2")
                    .with_status(OrderStatus::OnWay)
                    .expecting_driver(None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::DriverMismatch { .. }));
        let unchanged = storage.get_order("o1").await.unwrap().unwrap();
        assert_eq!(unchanged.driver_id.as_deref(), Some("d1"));
        assert_eq!(unchanged.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn status_precondition_rejects_cancelled_order() {
        let storage = InMemoryStorage::new();
        let mut cancelled = order("o1", None);
        cancelled.status = OrderStatus::Cancelled;
        storage.insert_order(cancelled);

        let err = storage
            .update_order(
                "o1",
                OrderUpdate::assign("d1")
                    .with_status(OrderStatus::OnWay)
                    .expecting_driver(None)
                    .expecting_status(OrderStatus::Confirmed),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::StatusMismatch {
                actual: OrderStatus::Cancelled,
                ..
            }
        ));
        let unchanged = storage.get_order("o1").await.unwrap().unwrap();
        assert!(unchanged.driver_id.is_none());
        assert_eq!(unchanged.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn unassign_clears_driver() {
        let storage = InMemoryStorage::new();
        storage.insert_order(order("o1", Some("d1")));

        let updated = storage
            .update_order("o1", OrderUpdate::unassign())
            .await
            .unwrap();

        assert!(updated.driver_id.is_none());
    }

    #[tokio::test]
    async fn updating_missing_order_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage
            .update_order("missing", OrderUpdate::status(OrderStatus::Delivered))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::OrderNotFound(id) if id == "missing"));
    }
}
