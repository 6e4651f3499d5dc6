pub mod memory;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::driver::Driver;
use crate::models::notification::{NewNotification, Notification};
use crate::models::order::{Order, OrderStatus};

pub use memory::InMemoryStorage;

/// Partial update of an order. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    /// `Some(None)` clears the driver.
    pub driver_id: Option<Option<String>>,
    /// When set, the update only applies if the order's current driver equals it.
    pub expected_driver: Option<Option<String>>,
    /// When set, the update only applies while the order is still in this status.
    pub expected_status: Option<OrderStatus>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn assign(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: Some(Some(driver_id.into())),
            ..Self::default()
        }
    }

    pub fn unassign() -> Self {
        Self {
            driver_id: Some(None),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn expecting_driver(mut self, driver_id: Option<String>) -> Self {
        self.expected_driver = Some(driver_id);
        self
    }

    pub fn expecting_status(mut self, status: OrderStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverUpdate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_available: Option<bool>,
}

impl DriverUpdate {
    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }
}

/// Persistence collaborator. Each call is treated as one atomic field update;
/// no cross-call transactions are assumed.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_orders(&self) -> StorageResult<Vec<Order>>;
    async fn get_order(&self, id: &str) -> StorageResult<Option<Order>>;
    async fn update_order(&self, id: &str, update: OrderUpdate) -> StorageResult<Order>;
    async fn get_drivers(&self) -> StorageResult<Vec<Driver>>;
    async fn get_driver(&self, id: &str) -> StorageResult<Option<Driver>>;
    async fn get_available_drivers(&self) -> StorageResult<Vec<Driver>>;
    async fn update_driver(&self, id: &str, update: DriverUpdate) -> StorageResult<Driver>;
    async fn create_notification(&self, record: NewNotification) -> StorageResult<Notification>;
}
