use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::models::driver::GeoPoint;
use crate::models::notification::{NewNotification, NotificationKind, UserType};
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::realtime::{ServerEvent, ServerMessage, WebSocketManager};
use crate::storage::Storage;

const DEFAULT_CANCEL_REASON: &str = "Your order has been cancelled";
const RATING_PROMPT: &str = "We would love to hear what you thought of your delivery";

/// One recipient of a domain event: the record to persist and the frame to push.
struct Delivery {
    recipient_type: UserType,
    recipient_id: String,
    kind: NotificationKind,
    title: String,
    message: String,
    order_id: Option<String>,
    push: ServerMessage,
}

/// Turns domain events into persisted notifications plus live pushes.
///
/// Best effort throughout: every failure is logged and swallowed, and one
/// recipient's failure never stops the next.
#[derive(Clone)]
pub struct NotificationManager {
    storage: Arc<dyn Storage>,
    ws: Arc<WebSocketManager>,
    metrics: Metrics,
}

impl NotificationManager {
    pub fn new(storage: Arc<dyn Storage>, ws: Arc<WebSocketManager>, metrics: Metrics) -> Self {
        Self {
            storage,
            ws,
            metrics,
        }
    }

    async fn deliver(&self, event: &'static str, delivery: Delivery) {
        let record = NewNotification {
            kind: delivery.kind,
            title: delivery.title,
            message: delivery.message,
            recipient_type: delivery.recipient_type,
            recipient_id: delivery.recipient_id.clone(),
            order_id: delivery.order_id,
        };

        match self.storage.create_notification(record).await {
            Ok(_) => self.metrics.record_notification("store", true),
            Err(err) => {
                self.metrics.record_notification("store", false);
                warn!(
                    event,
                    recipient_id = %delivery.recipient_id,
                    error = %err,
                    "failed to persist notification"
                );
            }
        }

        let reached = self.ws.send_to_user(&delivery.recipient_id, &delivery.push);
        self.metrics.record_notification("push", reached > 0);
    }

    pub async fn notify_new_order(&self, order: &Order) {
        info!(order_id = %order.id, "notifying new order");

        let customer_name = order.customer_name.as_deref().unwrap_or("a customer");
        let order_data = serde_json::to_value(order).ok();

        if let Some(restaurant_id) = &order.restaurant_id {
            let title = "New order";
            let message = format!("New order #{} from {}", order.order_number, customer_name);
            let mut push = ServerMessage::titled(ServerEvent::Notification, title, &message);
            push.data = order_data.clone();

            self.deliver(
                "new_order",
                Delivery {
                    recipient_type: UserType::Restaurant,
                    recipient_id: restaurant_id.clone(),
                    kind: NotificationKind::NewOrder,
                    title: title.to_string(),
                    message,
                    order_id: Some(order.id.clone()),
                    push,
                },
            )
            .await;
        }

        let drivers = match self.storage.get_available_drivers().await {
            Ok(drivers) => drivers,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "failed to load available drivers");
                return;
            }
        };

        let title = "New order available for delivery";
        let message = format!("New order available - amount: {:.2}", order.total_amount);
        for driver in drivers {
            let mut push = ServerMessage::titled(ServerEvent::Notification, title, &message);
            push.data = order_data.clone();

            self.deliver(
                "new_order",
                Delivery {
                    recipient_type: UserType::Driver,
                    recipient_id: driver.id,
                    kind: NotificationKind::NewOrderAvailable,
                    title: title.to_string(),
                    message: message.clone(),
                    order_id: Some(order.id.clone()),
                    push,
                },
            )
            .await;
        }
    }

    /// Fans out `order.status` to the customer, assigned driver and restaurant.
    pub async fn notify_order_status_change(&self, order: &Order) {
        info!(order_id = %order.id, status = %order.status, "notifying status change");

        let title = "Order status update";
        let phrase = order.status.phrase();
        let data = json!({
            "orderId": order.id,
            "status": order.status,
            "message": phrase,
            "orderNumber": order.order_number,
        });
        let party_message = format!("Update: {phrase} - order #{}", order.order_number);

        let mut recipients = vec![(UserType::Customer, order.customer_id.clone(), phrase.to_string())];
        if let Some(driver_id) = &order.driver_id {
            recipients.push((UserType::Driver, driver_id.clone(), party_message.clone()));
        }
        if let Some(restaurant_id) = &order.restaurant_id {
            recipients.push((UserType::Restaurant, restaurant_id.clone(), party_message));
        }

        for (recipient_type, recipient_id, message) in recipients {
            let push = ServerMessage::titled(ServerEvent::OrderStatusChanged, title, &message)
                .data(data.clone())
                .stamped();

            self.deliver(
                "order_status_changed",
                Delivery {
                    recipient_type,
                    recipient_id,
                    kind: NotificationKind::OrderStatusUpdated,
                    title: title.to_string(),
                    message,
                    order_id: Some(order.id.clone()),
                    push,
                },
            )
            .await;
        }
    }

    pub async fn notify_driver_assigned(&self, order: &Order, driver_id: &str) {
        info!(order_id = %order.id, driver_id, "notifying driver assignment");

        let driver = match self.storage.get_driver(driver_id).await {
            Ok(driver) => driver,
            Err(err) => {
                warn!(driver_id, error = %err, "failed to load assigned driver");
                None
            }
        };
        let driver_name = driver
            .as_ref()
            .map(|d| d.name.as_str())
            .unwrap_or("your driver");

        let title = "Driver assigned";
        let message = format!("Driver {driver_name} has been assigned to deliver your order");
        let push = ServerMessage::titled(ServerEvent::DriverAssigned, title, &message)
            .data(json!({ "orderId": order.id, "driver": driver }));
        self.deliver(
            "driver_assigned",
            Delivery {
                recipient_type: UserType::Customer,
                recipient_id: order.customer_id.clone(),
                kind: NotificationKind::DriverAssigned,
                title: title.to_string(),
                message,
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;

        let title = "New order assigned to you";
        let message = format!("Order #{} has been assigned to you", order.order_number);
        let mut push = ServerMessage::titled(ServerEvent::OrderAssigned, title, &message);
        push.data = serde_json::to_value(order).ok();
        self.deliver(
            "driver_assigned",
            Delivery {
                recipient_type: UserType::Driver,
                recipient_id: driver_id.to_string(),
                kind: NotificationKind::OrderAssigned,
                title: title.to_string(),
                message,
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;
    }

    /// Broadcasts the raw position and, when an order is given, tells its customer.
    /// Location updates are live-only; nothing is persisted.
    pub async fn notify_driver_location_update(
        &self,
        driver_id: &str,
        location: GeoPoint,
        order_id: Option<&str>,
    ) {
        self.ws.update_driver_location(driver_id, location);

        let Some(order_id) = order_id else {
            return;
        };

        match self.storage.get_order(order_id).await {
            Ok(Some(order)) => {
                let push = ServerMessage::new(ServerEvent::DriverLocationUpdated)
                    .data(json!({
                        "driverId": driver_id,
                        "location": location,
                        "orderId": order_id,
                    }))
                    .stamped();
                let reached = self.ws.send_to_user(&order.customer_id, &push);
                self.metrics.record_notification("push", reached > 0);
            }
            Ok(None) => warn!(order_id, driver_id, "location update for unknown order"),
            Err(err) => warn!(order_id, error = %err, "failed to load order for location update"),
        }
    }

    pub async fn notify_delivery_completed(&self, order: &Order) {
        info!(order_id = %order.id, "notifying delivery completed");

        let title = "Order delivered";
        let message = format!(
            "Your order #{} has been delivered. Thank you for ordering with us!",
            order.order_number
        );
        let mut push = ServerMessage::titled(ServerEvent::DeliveryCompleted, title, &message);
        push.data = serde_json::to_value(order).ok();
        self.deliver(
            "delivery_completed",
            Delivery {
                recipient_type: UserType::Customer,
                recipient_id: order.customer_id.clone(),
                kind: NotificationKind::DeliveryCompleted,
                title: title.to_string(),
                message,
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;

        if let Some(restaurant_id) = &order.restaurant_id {
            let message = format!("Order #{} was delivered successfully", order.order_number);
            let push = ServerMessage::titled(ServerEvent::DeliveryCompleted, title, &message);
            self.deliver(
                "delivery_completed",
                Delivery {
                    recipient_type: UserType::Restaurant,
                    recipient_id: restaurant_id.clone(),
                    kind: NotificationKind::DeliveryCompleted,
                    title: title.to_string(),
                    message,
                    order_id: Some(order.id.clone()),
                    push,
                },
            )
            .await;
        }
    }

    pub async fn notify_order_cancelled(&self, order: &Order, reason: Option<&str>) {
        info!(order_id = %order.id, "notifying order cancelled");

        let title = "Order cancelled";
        let message = reason.unwrap_or(DEFAULT_CANCEL_REASON).to_string();
        let push = ServerMessage::titled(ServerEvent::OrderCancelled, title, &message);
        self.deliver(
            "order_cancelled",
            Delivery {
                recipient_type: UserType::Customer,
                recipient_id: order.customer_id.clone(),
                kind: NotificationKind::OrderCancelled,
                title: title.to_string(),
                message,
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;

        if let Some(driver_id) = &order.driver_id {
            let message = format!("Order #{} has been cancelled", order.order_number);
            self.notify_driver_unassigned(order, driver_id, &message).await;
        }
    }

    /// Tells a driver they no longer hold `order`. Only the driver is notified.
    pub async fn notify_driver_unassigned(&self, order: &Order, driver_id: &str, reason: &str) {
        let title = "Order cancelled";
        let push = ServerMessage::titled(ServerEvent::OrderCancelled, title, reason)
            .data(json!({ "orderId": order.id, "orderNumber": order.order_number }));
        self.deliver(
            "order_unassigned",
            Delivery {
                recipient_type: UserType::Driver,
                recipient_id: driver_id.to_string(),
                kind: NotificationKind::OrderCancelled,
                title: title.to_string(),
                message: reason.to_string(),
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;
    }

    pub async fn notify_rating_request(&self, order: &Order) {
        let title = "Rate your delivery";
        let push = ServerMessage::titled(ServerEvent::RatingRequest, title, RATING_PROMPT)
            .data(json!({ "orderId": order.id }));
        self.deliver(
            "rating_request",
            Delivery {
                recipient_type: UserType::Customer,
                recipient_id: order.customer_id.clone(),
                kind: NotificationKind::RatingRequest,
                title: title.to_string(),
                message: RATING_PROMPT.to_string(),
                order_id: Some(order.id.clone()),
                push,
            },
        )
        .await;
    }

    /// Live-only broadcast to every connection, or one role. Returns connections reached.
    pub fn broadcast_system_notification(
        &self,
        title: &str,
        message: &str,
        target: Option<UserType>,
    ) -> usize {
        let push = ServerMessage::titled(ServerEvent::SystemNotification, title, message).stamped();

        let reached = match target {
            Some(user_type) => self.ws.broadcast_to_user_type(user_type, &push),
            None => self.ws.broadcast(&push),
        };

        info!(title, target = ?target, reached, "system notification broadcast");
        reached
    }
}
