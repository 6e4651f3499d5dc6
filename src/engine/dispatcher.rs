use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::scoring::{pick_best, score_driver};
use crate::error::{DispatchError, StorageError};
use crate::models::assignment::DriverScore;
use crate::models::order::{Order, OrderStatus};
use crate::notifications::NotificationManager;
use crate::observability::metrics::Metrics;
use crate::schedule::PeriodicTask;
use crate::storage::{OrderUpdate, Storage};

const REASSIGNED_MESSAGE: &str = "This order has been reassigned to another driver";
const RELEASED_MESSAGE: &str = "This order has been unassigned from you";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub total_orders: usize,
    pub orders_awaiting_dispatch: usize,
    pub active_deliveries: usize,
    pub completed_orders: usize,
    pub total_drivers: usize,
    pub available_drivers: usize,
    pub busy_drivers: usize,
    pub average_order_age: String,
}

/// Matches confirmed, unassigned orders to drivers on a fixed period and
/// exposes the manual overrides.
pub struct AutoDispatcher {
    storage: Arc<dyn Storage>,
    notifier: NotificationManager,
    metrics: Metrics,
    in_flight: Arc<DashSet<String>>,
    in_flight_ttl: Duration,
}

impl AutoDispatcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        notifier: NotificationManager,
        metrics: Metrics,
        in_flight_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            notifier,
            metrics,
            in_flight: Arc::new(DashSet::new()),
            in_flight_ttl,
        }
    }

    pub fn start(self: Arc<Self>, period: Duration) -> PeriodicTask {
        PeriodicTask::spawn("auto-dispatch", period, move || {
            let dispatcher = self.clone();
            async move {
                dispatcher.run_tick().await;
            }
        })
    }

    /// One scheduling pass. Returns how many orders were assigned; failures are
    /// logged and left for the next tick.
    pub async fn run_tick(&self) -> usize {
        let start = Instant::now();
        let result = self.dispatch_pending().await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(assigned) => {
                self.metrics
                    .dispatch_tick_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
                assigned
            }
            Err(err) => {
                self.metrics
                    .dispatch_tick_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                error!(error = %err, "auto dispatch tick failed");
                0
            }
        }
    }

    pub fn is_in_flight(&self, order_id: &str) -> bool {
        self.in_flight.contains(order_id)
    }

    async fn dispatch_pending(&self) -> Result<usize, StorageError> {
        let orders = self.storage.get_orders().await?;
        let pending: Vec<&Order> = orders
            .iter()
            .filter(|order| order.awaits_dispatch() && !self.in_flight.contains(&order.id))
            .collect();

        self.metrics.orders_awaiting_dispatch.set(pending.len() as i64);
        if pending.is_empty() {
            return Ok(0);
        }

        let mut assigned = 0;
        for order in pending {
            let best = match self.find_best_driver_among(order, &orders).await {
                Ok(Some(best)) => best,
                Ok(None) => {
                    debug!(order_id = %order.id, "no available drivers; retrying next tick");
                    continue;
                }
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "failed to score drivers");
                    continue;
                }
            };

            self.mark_in_flight(&order.id);

            match self.assign(order, &best.driver_id).await {
                Ok(()) => {
                    assigned += 1;
                    self.metrics
                        .assignments_total
                        .with_label_values(&["auto"])
                        .inc();
                    info!(
                        order_id = %order.id,
                        driver_id = %best.driver_id,
                        score = best.score,
                        reason = %best.reason,
                        "order auto-dispatched"
                    );
                }
                Err(DispatchError::Contended(_)) => {
                    debug!(order_id = %order.id, "order taken concurrently; skipping");
                }
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "auto-dispatch assignment failed");
                }
            }
        }

        Ok(assigned)
    }

    fn mark_in_flight(&self, order_id: &str) {
        self.in_flight.insert(order_id.to_string());

        let in_flight = self.in_flight.clone();
        let order_id = order_id.to_string();
        let ttl = self.in_flight_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            in_flight.remove(&order_id);
        });
    }

    /// Best available driver for `order`, or `None` when nobody is available.
    pub async fn find_best_driver(&self, order: &Order) -> Result<Option<DriverScore>, StorageError> {
        let orders = self.storage.get_orders().await?;
        self.find_best_driver_among(order, &orders).await
    }

    async fn find_best_driver_among(
        &self,
        order: &Order,
        orders: &[Order],
    ) -> Result<Option<DriverScore>, StorageError> {
        let drivers = self.storage.get_available_drivers().await?;
        if drivers.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let delivered_today = delivered_today_by_driver(orders, now);
        let scores = drivers
            .iter()
            .map(|driver| {
                let load = delivered_today.get(driver.id.as_str()).copied().unwrap_or(0);
                score_driver(driver, order, load, now)
            })
            .collect();

        Ok(pick_best(scores))
    }

    /// Writes the assignment only if the order is still unassigned and in the
    /// status it was read with, then notifies.
    async fn assign(&self, order: &Order, driver_id: &str) -> Result<(), DispatchError> {
        let updated = self
            .storage
            .update_order(
                &order.id,
                OrderUpdate::assign(driver_id)
                    .with_status(OrderStatus::OnWay)
                    .expecting_driver(None)
                    .expecting_status(order.status),
            )
            .await?;

        self.notifier.notify_driver_assigned(&updated, driver_id).await;
        Ok(())
    }

    pub async fn manual_dispatch(&self, order_id: &str, driver_id: &str) -> Result<(), DispatchError> {
        let order = self.load_order(order_id).await?;

        if let Some(current) = &order.driver_id {
            warn!(order_id, driver_id = %current, "manual dispatch rejected: already assigned");
            return Err(DispatchError::AlreadyAssigned {
                order_id: order_id.to_string(),
                driver_id: current.clone(),
            });
        }

        self.ensure_driver(driver_id).await?;
        self.assign(&order, driver_id).await?;

        self.metrics
            .assignments_total
            .with_label_values(&["manual"])
            .inc();
        info!(order_id, driver_id, "order manually dispatched");
        Ok(())
    }

    pub async fn reassign_order(&self, order_id: &str, new_driver_id: &str) -> Result<(), DispatchError> {
        let order = self.load_order(order_id).await?;
        self.ensure_driver(new_driver_id).await?;

        let previous = order.driver_id.clone();
        let updated = self
            .storage
            .update_order(
                order_id,
                OrderUpdate::assign(new_driver_id)
                    .with_status(OrderStatus::OnWay)
                    .expecting_driver(previous.clone()),
            )
            .await?;

        if let Some(previous) = previous.as_deref().filter(|id| *id != new_driver_id) {
            self.notifier
                .notify_driver_unassigned(&order, previous, REASSIGNED_MESSAGE)
                .await;
        }
        self.notifier
            .notify_driver_assigned(&updated, new_driver_id)
            .await;

        self.metrics
            .assignments_total
            .with_label_values(&["reassign"])
            .inc();
        info!(
            order_id,
            from = previous.as_deref().unwrap_or("-"),
            to = new_driver_id,
            "order reassigned"
        );
        Ok(())
    }

    /// Clears the driver and puts the order back to `confirmed`, whatever its status.
    pub async fn release_order(&self, order_id: &str) -> Result<(), DispatchError> {
        let order = self.load_order(order_id).await?;

        self.storage
            .update_order(
                order_id,
                OrderUpdate::unassign()
                    .with_status(OrderStatus::Confirmed)
                    .expecting_driver(order.driver_id.clone()),
            )
            .await?;

        if let Some(previous) = &order.driver_id {
            self.notifier
                .notify_driver_unassigned(&order, previous, RELEASED_MESSAGE)
                .await;
        }

        info!(order_id, "order released");
        Ok(())
    }

    pub async fn dispatch_stats(&self) -> Result<DispatchStats, StorageError> {
        let orders = self.storage.get_orders().await?;
        let drivers = self.storage.get_drivers().await?;

        let count_status = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count();
        let available = drivers.iter().filter(|d| d.is_available).count();

        Ok(DispatchStats {
            total_orders: orders.len(),
            orders_awaiting_dispatch: orders.iter().filter(|o| o.awaits_dispatch()).count(),
            active_deliveries: count_status(OrderStatus::OnWay),
            completed_orders: count_status(OrderStatus::Delivered),
            total_drivers: drivers.len(),
            available_drivers: available,
            busy_drivers: drivers.len() - available,
            average_order_age: average_order_age(&orders, Utc::now()),
        })
    }

    async fn load_order(&self, order_id: &str) -> Result<Order, DispatchError> {
        self.storage
            .get_order(order_id)
            .await?
            .ok_or_else(|| DispatchError::OrderNotFound(order_id.to_string()))
    }

    async fn ensure_driver(&self, driver_id: &str) -> Result<(), DispatchError> {
        match self.storage.get_driver(driver_id).await? {
            Some(_) => Ok(()),
            None => Err(DispatchError::DriverNotFound(driver_id.to_string())),
        }
    }
}

fn delivered_today_by_driver(orders: &[Order], now: DateTime<Utc>) -> HashMap<&str, usize> {
    let today = now.date_naive();
    let mut counts = HashMap::new();

    for order in orders {
        if order.status != OrderStatus::Delivered || order.created_at.date_naive() != today {
            continue;
        }
        if let Some(driver_id) = order.driver_id.as_deref() {
            *counts.entry(driver_id).or_insert(0) += 1;
        }
    }

    counts
}

fn average_order_age(orders: &[Order], now: DateTime<Utc>) -> String {
    if orders.is_empty() {
        return "0m".to_string();
    }

    let total_ms: i64 = orders
        .iter()
        .map(|order| (now - order.created_at).num_milliseconds().max(0))
        .sum();
    let minutes = total_ms / orders.len() as i64 / 60_000;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
