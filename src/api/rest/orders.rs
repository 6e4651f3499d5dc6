use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::rest::{required, JsonBody};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;
use crate::storage::OrderUpdate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/update-order-status", post(update_order_status))
        .route("/accept-order", post(accept_order))
        .route("/complete-order", post(complete_order))
        .route("/cancel-order", post(cancel_order))
        .route("/notify-new-order", post(notify_new_order))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOrderRequest {
    pub order_id: Option<String>,
    pub driver_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub order_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: Option<String>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

impl OrderResponse {
    fn ok(order: Order) -> Json<Self> {
        Json(Self {
            success: true,
            order,
        })
    }
}

async fn load_order(state: &AppState, order_id: &str) -> Result<Order, AppError> {
    state
        .storage
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let status: OrderStatus = required(payload.status, "status")?
        .parse()
        .map_err(AppError::BadRequest)?;

    load_order(&state, &order_id).await?;
    let updated = state
        .storage
        .update_order(&order_id, OrderUpdate::status(status))
        .await?;

    state.notifier.notify_order_status_change(&updated).await;

    Ok(OrderResponse::ok(updated))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<DriverOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let driver_id = required(payload.driver_id, "driverId")?;

    let order = load_order(&state, &order_id).await?;
    if order.driver_id.is_some() && !order.is_assigned_to(&driver_id) {
        return Err(AppError::BadRequest(format!(
            "order {order_id} already assigned to another driver"
        )));
    }
    if state.storage.get_driver(&driver_id).await?.is_none() {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let updated = state
        .storage
        .update_order(
            &order_id,
            OrderUpdate::assign(driver_id.as_str())
                .with_status(OrderStatus::OnWay)
                .expecting_driver(order.driver_id),
        )
        .await?;

    state.notifier.notify_order_status_change(&updated).await;
    info!(order_id = %order_id, driver_id = %driver_id, "order accepted by driver");

    Ok(OrderResponse::ok(updated))
}

async fn complete_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<DriverOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let driver_id = required(payload.driver_id, "driverId")?;

    let order = load_order(&state, &order_id).await?;
    if !order.is_assigned_to(&driver_id) {
        return Err(AppError::BadRequest(format!(
            "order {order_id} is not assigned to driver {driver_id}"
        )));
    }

    let updated = state
        .storage
        .update_order(
            &order_id,
            OrderUpdate::status(OrderStatus::Delivered).expecting_driver(Some(driver_id.clone())),
        )
        .await?;

    state.notifier.notify_delivery_completed(&updated).await;
    state.notifier.notify_rating_request(&updated).await;
    info!(order_id = %order_id, driver_id = %driver_id, "order delivered");

    Ok(OrderResponse::ok(updated))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;

    load_order(&state, &order_id).await?;
    let updated = state
        .storage
        .update_order(&order_id, OrderUpdate::status(OrderStatus::Cancelled))
        .await?;

    state
        .notifier
        .notify_order_cancelled(&updated, payload.reason.as_deref())
        .await;

    Ok(OrderResponse::ok(updated))
}

async fn notify_new_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<OrderRef>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let order = load_order(&state, &order_id).await?;

    state.notifier.notify_new_order(&order).await;

    Ok(OrderResponse::ok(order))
}
