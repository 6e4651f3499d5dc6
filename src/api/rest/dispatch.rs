use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::rest::{required, JsonBody};
use crate::engine::DispatchStats;
use crate::error::AppError;
use crate::models::notification::UserType;
use crate::realtime::ConnectedUser;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch-order", post(dispatch_order))
        .route("/reassign-order", post(reassign_order))
        .route("/release-order", post(release_order))
        .route("/ws-stats", get(ws_stats))
        .route("/broadcast-notification", post(broadcast_notification))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub order_id: Option<String>,
    pub driver_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignRequest {
    pub order_id: Option<String>,
    pub new_driver_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub order_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub target_type: Option<UserType>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsConnections {
    pub total_connected: usize,
    pub active_connections: usize,
    pub users: Vec<ConnectedUser>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsStatsResponse {
    pub ws_connections: WsConnections,
    pub dispatch_stats: DispatchStats,
}

fn done(message: &str) -> Json<Value> {
    Json(json!({ "success": true, "message": message }))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<DispatchRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let driver_id = required(payload.driver_id, "driverId")?;

    state.dispatcher.manual_dispatch(&order_id, &driver_id).await?;
    Ok(done("order dispatched"))
}

async fn reassign_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ReassignRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;
    let new_driver_id = required(payload.new_driver_id, "newDriverId")?;

    state
        .dispatcher
        .reassign_order(&order_id, &new_driver_id)
        .await?;
    Ok(done("order reassigned"))
}

async fn release_order(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ReleaseRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = required(payload.order_id, "orderId")?;

    state.dispatcher.release_order(&order_id).await?;
    Ok(done("order released"))
}

async fn ws_stats(State(state): State<Arc<AppState>>) -> Result<Json<WsStatsResponse>, AppError> {
    let users = state.ws.connected_users();
    let dispatch_stats = state.dispatcher.dispatch_stats().await?;

    Ok(Json(WsStatsResponse {
        ws_connections: WsConnections {
            total_connected: users.len(),
            active_connections: state.ws.active_connections(),
            users,
        },
        dispatch_stats,
    }))
}

async fn broadcast_notification(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<BroadcastRequest>,
) -> Result<Json<Value>, AppError> {
    let title = required(payload.title, "title")?;
    let message = required(payload.message, "message")?;

    let reached = state
        .notifier
        .broadcast_system_notification(&title, &message, payload.target_type);

    Ok(Json(json!({
        "success": true,
        "message": "notification broadcast",
        "reached": reached
    })))
}
