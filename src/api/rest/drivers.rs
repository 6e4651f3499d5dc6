use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::rest::{required, JsonBody};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::state::AppState;
use crate::storage::DriverUpdate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/driver-location", post(update_driver_location))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationRequest {
    pub driver_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub order_id: Option<String>,
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<DriverLocationRequest>,
) -> Result<Json<Value>, AppError> {
    let driver_id = required(payload.driver_id, "driverId")?;
    let lat = required(payload.latitude, "latitude")?;
    let lng = required(payload.longitude, "longitude")?;

    if state.storage.get_driver(&driver_id).await?.is_none() {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    state
        .storage
        .update_driver(&driver_id, DriverUpdate::location(lat, lng))
        .await?;

    state
        .notifier
        .notify_driver_location_update(
            &driver_id,
            GeoPoint { lat, lng },
            payload.order_id.as_deref(),
        )
        .await;

    Ok(Json(json!({ "success": true, "message": "location updated" })))
}
