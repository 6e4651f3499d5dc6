pub mod dispatch;
pub mod drivers;
pub mod orders;
pub mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(drivers::router())
        .merge(dispatch::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// `Json` whose rejections (bad syntax, wrong field types, missing content type)
/// surface as a 400 with the usual error body.
pub(crate) struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Rejects absent or blank fields with a 400.
pub(crate) fn required<T: RequiredField>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value
        .filter(|v| !v.is_blank())
        .ok_or_else(|| AppError::BadRequest(format!("missing required field: {field}")))
}

pub(crate) trait RequiredField {
    fn is_blank(&self) -> bool;
}

impl RequiredField for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl RequiredField for f64 {
    fn is_blank(&self) -> bool {
        !self.is_finite()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    orders: usize,
    drivers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        connections: state.ws.active_connections(),
        orders: state.storage.get_orders().await?.len(),
        drivers: state.storage.get_drivers().await?.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
