use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Failures reported by the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("driver {0} not found")]
    DriverNotFound(String),

    /// The order's driver no longer matches what the caller read.
    #[error("order {order_id} driver changed (expected {expected:?}, found {actual:?})")]
    DriverMismatch {
        order_id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("order {order_id} status changed (expected {expected}, found {actual})")]
    StatusMismatch {
        order_id: String,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("driver {0} not found")]
    DriverNotFound(String),

    #[error("order {order_id} already assigned to driver {driver_id}")]
    AlreadyAssigned { order_id: String, driver_id: String },

    #[error("order {0} was modified concurrently")]
    Contended(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for DispatchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => DispatchError::OrderNotFound(id),
            StorageError::DriverNotFound(id) => DispatchError::DriverNotFound(id),
            StorageError::DriverMismatch { order_id, .. }
            | StorageError::StatusMismatch { order_id, .. } => DispatchError::Contended(order_id),
            other => DispatchError::Storage(other),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(_) | StorageError::DriverNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            StorageError::DriverMismatch { .. } | StorageError::StatusMismatch { .. } => {
                AppError::Conflict(err.to_string())
            }
            StorageError::Unavailable(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::OrderNotFound(_) | DispatchError::DriverNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            DispatchError::AlreadyAssigned { .. } | DispatchError::Contended(_) => {
                AppError::Conflict(err.to_string())
            }
            DispatchError::Storage(inner) => inner.into(),
        }
    }
}
