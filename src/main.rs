use std::sync::Arc;

use delivery_dispatch::api;
use delivery_dispatch::config::Config;
use delivery_dispatch::error::AppError;
use delivery_dispatch::observability;
use delivery_dispatch::state::AppState;
use delivery_dispatch::storage::InMemoryStorage;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    observability::init_tracing(&config.log_level, config.log_json);

    let storage = match &config.seed_file {
        Some(path) => {
            let storage = InMemoryStorage::from_seed_file(path).map_err(AppError::Internal)?;
            tracing::info!(
                orders = storage.order_count(),
                drivers = storage.driver_count(),
                "storage seeded"
            );
            storage
        }
        None => InMemoryStorage::new(),
    };

    let shared_state = Arc::new(AppState::new(Arc::new(storage), config.in_flight_ttl));
    let app = api::rest::router(shared_state.clone());

    let heartbeat = shared_state
        .ws
        .clone()
        .start_heartbeat(config.heartbeat_interval);
    let dispatch = if config.auto_dispatch_enabled {
        Some(
            shared_state
                .dispatcher
                .clone()
                .start(config.dispatch_interval),
        )
    } else {
        tracing::warn!("auto dispatch disabled");
        None
    };

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    if let Some(dispatch) = dispatch {
        dispatch.stop().await;
    }
    heartbeat.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
