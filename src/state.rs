use std::sync::Arc;
use std::time::Duration;

use crate::engine::AutoDispatcher;
use crate::notifications::NotificationManager;
use crate::observability::metrics::Metrics;
use crate::realtime::WebSocketManager;
use crate::storage::Storage;

/// Everything the HTTP and WebSocket handlers share.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub ws: Arc<WebSocketManager>,
    pub notifier: NotificationManager,
    pub dispatcher: Arc<AutoDispatcher>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, in_flight_ttl: Duration) -> Self {
        let metrics = Metrics::new();
        let ws = Arc::new(WebSocketManager::new(metrics.clone()));
        let notifier = NotificationManager::new(storage.clone(), ws.clone(), metrics.clone());
        let dispatcher = Arc::new(AutoDispatcher::new(
            storage.clone(),
            notifier.clone(),
            metrics.clone(),
            in_flight_ttl,
        ));

        Self {
            storage,
            ws,
            notifier,
            dispatcher,
            metrics,
        }
    }
}
