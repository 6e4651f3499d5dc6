use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub dispatch_tick_seconds: HistogramVec,
    pub orders_awaiting_dispatch: IntGauge,
    pub ws_connections: IntGauge,
    pub notifications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Driver assignments by source"),
            &["source"],
        )
        .expect("valid assignments_total metric");

        let dispatch_tick_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_tick_seconds",
                "Duration of auto-dispatch ticks in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_tick_seconds metric");

        let orders_awaiting_dispatch = IntGauge::new(
            "orders_awaiting_dispatch",
            "Confirmed orders without a driver seen by the last tick",
        )
        .expect("valid orders_awaiting_dispatch metric");

        let ws_connections = IntGauge::new("ws_connections", "Open WebSocket connections")
            .expect("valid ws_connections metric");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Notification deliveries by channel and outcome",
            ),
            &["channel", "outcome"],
        )
        .expect("valid notifications_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(dispatch_tick_seconds.clone()))
            .expect("register dispatch_tick_seconds");
        registry
            .register(Box::new(orders_awaiting_dispatch.clone()))
            .expect("register orders_awaiting_dispatch");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");

        Self {
            registry,
            assignments_total,
            dispatch_tick_seconds,
            orders_awaiting_dispatch,
            ws_connections,
            notifications_total,
        }
    }

    pub fn record_notification(&self, channel: &str, delivered: bool) {
        let outcome = if delivered { "ok" } else { "failed" };
        self.notifications_total
            .with_label_values(&[channel, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
