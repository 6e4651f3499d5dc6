use serde::{Deserialize, Serialize};

/// Outcome of scoring one driver against one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverScore {
    pub driver_id: String,
    pub score: f64,
    pub distance_km: f64,
    pub load_factor: f64,
    pub rating_factor: f64,
    pub distance_score: f64,
    pub reason: String,
}
