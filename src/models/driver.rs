use serde::{Deserialize, Deserializer, Serialize};

/// Rating assumed for drivers without one when scoring.
pub const DEFAULT_SCORING_RATING: f64 = 4.5;

/// Rating stored when a supplied value cannot be parsed.
pub const NEUTRAL_RATING: f64 = 3.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_rating")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub is_available: bool,
}

impl Driver {
    pub fn scoring_rating(&self) -> f64 {
        self.rating.unwrap_or(DEFAULT_SCORING_RATING)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRating {
    Number(f64),
    Text(String),
}

// Storage layers commonly hand decimals back as strings.
fn lenient_rating<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawRating>::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        RawRating::Number(n) if n.is_finite() => n,
        RawRating::Number(_) => NEUTRAL_RATING,
        RawRating::Text(text) => text.trim().parse::<f64>().unwrap_or(NEUTRAL_RATING),
    }))
}
