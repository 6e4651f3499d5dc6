use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Fallback used when an order or driver carries no coordinates.
pub const DEFAULT_LOCATION: GeoPoint = GeoPoint {
    lat: 15.3694,
    lng: 48.3632,
};

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let h = sin_lat * sin_lat
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * sin_lng * sin_lng;

    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Distance between two optional points, substituting [`DEFAULT_LOCATION`].
pub fn distance_or_default(a: Option<GeoPoint>, b: Option<GeoPoint>) -> f64 {
    haversine_km(
        &a.unwrap_or(DEFAULT_LOCATION),
        &b.unwrap_or(DEFAULT_LOCATION),
    )
}

#[cfg(test)]
mod tests {
    use super::{distance_or_default, haversine_km, DEFAULT_LOCATION};
    use crate::models::driver::GeoPoint;

    #[test]
    fn missing_points_collapse_to_the_default_location() {
        assert!(distance_or_default(None, None) < 1e-9);
        assert!(distance_or_default(Some(DEFAULT_LOCATION), None) < 1e-9);
    }

    #[test]
    fn one_hundredth_degree_of_latitude_is_about_1_1_km() {
        let a = GeoPoint {
            lat: 15.3694,
            lng: 44.1910,
        };
        let b = GeoPoint {
            lat: 15.3794,
            lng: 44.1910,
        };
        let distance = haversine_km(&a, &b);
        assert!((distance - 1.112).abs() < 0.01);
    }
}
