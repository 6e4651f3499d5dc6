use chrono::{DateTime, Duration, Utc};

use crate::geo::distance_or_default;
use crate::models::assignment::DriverScore;
use crate::models::driver::Driver;
use crate::models::order::Order;

const BASE_SCORE: f64 = 100.0;
const LOAD_PENALTY: f64 = 20.0;
const DELIVERIES_AT_FULL_LOAD: f64 = 10.0;
const RATING_WEIGHT: f64 = 15.0;
const NEUTRAL_RATING: f64 = 3.0;
const DISTANCE_WEIGHT: f64 = 20.0;
const AGED_ORDER_BONUS: f64 = 10.0;
const AGED_ORDER_MINUTES: i64 = 15;
const HIGH_VALUE_BONUS: f64 = 5.0;
const HIGH_VALUE_THRESHOLD: f64 = 100.0;

/// Scores `driver` for `order`. `delivered_today` is the driver's delivered
/// order count for the current UTC day.
pub fn score_driver(
    driver: &Driver,
    order: &Order,
    delivered_today: usize,
    now: DateTime<Utc>,
) -> DriverScore {
    let load_factor = load_factor(delivered_today);
    let rating_factor = rating_factor(driver.scoring_rating());
    let distance_km = distance_or_default(order.customer_location, driver.location());
    let distance_score = distance_score(distance_km);

    let mut score = BASE_SCORE - load_factor * LOAD_PENALTY
        + rating_factor * RATING_WEIGHT
        + distance_score;
    let mut reasons = vec![
        format!("load {load_factor:.2}"),
        format!("rating {rating_factor:.2}"),
        format!("distance {distance_km:.2}km"),
    ];

    if now - order.created_at > Duration::minutes(AGED_ORDER_MINUTES) {
        score += AGED_ORDER_BONUS;
        reasons.push("aged order".to_string());
    }

    if order.total_amount > HIGH_VALUE_THRESHOLD {
        score += HIGH_VALUE_BONUS;
        reasons.push("high value".to_string());
    }

    DriverScore {
        driver_id: driver.id.clone(),
        score: score.max(0.0),
        distance_km,
        load_factor,
        rating_factor,
        distance_score,
        reason: reasons.join(" | "),
    }
}

/// Highest score wins; equal scores go to the lowest driver id.
pub fn pick_best(mut scores: Vec<DriverScore>) -> Option<DriverScore> {
    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.driver_id.cmp(&b.driver_id))
    });
    scores.into_iter().next()
}

fn load_factor(delivered_today: usize) -> f64 {
    (delivered_today as f64 / DELIVERIES_AT_FULL_LOAD).min(1.0)
}

fn rating_factor(rating: f64) -> f64 {
    (rating - NEUTRAL_RATING) / 2.0
}

fn distance_score(distance_km: f64) -> f64 {
    (DISTANCE_WEIGHT - distance_km * DISTANCE_WEIGHT).max(0.0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{distance_score, pick_best, score_driver};
    use crate::models::driver::{Driver, GeoPoint};
    use crate::models::order::{Order, OrderStatus};

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 15.3694,
        lng: 44.1910,
    };

    fn driver(id: &str, rating: Option<f64>, lat_offset: f64) -> Driver {
        Driver {
            id: id.to_string(),
            name: "test-driver".to_string(),
            rating,
            latitude: Some(ORIGIN.lat + lat_offset),
            longitude: Some(ORIGIN.lng),
            is_available: true,
        }
    }

    fn order(age_minutes: i64, total_amount: f64) -> Order {
        Order {
            id: "o1".to_string(),
            order_number: "1001".to_string(),
            status: OrderStatus::Confirmed,
            customer_id: "c1".to_string(),
            customer_name: None,
            restaurant_id: None,
            driver_id: None,
            customer_location: Some(ORIGIN),
            total_amount,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn less_busy_driver_never_scores_lower() {
        let order = order(0, 20.0);
        let d = driver("d1", Some(4.0), 0.001);

        for busy in 1..15 {
            let idle = score_driver(&d, &order, busy - 1, Utc::now());
            let loaded = score_driver(&d, &order, busy, Utc::now());
            assert!(idle.score >= loaded.score);
        }
    }

    #[test]
    fn load_penalty_caps_at_twenty_points() {
        let order = order(0, 20.0);
        let d = driver("d1", Some(3.0), 0.0);

        let fresh = score_driver(&d, &order, 0, Utc::now()).score;
        let swamped = score_driver(&d, &order, 50, Utc::now()).score;

        assert!((fresh - swamped - 20.0).abs() < 1e-9);
    }

    #[test]
    fn distance_score_is_monotone_and_zero_past_one_km() {
        let mut previous = f64::MAX;
        for step in 0..40 {
            let km = step as f64 * 0.05;
            let score = distance_score(km);
            assert!(score <= previous);
            if km >= 1.0 {
                assert_eq!(score, 0.0);
            }
            previous = score;
        }
    }

    #[test]
    fn neutral_rating_contributes_nothing() {
        let scored = score_driver(&driver("d1", Some(3.0), 0.0), &order(0, 20.0), 0, Utc::now());
        assert_eq!(scored.rating_factor, 0.0);
        assert!((scored.score - 120.0).abs() < 1e-6);
    }

    #[test]
    fn missing_rating_is_treated_as_four_and_a_half() {
        let scored = score_driver(&driver("d1", None, 0.0), &order(0, 20.0), 0, Utc::now());
        assert!((scored.rating_factor - 0.75).abs() < 1e-9);
    }

    #[test]
    fn aged_and_high_value_orders_earn_bonuses() {
        let d = driver("d1", Some(3.0), 0.0);
        let base = score_driver(&d, &order(0, 20.0), 0, Utc::now()).score;
        let aged = score_driver(&d, &order(20, 20.0), 0, Utc::now()).score;
        let valuable = score_driver(&d, &order(0, 150.0), 0, Utc::now()).score;

        assert!((aged - base - 10.0).abs() < 1e-6);
        assert!((valuable - base - 5.0).abs() < 1e-6);
    }

    #[test]
    fn score_never_goes_negative() {
        let scored = score_driver(&driver("d1", Some(-40.0), 0.0), &order(0, 0.0), 10, Utc::now());
        assert_eq!(scored.score, 0.0);
    }

    #[test]
    fn close_top_rated_driver_beats_far_busy_one() {
        let order = order(20, 150.0);
        // 0.0009 degrees of latitude is roughly 0.1 km, 0.045 roughly 5 km.
        let d1 = score_driver(&driver("d1", Some(5.0), 0.0009), &order, 0, Utc::now());
        let d2 = score_driver(&driver("d2", Some(3.0), 0.045), &order, 8, Utc::now());

        assert!(d1.score > d2.score);
        assert!(d1.reason.contains("aged order"));
        assert!(d1.reason.contains("high value"));
        assert_eq!(pick_best(vec![d2, d1.clone()]), Some(d1));
    }

    #[test]
    fn ties_resolve_to_lowest_driver_id() {
        let order = order(0, 20.0);
        let b = score_driver(&driver("b", Some(4.0), 0.0), &order, 0, Utc::now());
        let a = score_driver(&driver("a", Some(4.0), 0.0), &order, 0, Utc::now());

        let best = pick_best(vec![b, a]).unwrap();
        assert_eq!(best.driver_id, "a");
    }

    #[test]
    fn no_candidates_no_winner() {
        assert!(pick_best(Vec::new()).is_none());
    }
}
