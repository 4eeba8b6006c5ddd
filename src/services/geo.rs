//! Geographic calculations

use crate::types::Coordinates;

/// Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Road distance coefficient (straight line to road)
pub const ROAD_COEFFICIENT: f64 = 1.3;

/// Average speed in km/h for travel time estimation
pub const AVERAGE_SPEED_KMH: f64 = 40.0;

/// Calculate Haversine distance between two points in kilometers
pub fn haversine_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lon = (to.lng - from.lng).to_radians();

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Estimate road distance in kilometers from straight-line distance
pub fn road_distance(from: &Coordinates, to: &Coordinates) -> f64 {
    haversine_distance(from, to) * ROAD_COEFFICIENT
}

/// Whether two points are close enough to be treated as the same delivery point
pub fn within_tolerance(a: &Coordinates, b: &Coordinates, tolerance_meters: f64) -> bool {
    haversine_distance(a, b) * 1000.0 <= tolerance_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Union Square to Grand Army Plaza, ~7 km
        let union_square = Coordinates { lat: 40.7359, lng: -73.9911 };
        let grand_army = Coordinates { lat: 40.6745, lng: -73.9702 };

        let distance = haversine_distance(&union_square, &grand_army);

        assert!((distance - 7.0).abs() < 1.0, "got {} km", distance);
    }

    #[test]
    fn test_haversine_same_point() {
        let point = Coordinates { lat: 50.0, lng: 14.0 };
        let distance = haversine_distance(&point, &point);
        assert!((distance - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_road_distance() {
        let a = Coordinates { lat: 40.70, lng: -74.00 };
        let b = Coordinates { lat: 40.75, lng: -73.95 };

        let distance = road_distance(&a, &b);
        let straight = haversine_distance(&a, &b);

        assert!((distance / straight - ROAD_COEFFICIENT).abs() < 0.01);
    }

    #[test]
    fn test_within_tolerance() {
        let a = Coordinates { lat: 40.70000, lng: -74.00000 };
        // ~11 m north
        let b = Coordinates { lat: 40.70010, lng: -74.00000 };
        // ~1.1 km north
        let c = Coordinates { lat: 40.71000, lng: -74.00000 };

        assert!(within_tolerance(&a, &b, 25.0));
        assert!(!within_tolerance(&a, &c, 25.0));
    }
}
