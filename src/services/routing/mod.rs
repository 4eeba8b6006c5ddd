//! Routing service for distance/time matrix calculations
//!
//! Uses Valhalla for production, haversine mock for tests and when Valhalla
//! is not configured.

mod valhalla;

pub use valhalla::{ValhallaClient, ValhallaConfig};

use async_trait::async_trait;
use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};

use crate::types::{Coordinates, VehicleType};

/// Cell value used for pairs the provider could not route
pub const UNREACHABLE: u64 = u64::MAX / 2;

/// Distance and time matrices between locations
#[derive(Debug, Clone)]
pub struct DistanceTimeMatrices {
    /// Distance in meters [i][j] from location i to location j
    pub distances: Vec<Vec<u64>>,
    /// Duration in seconds [i][j] from location i to location j
    pub durations: Vec<Vec<u64>>,
    /// Number of locations
    pub size: usize,
}

impl DistanceTimeMatrices {
    /// Create empty matrices
    pub fn empty() -> Self {
        Self {
            distances: vec![],
            durations: vec![],
            size: 0,
        }
    }

    /// Get distance from location i to location j in meters
    pub fn distance(&self, from: usize, to: usize) -> u64 {
        self.distances[from][to]
    }

    /// Get duration from location i to location j in seconds
    pub fn duration(&self, from: usize, to: usize) -> u64 {
        self.durations[from][to]
    }

    /// Both matrices hold `size` rows of `size` cells
    pub fn is_square(&self) -> bool {
        let square = |m: &Vec<Vec<u64>>| m.len() == self.size && m.iter().all(|row| row.len() == self.size);
        square(&self.distances) && square(&self.durations)
    }

    /// First off-diagonal pair with no usable value, if any
    pub fn first_unreachable(&self) -> Option<(usize, usize)> {
        for i in 0..self.size {
            for j in 0..self.size {
                if i != j && (self.distances[i][j] >= UNREACHABLE || self.durations[i][j] >= UNREACHABLE) {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

/// Trip context forwarded to the routing engine
#[derive(Debug, Clone, Copy)]
pub struct MatrixOptions {
    pub vehicle_type: VehicleType,
    /// Departure used for time-dependent estimates; None ignores traffic
    pub departure: Option<NaiveDateTime>,
}

impl MatrixOptions {
    pub fn new(vehicle_type: VehicleType, departure: NaiveDateTime, consider_traffic: bool) -> Self {
        Self {
            vehicle_type,
            departure: consider_traffic.then_some(departure),
        }
    }
}

/// Routing service trait for abstraction (Valhalla, mock, etc.)
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Get distance and time matrices for a list of locations.
    /// First location is the route start.
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        options: &MatrixOptions,
    ) -> Result<DistanceTimeMatrices>;

    /// Get service name for logging
    fn name(&self) -> &str;
}

/// Mock routing service for tests
/// Uses Haversine distance × coefficient for estimation
pub struct MockRoutingService {
    /// Coefficient for converting straight-line to road distance (default: 1.3)
    road_coefficient: f64,
    /// Average speed in km/h for time estimation (default: 40)
    average_speed_kmh: f64,
    /// Duration multiplier for rush-hour departures when traffic is considered
    peak_factor: f64,
}

impl Default for MockRoutingService {
    fn default() -> Self {
        Self {
            road_coefficient: crate::services::geo::ROAD_COEFFICIENT,
            average_speed_kmh: crate::services::geo::AVERAGE_SPEED_KMH,
            peak_factor: 1.3,
        }
    }
}

impl MockRoutingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peak_factor(mut self, peak_factor: f64) -> Self {
        self.peak_factor = peak_factor;
        self
    }

    /// Duration multiplier for a departure time
    fn traffic_factor(&self, departure: Option<NaiveDateTime>) -> f64 {
        match departure.map(|d| d.hour()) {
            Some(7..=9) | Some(16..=18) => self.peak_factor,
            _ => 1.0,
        }
    }
}

#[async_trait]
impl RoutingService for MockRoutingService {
    async fn get_matrices(
        &self,
        locations: &[Coordinates],
        options: &MatrixOptions,
    ) -> Result<DistanceTimeMatrices> {
        use crate::services::geo::haversine_distance;

        let n = locations.len();
        if n == 0 {
            return Ok(DistanceTimeMatrices::empty());
        }

        let traffic = self.traffic_factor(options.departure);
        let mut distances = vec![vec![0u64; n]; n];
        let mut durations = vec![vec![0u64; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let road_km = haversine_distance(&locations[i], &locations[j]) * self.road_coefficient;
                    distances[i][j] = (road_km * 1000.0) as u64;
                    durations[i][j] = (road_km / self.average_speed_kmh * 3600.0 * traffic) as u64;
                }
            }
        }

        Ok(DistanceTimeMatrices {
            distances,
            durations,
            size: n,
        })
    }

    fn name(&self) -> &str {
        "MockRouting"
    }
}

/// Create routing service with automatic Valhalla detection and fallback
///
/// Tries to connect to Valhalla if URL is provided. Falls back to mock
/// routing service if Valhalla is unavailable or URL is not configured.
pub async fn create_routing_service_with_fallback(
    valhalla_url: Option<String>,
    timeout_seconds: u64,
    peak_factor: f64,
) -> Box<dyn RoutingService> {
    use tracing::{info, warn};

    if let Some(url) = valhalla_url {
        let config = ValhallaConfig {
            timeout_seconds,
            ..ValhallaConfig::new(&url)
        };

        match check_valhalla_health(&url).await {
            Ok(()) => match ValhallaClient::new(config) {
                Ok(client) => {
                    info!("Valhalla routing service available at {}", url);
                    return Box::new(client);
                }
                Err(e) => warn!("Failed to build Valhalla client: {}. Falling back to mock routing.", e),
            },
            Err(e) => {
                warn!("Valhalla not available at {}: {}. Falling back to mock routing.", url, e);
            }
        }
    }

    info!("Using mock routing service (Valhalla not configured or unavailable)");
    Box::new(MockRoutingService::new().with_peak_factor(peak_factor))
}

/// Check if Valhalla is healthy by making a simple status request
async fn check_valhalla_health(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let url = format!("{}/status", base_url);
    let response = client.get(&url).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("Valhalla returned status {}", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn harbor() -> Coordinates {
        Coordinates { lat: 40.7033, lng: -74.0170 }
    }

    fn uptown() -> Coordinates {
        Coordinates { lat: 40.8116, lng: -73.9465 }
    }

    fn eastside() -> Coordinates {
        Coordinates { lat: 40.7484, lng: -73.9857 }
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn opts() -> MatrixOptions {
        MatrixOptions::new(VehicleType::Car, at(11), false)
    }

    #[tokio::test]
    async fn test_mock_routing_empty_locations() {
        let service = MockRoutingService::new();
        let matrices = service.get_matrices(&[], &opts()).await.unwrap();

        assert_eq!(matrices.size, 0);
        assert!(matrices.distances.is_empty());
    }

    #[tokio::test]
    async fn test_mock_routing_single_location() {
        let service = MockRoutingService::new();
        let matrices = service.get_matrices(&[harbor()], &opts()).await.unwrap();

        assert_eq!(matrices.size, 1);
        assert_eq!(matrices.distance(0, 0), 0);
        assert_eq!(matrices.duration(0, 0), 0);
    }

    #[tokio::test]
    async fn test_mock_routing_symmetric_and_positive() {
        let service = MockRoutingService::new();
        let matrices = service
            .get_matrices(&[harbor(), uptown(), eastside()], &opts())
            .await
            .unwrap();

        assert_eq!(matrices.size, 3);
        for i in 0..3 {
            assert_eq!(matrices.distance(i, i), 0);
            for j in 0..3 {
                if i != j {
                    assert!(matrices.distance(i, j) > 0);
                    assert!(matrices.duration(i, j) > 0);
                    assert_eq!(matrices.distance(i, j), matrices.distance(j, i));
                }
            }
        }
        assert!(matrices.first_unreachable().is_none());
    }

    #[tokio::test]
    async fn test_mock_routing_rush_hour_is_slower_with_traffic() {
        let service = MockRoutingService::new();
        let locations = [harbor(), uptown()];

        let calm = service
            .get_matrices(&locations, &MatrixOptions::new(VehicleType::Car, at(8), false))
            .await
            .unwrap();
        let peak = service
            .get_matrices(&locations, &MatrixOptions::new(VehicleType::Car, at(8), true))
            .await
            .unwrap();
        let midday = service
            .get_matrices(&locations, &MatrixOptions::new(VehicleType::Car, at(12), true))
            .await
            .unwrap();

        assert!(peak.duration(0, 1) > calm.duration(0, 1));
        assert_eq!(midday.duration(0, 1), calm.duration(0, 1));
        assert_eq!(peak.distance(0, 1), calm.distance(0, 1));
    }

    #[test]
    fn test_first_unreachable() {
        let matrices = DistanceTimeMatrices {
            distances: vec![vec![0, 10], vec![UNREACHABLE, 0]],
            durations: vec![vec![0, 10], vec![10, 0]],
            size: 2,
        };
        assert_eq!(matrices.first_unreachable(), Some((1, 0)));
    }

    #[test]
    fn test_routing_service_name() {
        assert_eq!(MockRoutingService::new().name(), "MockRouting");
    }

    #[tokio::test]
    async fn test_create_routing_service_with_fallback_no_url() {
        let service = create_routing_service_with_fallback(None, 10, 1.3).await;
        assert_eq!(service.name(), "MockRouting");
    }

    #[tokio::test]
    async fn test_create_routing_service_with_fallback_invalid_url() {
        let service = create_routing_service_with_fallback(
            Some("http://127.0.0.1:9".to_string()),
            10,
            1.3,
        ).await;
        assert_eq!(service.name(), "MockRouting");
    }
}
