//! Location resolver: free-text address to a geocoded point

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::services::geocoding::Geocoder;
use crate::types::{normalize_address, Coordinates, Location};

/// Why an address could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    EmptyAddress,
    NoMatch,
    TimedOut(Duration),
    Provider(String),
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveFailure::EmptyAddress => write!(f, "address is empty"),
            ResolveFailure::NoMatch => write!(f, "no match found"),
            ResolveFailure::TimedOut(limit) => write!(f, "geocoder gave no answer within {}s", limit.as_secs()),
            ResolveFailure::Provider(msg) => write!(f, "geocoder error: {}", msg),
        }
    }
}

/// Geocoder adapter with a per-call timeout and a per-instance cache
/// keyed by normalized address. Failures are not cached.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
    cache: Mutex<HashMap<String, Coordinates>>,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, timeout: Duration) -> Self {
        Self {
            geocoder,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, address: &str) -> Result<Location, ResolveFailure> {
        let key = normalize_address(address);
        if key.is_empty() {
            return Err(ResolveFailure::EmptyAddress);
        }

        if let Some(coordinates) = self.cache.lock().get(&key).copied() {
            return Ok(Location::new(address.trim(), coordinates));
        }

        let result = tokio::time::timeout(self.timeout, self.geocoder.geocode(address)).await;

        let coordinates = match result {
            Ok(Ok(Some(hit))) => hit.coordinates,
            Ok(Ok(None)) => return Err(ResolveFailure::NoMatch),
            Ok(Err(e)) => {
                warn!("Geocoder {} failed for '{}': {:#}", self.geocoder.name(), address, e);
                return Err(ResolveFailure::Provider(e.to_string()));
            }
            Err(_) => {
                warn!("Geocoder {} timed out for '{}'", self.geocoder.name(), address);
                return Err(ResolveFailure::TimedOut(self.timeout));
            }
        };

        debug!("Resolved '{}' to ({:.5}, {:.5})", address, coordinates.lat, coordinates.lng);
        self.cache.lock().insert(key, coordinates);
        Ok(Location::new(address.trim(), coordinates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geocoding::{GeocodingResult, MockGeocoder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingGeocoder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, _address: &str) -> anyhow::Result<Option<GeocodingResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(GeocodingResult {
                coordinates: Coordinates { lat: 1.0, lng: 2.0 },
                confidence: 1.0,
                display_name: "x".to_string(),
            }))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct SlowGeocoder;

    #[async_trait]
    impl Geocoder for SlowGeocoder {
        async fn geocode(&self, _address: &str) -> anyhow::Result<Option<GeocodingResult>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_resolve_caches_by_normalized_address() {
        let geocoder = Arc::new(CountingGeocoder { calls: AtomicU32::new(0) });
        let resolver = LocationResolver::new(geocoder.clone(), Duration::from_secs(1));

        let first = resolver.resolve("12 Market St").await.unwrap();
        let second = resolver.resolve("  12 MARKET st ").await.unwrap();

        assert_eq!(first.coordinates, second.coordinates);
        assert_eq!(second.address, "12 MARKET st");
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_reports_no_match_and_empty() {
        let geocoder = Arc::new(MockGeocoder::new().with_unresolvable("Nowhere 0"));
        let resolver = LocationResolver::new(geocoder, Duration::from_secs(1));

        assert_eq!(resolver.resolve("Nowhere 0").await.unwrap_err(), ResolveFailure::NoMatch);
        assert_eq!(resolver.resolve("   ").await.unwrap_err(), ResolveFailure::EmptyAddress);
    }

    #[tokio::test]
    async fn test_resolve_times_out() {
        let resolver = LocationResolver::new(Arc::new(SlowGeocoder), Duration::from_millis(20));

        let err = resolver.resolve("1 Slow Road").await.unwrap_err();
        assert!(matches!(err, ResolveFailure::TimedOut(_)));
    }
}
