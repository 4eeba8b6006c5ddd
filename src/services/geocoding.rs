//! Location resolution (free-text address → coordinates)
//!
//! The order store hands us delivery addresses as typed by customers. The
//! `Geocoder` trait is the adapter boundary to the mapping provider:
//! - `MockGeocoder` for tests and local runs (deterministic, no network)
//! - `RateLimitedNominatimGeocoder` for production (rate limit + circuit breaker)
//!
//! Backend is selected with `GEOCODER_BACKEND` ("mock" | "nominatim").

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::services::nominatim::NominatimClient;
use crate::types::{normalize_address, Coordinates};

/// Geocoder trait - abstraction for all geocoding implementations
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Geocode a free-text address.
    /// Returns None if the address cannot be matched.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>>;

    /// Get the name of this geocoder implementation
    fn name(&self) -> &'static str;
}

/// Result of geocoding operation
#[derive(Debug, Clone)]
pub struct GeocodingResult {
    pub coordinates: Coordinates,
    /// Confidence score 0.0-1.0
    pub confidence: f64,
    pub display_name: String,
}

// ==========================================================================
// MockGeocoder Implementation
// ==========================================================================

/// Mock geocoder - deterministic fake coordinates derived from the address
#[derive(Default)]
pub struct MockGeocoder {
    fixed: HashMap<String, Coordinates>,
    unresolvable: HashSet<String>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an address to known coordinates
    pub fn with_location(mut self, address: &str, coordinates: Coordinates) -> Self {
        self.fixed.insert(normalize_address(address), coordinates);
        self
    }

    /// Make an address return "no match"
    pub fn with_unresolvable(mut self, address: &str) -> Self {
        self.unresolvable.insert(normalize_address(address));
        self
    }

    /// Generate deterministic coordinates from the normalized address hash.
    /// Points land inside a ~25 km box so mock trips stay city sized.
    fn hash_to_coordinates(normalized: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        let hash = hasher.finish();

        const LAT_MIN: f64 = 40.60;
        const LAT_MAX: f64 = 40.82;
        const LNG_MIN: f64 = -74.05;
        const LNG_MAX: f64 = -73.80;

        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFFFFFF) as f64) / (u32::MAX as f64);

        Coordinates {
            lat: LAT_MIN + lat_normalized * (LAT_MAX - LAT_MIN),
            lng: LNG_MIN + lng_normalized * (LNG_MAX - LNG_MIN),
        }
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        let normalized = normalize_address(address);
        if normalized.is_empty() || self.unresolvable.contains(&normalized) {
            return Ok(None);
        }

        let coordinates = self
            .fixed
            .get(&normalized)
            .copied()
            .unwrap_or_else(|| Self::hash_to_coordinates(&normalized));

        Ok(Some(GeocodingResult {
            coordinates,
            confidence: 0.95,
            display_name: address.trim().to_string(),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ==========================================================================
// RateLimiter Implementation
// ==========================================================================

/// Rate limiter that enforces minimum interval between calls
pub struct RateLimiter {
    last_call: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    /// Wait until it's safe to make another call
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                drop(last); // Release lock while sleeping
                tokio::time::sleep(wait_time).await;
                last = self.last_call.lock().await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ==========================================================================
// CircuitBreaker Implementation
// ==========================================================================

/// Circuit breaker to prevent hammering a failing service
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
    last_failure: parking_lot::Mutex<Option<Instant>>,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
            last_failure: parking_lot::Mutex::new(None),
            recovery_time,
        }
    }

    /// Check if circuit is open (blocking calls)
    pub fn is_open(&self) -> bool {
        if self.failure_count.load(Ordering::Relaxed) < self.threshold {
            return false;
        }
        match *self.last_failure.lock() {
            // Half-open: allow a retry once recovery time has passed
            Some(last_time) => last_time.elapsed() < self.recovery_time,
            None => true,
        }
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(Instant::now());
    }

    /// Record a success (resets failure count)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

// ==========================================================================
// RateLimitedNominatimGeocoder Implementation
// ==========================================================================

/// Default rate limit interval (1.5 seconds - public Nominatim allows 1 req/s)
const DEFAULT_RATE_LIMIT_MS: u64 = 1500;

const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

const DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS: u64 = 300;

/// Rate-limited Nominatim geocoder with circuit breaker protection
pub struct RateLimitedNominatimGeocoder {
    client: NominatimClient,
    rate_limiter: RateLimiter,
    pub(crate) circuit_breaker: CircuitBreaker,
}

impl RateLimitedNominatimGeocoder {
    pub fn with_config(
        client: NominatimClient,
        rate_limit_interval: Duration,
        circuit_breaker_threshold: u32,
        circuit_breaker_recovery: Duration,
    ) -> Self {
        Self {
            client,
            rate_limiter: RateLimiter::new(rate_limit_interval),
            circuit_breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_recovery),
        }
    }

    /// Create from environment variables
    ///
    /// - `NOMINATIM_RATE_LIMIT_MS`: minimum interval between requests (default: 1500)
    /// - `NOMINATIM_CB_THRESHOLD`: circuit breaker failure threshold (default: 3)
    /// - `NOMINATIM_CB_RECOVERY_SECS`: circuit breaker recovery time (default: 300)
    pub fn from_env(client: NominatimClient) -> Self {
        let rate_limit_ms = env_or("NOMINATIM_RATE_LIMIT_MS", DEFAULT_RATE_LIMIT_MS);
        let cb_threshold = env_or("NOMINATIM_CB_THRESHOLD", DEFAULT_CIRCUIT_BREAKER_THRESHOLD);
        let cb_recovery_secs = env_or("NOMINATIM_CB_RECOVERY_SECS", DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS);

        Self::with_config(
            client,
            Duration::from_millis(rate_limit_ms),
            cb_threshold,
            Duration::from_secs(cb_recovery_secs),
        )
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[async_trait]
impl Geocoder for RateLimitedNominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        if self.circuit_breaker.is_open() {
            tracing::warn!("Circuit breaker is open, rejecting geocoding request");
            anyhow::bail!("Geocoding service temporarily unavailable (circuit breaker open)");
        }

        self.rate_limiter.wait().await;

        match self.client.geocode(address).await {
            Ok(Some(found)) => {
                self.circuit_breaker.record_success();
                Ok(Some(GeocodingResult {
                    coordinates: found.coordinates,
                    confidence: 0.8, // Nominatim doesn't provide confidence, use default
                    display_name: found.display_name,
                }))
            }
            Ok(None) => {
                // No result found is not a failure
                self.circuit_breaker.record_success();
                Ok(None)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!("Geocoding failed: {}", e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

// ==========================================================================
// Factory function
// ==========================================================================

/// Create geocoder for the configured backend ("mock" or "nominatim")
pub fn create_geocoder(
    backend: &str,
    nominatim_url: &str,
    country_codes: Option<String>,
    timeout: Duration,
) -> Result<Box<dyn Geocoder>> {
    match backend {
        "mock" => {
            tracing::info!("Using MockGeocoder");
            Ok(Box::new(MockGeocoder::new()))
        }
        "nominatim" => {
            tracing::info!("Using RateLimitedNominatimGeocoder at {}", nominatim_url);
            let client = NominatimClient::new(nominatim_url, timeout)?.with_country_codes(country_codes);
            Ok(Box::new(RateLimitedNominatimGeocoder::from_env(client)))
        }
        _ => {
            tracing::warn!("Unknown GEOCODER_BACKEND '{}', using mock", backend);
            Ok(Box::new(MockGeocoder::new()))
        }
    }
}
