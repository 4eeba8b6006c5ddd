//! Optimizer configuration

use std::time::Duration;

use anyhow::{Context, Result};

/// Tunables for aggregation, optimization and cost estimation
#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    /// Upper bound on a provider-assisted optimization before falling back
    pub provider_timeout_secs: u64,
    /// Upper bound on a single address lookup
    pub geocode_timeout_secs: u64,
    /// Default for requests that don't specify one
    pub max_stops_per_route: usize,
    /// Default service time at a stop in minutes
    pub service_minutes_per_stop: u32,
    /// Extra minutes for every order beyond the first at a stop
    pub service_minutes_per_extra_order: u32,
    pub fuel_cost_per_km: f64,
    /// Degraded mode: assumed kilometers per hop
    pub fallback_hop_km: f64,
    /// Degraded mode: assumed minutes per hop
    pub fallback_hop_minutes: u32,
    /// Degraded mode: efficiency reported for synthetic plans
    pub fallback_route_efficiency: f64,
    /// Maximum refinement passes over the visiting sequence
    pub swap_iteration_budget: usize,
    /// Orders closer than this are served by one stop
    pub location_tolerance_meters: f64,
    /// Rush-hour duration multiplier for the mock routing service
    pub traffic_peak_factor: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 20,
            geocode_timeout_secs: 10,
            max_stops_per_route: 50,
            service_minutes_per_stop: 5,
            service_minutes_per_extra_order: 2,
            fuel_cost_per_km: 0.15,
            fallback_hop_km: 5.0,
            fallback_hop_minutes: 12,
            fallback_route_efficiency: 70.0,
            swap_iteration_budget: 100,
            location_tolerance_meters: 25.0,
            traffic_peak_factor: 1.3,
        }
    }
}

impl OptimizerSettings {
    /// Load overrides from environment, keeping defaults for unset keys
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        Ok(Self {
            provider_timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", d.provider_timeout_secs)?,
            geocode_timeout_secs: env_parse("GEOCODE_TIMEOUT_SECS", d.geocode_timeout_secs)?,
            max_stops_per_route: env_parse("MAX_STOPS_PER_ROUTE", d.max_stops_per_route)?,
            service_minutes_per_stop: env_parse("SERVICE_MINUTES_PER_STOP", d.service_minutes_per_stop)?,
            service_minutes_per_extra_order: env_parse(
                "SERVICE_MINUTES_PER_EXTRA_ORDER",
                d.service_minutes_per_extra_order,
            )?,
            fuel_cost_per_km: env_parse("FUEL_COST_PER_KM", d.fuel_cost_per_km)?,
            fallback_hop_km: env_parse("FALLBACK_HOP_KM", d.fallback_hop_km)?,
            fallback_hop_minutes: env_parse("FALLBACK_HOP_MINUTES", d.fallback_hop_minutes)?,
            fallback_route_efficiency: env_parse("FALLBACK_ROUTE_EFFICIENCY", d.fallback_route_efficiency)?,
            swap_iteration_budget: env_parse("SWAP_ITERATION_BUDGET", d.swap_iteration_budget)?,
            location_tolerance_meters: env_parse("LOCATION_TOLERANCE_METERS", d.location_tolerance_meters)?,
            traffic_peak_factor: env_parse("TRAFFIC_PEAK_FACTOR", d.traffic_peak_factor)?,
        })
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        _ => Ok(default),
    }
}
