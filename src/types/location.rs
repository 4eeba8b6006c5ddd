//! Location types shared by geocoding, aggregation and routing

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A resolved delivery point: the address as entered plus its coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub address: String,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(address: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            address: address.into(),
            coordinates,
        }
    }
}

/// Delivery time window for a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Normalize a free-text address for comparison and caching.
///
/// Case, surrounding whitespace, repeated inner whitespace and a trailing
/// comma/period are not significant.
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c| c == ',' || c == '.')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address_ignores_case_and_spacing() {
        assert_eq!(
            normalize_address("  12 Market  Street, Springfield. "),
            normalize_address("12 market street, springfield")
        );
    }

    #[test]
    fn test_normalize_address_keeps_distinct_numbers() {
        assert_ne!(
            normalize_address("12 Market Street"),
            normalize_address("14 Market Street")
        );
    }
}
