//! Route optimizer input/output contract

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Location, OrderRef, TimeWindow, VehicleType};

/// A visitable stop before optimization: one location, one or more orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCandidate {
    pub id: String,
    pub location: Location,
    pub orders: Vec<OrderRef>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

impl StopCandidate {
    /// Order numbers served at the stop, comma separated
    pub fn order_number(&self) -> String {
        self.orders
            .iter()
            .map(|o| o.order_number.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Trip options passed to the optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeOptions {
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub consider_traffic: bool,
    pub departure_time: NaiveDateTime,
    pub max_stops_per_route: usize,
    /// Minutes spent at every stop
    pub service_time_per_stop: u32,
}

/// Optimizer input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    pub start_location: Location,
    pub stops: Vec<StopCandidate>,
    pub options: OptimizeOptions,
}

/// Strategy that produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// Provider matrix, nearest neighbor construction, pairwise swap refinement
    NearestNeighborSwap,
    /// Synthetic fixed-hop estimates (degraded mode)
    FallbackEstimate,
}

impl OptimizationMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            OptimizationMethod::NearestNeighborSwap => "nearest_neighbor_swap",
            OptimizationMethod::FallbackEstimate => "fallback_estimate",
        }
    }
}

/// A stop in the optimized visiting sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedStop {
    /// 1-based position in the route
    pub stop_order: i32,
    pub stop_id: String,
    pub location: Location,
    pub orders: Vec<OrderRef>,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Minutes of driving from the previous point
    pub estimated_travel_time: i32,
    /// Kilometers from the previous point
    pub estimated_distance: f64,
    pub estimated_arrival: NaiveDateTime,
    /// Minutes from route start to arrival here, service at earlier stops included
    pub cumulative_time: i32,
    /// Kilometers from route start
    pub cumulative_distance: f64,
    /// Minutes spent at this stop
    pub service_time: i32,
}

/// Optimizer output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedPlan {
    pub optimized_stops: Vec<OptimizedStop>,
    /// Kilometers
    pub total_distance: f64,
    /// Minutes from departure to arrival at the final stop, service at earlier stops included
    pub total_duration: i32,
    /// Minutes of driving only
    pub total_driving_time: i32,
    /// 0-100
    pub route_efficiency: f64,
    pub estimated_fuel_cost: f64,
    pub method: OptimizationMethod,
    pub warnings: Vec<String>,
}

impl OptimizedPlan {
    /// Plan for an empty stop list
    pub fn empty(method: OptimizationMethod) -> Self {
        Self {
            optimized_stops: vec![],
            total_distance: 0.0,
            total_duration: 0,
            total_driving_time: 0,
            route_efficiency: 100.0,
            estimated_fuel_cost: 0.0,
            method,
            warnings: vec![],
        }
    }

    /// Check the sequence invariants a route needs before it can be persisted:
    /// contiguous 1-based `stop_order`, non-decreasing cumulative metrics and
    /// every order appearing once.
    pub fn validate(&self) -> Result<(), String> {
        let mut prev_time = 0;
        let mut prev_distance = 0.0;
        let mut seen = HashSet::new();

        for (idx, stop) in self.optimized_stops.iter().enumerate() {
            let expected = idx as i32 + 1;
            if stop.stop_order != expected {
                return Err(format!(
                    "stop_order {} found at position {} (expected {})",
                    stop.stop_order, idx, expected
                ));
            }
            if stop.cumulative_time < prev_time || stop.cumulative_distance < prev_distance {
                return Err(format!("cumulative metrics decrease at stop {}", stop.stop_order));
            }
            if stop.orders.is_empty() {
                return Err(format!("stop {} has no orders", stop.stop_order));
            }
            for order in &stop.orders {
                if !seen.insert(order.order_id) {
                    return Err(format!("order {} appears more than once", order.order_number));
                }
            }
            prev_time = stop.cumulative_time;
            prev_distance = stop.cumulative_distance;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn stop(stop_order: i32, cumulative_time: i32, cumulative_distance: f64) -> OptimizedStop {
        OptimizedStop {
            stop_order,
            stop_id: format!("s{}", stop_order),
            location: Location::new("somewhere", Coordinates { lat: 0.0, lng: 0.0 }),
            orders: vec![OrderRef {
                order_id: Uuid::new_v4(),
                order_number: format!("ORD-{}", stop_order),
                customer_name: "C".to_string(),
                customer_phone: None,
                item_count: 1,
            }],
            time_window: None,
            estimated_travel_time: 5,
            estimated_distance: 1.0,
            estimated_arrival: NaiveDate::from_ymd_opt(2026, 3, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            cumulative_time,
            cumulative_distance,
            service_time: 5,
        }
    }

    fn plan(stops: Vec<OptimizedStop>) -> OptimizedPlan {
        OptimizedPlan {
            optimized_stops: stops,
            ..OptimizedPlan::empty(OptimizationMethod::NearestNeighborSwap)
        }
    }

    #[test]
    fn test_validate_accepts_contiguous_monotonic_plan() {
        let p = plan(vec![stop(1, 5, 1.0), stop(2, 15, 2.5), stop(3, 15, 2.5)]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_gap_in_stop_order() {
        let p = plan(vec![stop(1, 5, 1.0), stop(3, 15, 2.0)]);
        assert!(p.validate().unwrap_err().contains("stop_order 3"));
    }

    #[test]
    fn test_validate_rejects_decreasing_cumulative_distance() {
        let p = plan(vec![stop(1, 5, 3.0), stop(2, 15, 2.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_repeated_order() {
        let first = stop(1, 5, 1.0);
        let mut second = stop(2, 10, 2.0);
        second.orders = first.orders.clone();
        assert!(plan(vec![first, second]).validate().unwrap_err().contains("more than once"));
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(OptimizationMethod::FallbackEstimate.as_str(), "fallback_estimate");
        let json = serde_json::to_string(&OptimizationMethod::NearestNeighborSwap).unwrap();
        assert_eq!(json, "\"nearest_neighbor_swap\"");
    }
}
