//! Turns a visiting sequence plus per-leg estimates into an OptimizedPlan
//!
//! Both strategies share this so their outputs obey the same invariants:
//! cumulative metrics are accumulated as integers (meters, seconds) and only
//! converted at the end, which keeps them monotonic.

use chrono::Duration;

use crate::types::{
    OptimizationMethod, OptimizeRequest, OptimizedPlan, OptimizedStop, StopCandidate,
};

use super::OptimizerSettings;

/// Drive from the previous point to a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leg {
    pub distance_m: u64,
    pub duration_s: u64,
}

/// Minutes spent at a stop: base service time plus an increment per extra order
pub fn service_minutes(stop: &StopCandidate, base_minutes: u32, settings: &OptimizerSettings) -> u32 {
    let extra_orders = stop.orders.len().saturating_sub(1) as u32;
    base_minutes + extra_orders * settings.service_minutes_per_extra_order
}

pub fn meters_to_km(meters: u64) -> f64 {
    meters as f64 / 1000.0
}

pub fn seconds_to_minutes(seconds: u64) -> i32 {
    ((seconds + 30) / 60) as i32
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build the plan for `sequence` (indices into `request.stops`), where
/// `legs[k]` is the drive into `sequence[k]`.
pub fn build_plan(
    request: &OptimizeRequest,
    sequence: &[usize],
    legs: &[Leg],
    settings: &OptimizerSettings,
    method: OptimizationMethod,
    route_efficiency: f64,
    mut warnings: Vec<String>,
) -> OptimizedPlan {
    debug_assert_eq!(sequence.len(), legs.len());

    let options = &request.options;
    let mut optimized_stops = Vec::with_capacity(sequence.len());
    let mut distance_m: u64 = 0;
    let mut driving_s: u64 = 0;
    let mut service_s: u64 = 0;
    let mut elapsed_at_last_arrival: u64 = 0;

    for (position, (&idx, leg)) in sequence.iter().zip(legs).enumerate() {
        let stop = &request.stops[idx];

        distance_m += leg.distance_m;
        driving_s += leg.duration_s;
        let elapsed_s = driving_s + service_s;
        elapsed_at_last_arrival = elapsed_s;

        let estimated_arrival = options.departure_time + Duration::seconds(elapsed_s as i64);
        let service = service_minutes(stop, options.service_time_per_stop, settings);
        let stop_order = position as i32 + 1;

        if let Some(window) = &stop.time_window {
            // Windows are on the departure day
            let window_end = options.departure_time.date().and_time(window.end);
            if estimated_arrival > window_end {
                let arrival_format = if estimated_arrival.date() == window_end.date() { "%H:%M" } else { "%Y-%m-%d %H:%M" };
                warnings.push(format!(
                    "stop {} ({}) arrives after its time window ({} > {})",
                    stop_order,
                    stop.location.address,
                    estimated_arrival.format(arrival_format),
                    window.end.format("%H:%M"),
                ));
            }
        }

        optimized_stops.push(OptimizedStop {
            stop_order,
            stop_id: stop.id.clone(),
            location: stop.location.clone(),
            orders: stop.orders.clone(),
            time_window: stop.time_window.clone(),
            estimated_travel_time: seconds_to_minutes(leg.duration_s),
            estimated_distance: meters_to_km(leg.distance_m),
            estimated_arrival,
            cumulative_time: seconds_to_minutes(elapsed_s),
            cumulative_distance: meters_to_km(distance_m),
            service_time: service as i32,
        });

        service_s += service as u64 * 60;
    }

    let total_distance = meters_to_km(distance_m);
    let fuel = total_distance * settings.fuel_cost_per_km * options.vehicle_type.fuel_factor();

    OptimizedPlan {
        optimized_stops,
        total_distance,
        total_duration: seconds_to_minutes(elapsed_at_last_arrival),
        total_driving_time: seconds_to_minutes(driving_s),
        route_efficiency: round2(route_efficiency.clamp(0.0, 100.0)),
        estimated_fuel_cost: round2(fuel),
        method,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinates, Location, OptimizeOptions, OrderRef, TimeWindow, VehicleType};
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn order(n: u32) -> OrderRef {
        OrderRef {
            order_id: Uuid::new_v4(),
            order_number: format!("ORD-{}", n),
            customer_name: format!("Customer {}", n),
            customer_phone: None,
            item_count: 1,
        }
    }

    fn candidate(id: &str, orders: Vec<OrderRef>) -> StopCandidate {
        StopCandidate {
            id: id.to_string(),
            location: Location::new(id, Coordinates { lat: 40.7, lng: -73.9 }),
            orders,
            priority: None,
            time_window: None,
        }
    }

    fn request(stops: Vec<StopCandidate>) -> OptimizeRequest {
        OptimizeRequest {
            start_location: Location::new("depot", Coordinates { lat: 40.7, lng: -74.0 }),
            stops,
            options: OptimizeOptions {
                vehicle_type: VehicleType::Van,
                consider_traffic: false,
                departure_time: NaiveDate::from_ymd_opt(2026, 3, 2)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
                max_stops_per_route: 10,
                service_time_per_stop: 5,
            },
        }
    }

    #[test]
    fn test_service_minutes_adds_increment_per_extra_order() {
        let settings = OptimizerSettings::default();
        let single = candidate("a", vec![order(1)]);
        let triple = candidate("b", vec![order(2), order(3), order(4)]);

        assert_eq!(service_minutes(&single, 5, &settings), 5);
        assert_eq!(service_minutes(&triple, 5, &settings), 9);
    }

    #[test]
    fn test_arrivals_include_service_at_earlier_stops() {
        let settings = OptimizerSettings::default();
        let req = request(vec![
            candidate("a", vec![order(1), order(2)]),
            candidate("b", vec![order(3)]),
        ]);
        let legs = [
            Leg { distance_m: 3000, duration_s: 600 },
            Leg { distance_m: 2000, duration_s: 300 },
        ];

        let plan = build_plan(&req, &[0, 1], &legs, &settings, OptimizationMethod::NearestNeighborSwap, 90.0, vec![]);

        let first = &plan.optimized_stops[0];
        let second = &plan.optimized_stops[1];
        assert_eq!(first.estimated_arrival.time(), NaiveTime::from_hms_opt(9, 10, 0).unwrap());
        assert_eq!(first.service_time, 7);
        // 10 min drive + 7 min service + 5 min drive
        assert_eq!(second.cumulative_time, 22);
        assert_eq!(second.estimated_arrival.time(), NaiveTime::from_hms_opt(9, 22, 0).unwrap());
        assert_eq!(plan.total_driving_time, 15);
        assert_eq!(plan.total_duration, 22);
        assert!((plan.total_distance - 5.0).abs() < 1e-9);
        assert!((second.cumulative_distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuel_cost_uses_vehicle_factor() {
        let settings = OptimizerSettings::default();
        let req = request(vec![candidate("a", vec![order(1)])]);
        let legs = [Leg { distance_m: 10_000, duration_s: 900 }];

        let plan = build_plan(&req, &[0], &legs, &settings, OptimizationMethod::NearestNeighborSwap, 100.0, vec![]);

        // 10 km * 0.15 * 1.3 (van)
        assert!((plan.estimated_fuel_cost - 1.95).abs() < 1e-9);
    }

    #[test]
    fn test_late_arrival_produces_time_window_warning() {
        let settings = OptimizerSettings::default();
        let mut stop = candidate("Late Lane 1", vec![order(1)]);
        stop.time_window = Some(TimeWindow {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
        });
        let req = request(vec![stop]);
        let legs = [Leg { distance_m: 20_000, duration_s: 1800 }];

        let plan = build_plan(&req, &[0], &legs, &settings, OptimizationMethod::NearestNeighborSwap, 100.0, vec![]);

        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].starts_with("stop 1 (Late Lane 1) arrives after its time window"));
    }

    #[test]
    fn test_arrival_after_midnight_misses_window() {
        let settings = OptimizerSettings::default();
        let mut stop = candidate("Night Rd 4", vec![order(1)]);
        stop.time_window = Some(TimeWindow {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        });
        let mut req = request(vec![stop]);
        req.options.departure_time = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(22, 0, 0).unwrap();
        // Lands at 00:30 the next day, which reads as "early" by clock time
        let legs = [Leg { distance_m: 150_000, duration_s: 9000 }];

        let plan = build_plan(&req, &[0], &legs, &settings, OptimizationMethod::NearestNeighborSwap, 100.0, vec![]);

        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("(2026-03-03 00:30 > 17:00)"));
    }

    #[test]
    fn test_efficiency_is_clamped() {
        let settings = OptimizerSettings::default();
        let req = request(vec![candidate("a", vec![order(1)])]);
        let legs = [Leg { distance_m: 1000, duration_s: 60 }];

        let plan = build_plan(&req, &[0], &legs, &settings, OptimizationMethod::NearestNeighborSwap, 140.0, vec![]);

        assert_eq!(plan.route_efficiency, 100.0);
        assert!(plan.validate().is_ok());
    }
}
