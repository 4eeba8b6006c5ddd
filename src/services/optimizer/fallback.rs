//! Degraded-mode optimizer
//!
//! Needs no external service. Orders stops by time window start and priority
//! (input order otherwise) and prices every hop with the same synthetic
//! distance and time, so totals scale with the stop count.

use std::cmp::Ordering;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::types::{OptimizationMethod, OptimizeRequest, OptimizedPlan, StopCandidate};

use super::timeline::{build_plan, Leg};
use super::{validate_request, OptimizerSettings, RouteOptimizer};

pub const DEGRADED_NOTICE: &str =
    "Distances and times are synthetic estimates (fixed per hop), not road-network values";

/// Deterministic fixed-hop estimator
pub struct FallbackOptimizer {
    settings: OptimizerSettings,
}

impl FallbackOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    /// Stops with a window come first, earliest start first; then lower
    /// priority value first. Stable, so remaining ties keep input order.
    fn sequence(stops: &[StopCandidate]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..stops.len()).collect();
        order.sort_by(|&a, &b| compare_stops(&stops[a], &stops[b]));
        order
    }

    fn hop(&self) -> Leg {
        Leg {
            distance_m: (self.settings.fallback_hop_km.max(0.0) * 1000.0).round() as u64,
            duration_s: self.settings.fallback_hop_minutes as u64 * 60,
        }
    }
}

fn compare_stops(a: &StopCandidate, b: &StopCandidate) -> Ordering {
    let window = match (&a.time_window, &b.time_window) {
        (Some(x), Some(y)) => x.start.cmp(&y.start),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let priority = match (a.priority, b.priority) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    window.then(priority)
}

#[async_trait]
impl RouteOptimizer for FallbackOptimizer {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizedPlan> {
        validate_request(request)?;

        if request.stops.is_empty() {
            return Ok(OptimizedPlan::empty(self.method()));
        }

        let sequence = Self::sequence(&request.stops);
        let legs = vec![self.hop(); sequence.len()];

        debug!("Fallback estimate for {} stops", sequence.len());

        Ok(build_plan(
            request,
            &sequence,
            &legs,
            &self.settings,
            self.method(),
            self.settings.fallback_route_efficiency,
            vec![DEGRADED_NOTICE.to_string()],
        ))
    }

    fn method(&self) -> OptimizationMethod {
        OptimizationMethod::FallbackEstimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::services::optimizer::test_support::{candidate, request};
    use crate::types::TimeWindow;
    use chrono::NaiveTime;

    fn window(start_hour: u32) -> Option<TimeWindow> {
        Some(TimeWindow {
            start: NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(start_hour + 2, 0, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_fallback_keeps_input_order_without_hints() {
        let optimizer = FallbackOptimizer::new(OptimizerSettings::default());
        let req = request(vec![candidate("c", 1), candidate("a", 2), candidate("b", 3)]);

        let plan = optimizer.optimize(&req).await.unwrap();

        let ids: Vec<&str> = plan.optimized_stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_fallback_orders_by_window_then_priority() {
        let optimizer = FallbackOptimizer::new(OptimizerSettings::default());
        let mut late = candidate("late", 1);
        late.time_window = window(14);
        let mut early = candidate("early", 2);
        early.time_window = window(9);
        let mut urgent = candidate("urgent", 3);
        urgent.priority = Some(1);
        let plain = candidate("plain", 4);
        let req = request(vec![plain, late, urgent, early]);

        let plan = optimizer.optimize(&req).await.unwrap();

        let ids: Vec<&str> = plan.optimized_stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "urgent", "plain"]);
    }

    #[tokio::test]
    async fn test_fallback_totals_scale_with_stop_count() {
        let settings = OptimizerSettings::default();
        let optimizer = FallbackOptimizer::new(settings.clone());
        let req = request((1..=4).map(|i| candidate(&format!("s{}", i), i)).collect());

        let plan = optimizer.optimize(&req).await.unwrap();

        assert!((plan.total_distance - 4.0 * settings.fallback_hop_km).abs() < 1e-9);
        assert_eq!(plan.total_driving_time, 4 * settings.fallback_hop_minutes as i32);
        assert_eq!(plan.route_efficiency, settings.fallback_route_efficiency);
        assert_eq!(plan.method, OptimizationMethod::FallbackEstimate);
        assert!(plan.warnings.iter().any(|w| w == DEGRADED_NOTICE));
        assert!(plan.validate().is_ok());

        let arrivals: Vec<_> = plan.optimized_stops.iter().map(|s| s.estimated_arrival).collect();
        assert!(arrivals.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_fallback_rejects_too_many_stops() {
        let optimizer = FallbackOptimizer::new(OptimizerSettings::default());
        let mut req = request((1..=3).map(|i| candidate(&format!("s{}", i), i)).collect());
        req.options.max_stops_per_route = 2;

        let err = optimizer.optimize(&req).await.unwrap_err();
        assert!(matches!(err, DispatchError::TooManyStops { count: 3, max: 2 }));
    }
}
