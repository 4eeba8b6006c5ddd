//! Provider-assisted optimizer
//!
//! Asks the routing service for a distance/time matrix over
//! [start, stop 1, ..., stop n], builds a nearest neighbor sequence over
//! distances and refines it with pairwise swaps. The route is open: the
//! driver does not return to the start.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DispatchError, Result};
use crate::services::routing::{DistanceTimeMatrices, MatrixOptions, RoutingService};
use crate::types::{Coordinates, OptimizationMethod, OptimizeRequest, OptimizedPlan};

use super::timeline::{build_plan, Leg};
use super::{validate_request, OptimizerSettings, RouteOptimizer};

/// Nearest neighbor + pairwise swap over provider matrices
pub struct ProviderOptimizer {
    routing: Arc<dyn RoutingService>,
    settings: OptimizerSettings,
}

impl ProviderOptimizer {
    pub fn new(routing: Arc<dyn RoutingService>, settings: OptimizerSettings) -> Self {
        Self { routing, settings }
    }

    /// Greedy construction from the start (matrix index 0).
    ///
    /// Scans candidates in ascending index with a strict comparison, so equal
    /// distances keep input order. Returns matrix indices (1..size).
    fn nearest_neighbor(matrices: &DistanceTimeMatrices) -> Vec<usize> {
        let n = matrices.size;
        if n <= 1 {
            return vec![];
        }

        let mut visited = vec![false; n];
        let mut route = Vec::with_capacity(n - 1);
        visited[0] = true;
        let mut current = 0;

        for _ in 1..n {
            let mut best_next = None;
            let mut best_distance = u64::MAX;

            for j in 1..n {
                if !visited[j] {
                    let dist = matrices.distance(current, j);
                    if dist < best_distance {
                        best_distance = dist;
                        best_next = Some(j);
                    }
                }
            }

            if let Some(next) = best_next {
                visited[next] = true;
                route.push(next);
                current = next;
            }
        }

        route
    }

    /// Open path distance from the start through `route`
    fn path_distance(route: &[usize], matrices: &DistanceTimeMatrices) -> u64 {
        let mut total = 0;
        let mut prev = 0;
        for &idx in route {
            total += matrices.distance(prev, idx);
            prev = idx;
        }
        total
    }

    /// Pairwise swap refinement.
    ///
    /// Each pass applies every improving swap it finds; stops when a pass
    /// finds none or the pass budget is spent. Returns the passes used.
    fn refine_with_swaps(route: &mut [usize], matrices: &DistanceTimeMatrices, max_passes: usize) -> usize {
        let n = route.len();
        if n < 2 {
            return 0;
        }

        let mut best = Self::path_distance(route, matrices);
        let mut passes = 0;

        while passes < max_passes {
            passes += 1;
            let mut improved = false;

            for i in 0..n - 1 {
                for j in i + 1..n {
                    route.swap(i, j);
                    let candidate = Self::path_distance(route, matrices);
                    if candidate < best {
                        best = candidate;
                        improved = true;
                    } else {
                        route.swap(i, j);
                    }
                }
            }

            if !improved {
                break;
            }
        }

        passes
    }

    /// Ideal distance: every stop reached by its shortest incoming edge
    fn lower_bound(matrices: &DistanceTimeMatrices) -> u64 {
        (1..matrices.size)
            .map(|to| {
                (0..matrices.size)
                    .filter(|&from| from != to)
                    .map(|from| matrices.distance(from, to))
                    .min()
                    .unwrap_or(0)
            })
            .sum()
    }

    fn efficiency(lower_bound: u64, actual: u64) -> f64 {
        if actual == 0 {
            100.0
        } else {
            (lower_bound as f64 / actual as f64 * 100.0).min(100.0)
        }
    }
}

#[async_trait]
impl RouteOptimizer for ProviderOptimizer {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizedPlan> {
        validate_request(request)?;

        if request.stops.is_empty() {
            return Ok(OptimizedPlan::empty(self.method()));
        }

        let started_at = Instant::now();
        let locations: Vec<Coordinates> = std::iter::once(request.start_location.coordinates)
            .chain(request.stops.iter().map(|s| s.location.coordinates))
            .collect();

        let options = &request.options;
        let matrix_options = MatrixOptions::new(options.vehicle_type, options.departure_time, options.consider_traffic);

        let matrices = self
            .routing
            .get_matrices(&locations, &matrix_options)
            .await
            .map_err(|e| DispatchError::OptimizationProvider(format!("{}: {:#}", self.routing.name(), e)))?;

        if matrices.size != locations.len() || !matrices.is_square() {
            return Err(DispatchError::OptimizationProvider(format!(
                "{} returned a {}-row matrix for {} locations",
                self.routing.name(),
                matrices.distances.len(),
                locations.len()
            )));
        }

        if let Some((from, to)) = matrices.first_unreachable() {
            return Err(DispatchError::OptimizationProvider(format!(
                "{} has no route between {} and {}",
                self.routing.name(),
                locations_label(request, from),
                locations_label(request, to)
            )));
        }

        let mut route = Self::nearest_neighbor(&matrices);
        let initial = Self::path_distance(&route, &matrices);
        let passes = Self::refine_with_swaps(&mut route, &matrices, self.settings.swap_iteration_budget);
        let actual = Self::path_distance(&route, &matrices);

        let mut prev = 0;
        let legs: Vec<Leg> = route
            .iter()
            .map(|&idx| {
                let leg = Leg {
                    distance_m: matrices.distance(prev, idx),
                    duration_s: matrices.duration(prev, idx),
                };
                prev = idx;
                leg
            })
            .collect();
        let sequence: Vec<usize> = route.iter().map(|idx| idx - 1).collect();

        let efficiency = Self::efficiency(Self::lower_bound(&matrices), actual);

        debug!(
            "Swap refinement: {} passes, {} m -> {} m",
            passes, initial, actual
        );
        info!(
            "Optimized {} stops via {} in {} ms ({:.1} km)",
            sequence.len(),
            self.routing.name(),
            started_at.elapsed().as_millis(),
            actual as f64 / 1000.0
        );

        Ok(build_plan(
            request,
            &sequence,
            &legs,
            &self.settings,
            self.method(),
            efficiency,
            vec![],
        ))
    }

    fn method(&self) -> OptimizationMethod {
        OptimizationMethod::NearestNeighborSwap
    }
}

/// Address for a matrix index (0 is the start)
fn locations_label(request: &OptimizeRequest, idx: usize) -> &str {
    match idx {
        0 => &request.start_location.address,
        i => &request.stops[i - 1].location.address,
    }
}
