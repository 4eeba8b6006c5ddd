//! Route planning and creation
//!
//! eligible orders -> stop aggregation -> optimization -> persistence

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RouteStore;
use crate::error::{DispatchError, Result};
use crate::services::aggregator::StopAggregator;
use crate::services::optimizer::{OptimizerSettings, RouteOptimizer};
use crate::services::resolver::LocationResolver;
use crate::types::{
    CreateRouteRequest, CreatedRoute, DispatchRouteRequest, Driver, EligibleOrderFilter, NewRoute, NewRouteStop,
    OptimizeOptions, OptimizeRequest, OptimizedPlan, Order, PlanRouteRequest, RouteAssignment, RouteDetail,
    RoutePlan,
};

pub struct DispatchService {
    store: Arc<dyn RouteStore>,
    resolver: Arc<LocationResolver>,
    optimizer: Arc<dyn RouteOptimizer>,
    settings: OptimizerSettings,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn RouteStore>,
        resolver: Arc<LocationResolver>,
        optimizer: Arc<dyn RouteOptimizer>,
        settings: OptimizerSettings,
    ) -> Self {
        Self { store, resolver, optimizer, settings }
    }

    pub async fn list_eligible_orders(&self, filter: &EligibleOrderFilter) -> Result<Vec<Order>> {
        self.store.eligible_orders(filter).await
    }

    pub async fn get_route(&self, route_id: Uuid) -> Result<RouteDetail> {
        self.store.get_route(route_id).await
    }

    pub async fn list_routes(&self, date: chrono::NaiveDate) -> Result<Vec<RouteAssignment>> {
        self.store.list_routes(date).await
    }

    fn options_for(&self, request: &PlanRouteRequest) -> OptimizeOptions {
        OptimizeOptions {
            vehicle_type: request.vehicle_type.unwrap_or_default(),
            consider_traffic: request.consider_traffic,
            departure_time: request.departure_time,
            max_stops_per_route: request.max_stops_per_route.unwrap_or(self.settings.max_stops_per_route),
            service_time_per_stop: request
                .service_time_per_stop
                .unwrap_or(self.settings.service_minutes_per_stop),
        }
    }

    /// Build an optimized plan for eligible orders without persisting it
    pub async fn plan_route(&self, request: &PlanRouteRequest) -> Result<RoutePlan> {
        let options = self.options_for(request);
        let filter = EligibleOrderFilter { order_ids: request.order_ids.clone() };
        let orders = self.store.eligible_orders(&filter).await?;

        let mut warnings: Vec<String> = request
            .order_ids
            .iter()
            .filter(|id| !orders.iter().any(|o| o.id == **id))
            .map(|id| format!("order {} is not ready for delivery and was skipped", id))
            .collect();

        let aggregation = StopAggregator::new(&self.resolver, self.settings.location_tolerance_meters)
            .aggregate(&orders)
            .await;
        warnings.extend(aggregation.warnings());
        let excluded_order_ids = aggregation.excluded_order_ids();

        if aggregation.stops.is_empty() {
            info!("No deliverable orders to plan ({} requested)", request.order_ids.len());
            let mut plan = OptimizedPlan::empty(self.optimizer.method());
            plan.warnings = warnings;
            return Ok(RoutePlan {
                options,
                candidates: vec![],
                plan,
                excluded_order_ids,
            });
        }

        let start_location = self
            .resolver
            .resolve(&request.start_address)
            .await
            .map_err(|e| DispatchError::StartUnresolved {
                address: request.start_address.clone(),
                reason: e.to_string(),
            })?;

        let optimize = OptimizeRequest {
            start_location,
            stops: aggregation.stops,
            options: options.clone(),
        };
        let mut plan = self.optimizer.optimize(&optimize).await?;
        plan.warnings.extend(warnings);

        info!(
            "Planned {} stops for {} orders: {:.1} km, {} min ({})",
            plan.optimized_stops.len(),
            orders.len() - excluded_order_ids.len(),
            plan.total_distance,
            plan.total_duration,
            plan.method.as_str()
        );

        Ok(RoutePlan {
            options,
            candidates: optimize.stops,
            plan,
            excluded_order_ids,
        })
    }

    async fn active_driver(&self, driver_id: Uuid) -> Result<Driver> {
        let driver = self
            .store
            .get_driver(driver_id)
            .await?
            .ok_or(DispatchError::DriverNotFound(driver_id))?;

        if !driver.is_active {
            return Err(DispatchError::DriverInactive(driver_id));
        }
        Ok(driver)
    }

    /// Persist an optimized plan as a route assigned to a driver
    pub async fn create_route(&self, request: &CreateRouteRequest) -> Result<CreatedRoute> {
        let driver = self.active_driver(request.driver_id).await?;

        if request.plan.optimized_stops.is_empty() {
            return Err(DispatchError::EmptyRoute);
        }
        request.plan.validate().map_err(DispatchError::InvalidPlan)?;

        let route = new_route(request, &driver);
        let detail = self.store.insert_route(&route).await.map_err(|e| {
            warn!("Route creation for driver {} failed: {}", driver.name, e);
            e
        })?;

        Ok(CreatedRoute {
            detail,
            warnings: request.plan.warnings.clone(),
        })
    }

    /// Plan and create in one call
    pub async fn dispatch_orders(&self, request: &DispatchRouteRequest) -> Result<CreatedRoute> {
        // Fail on the driver before spending a provider call
        self.active_driver(request.driver_id).await?;

        let planned = self.plan_route(&request.plan).await?;
        let departure = request.plan.departure_time;

        self.create_route(&CreateRouteRequest {
            driver_id: request.driver_id,
            route_date: departure.date(),
            departure_time: departure.time(),
            plan: planned.plan,
            notes: request.notes.clone(),
        })
        .await
    }
}

fn new_route(request: &CreateRouteRequest, driver: &Driver) -> NewRoute {
    let plan = &request.plan;

    NewRoute {
        id: Uuid::new_v4(),
        driver_id: driver.id,
        driver_name: driver.name.clone(),
        route_date: request.route_date,
        departure_time: request.departure_time,
        total_distance_km: plan.total_distance,
        total_duration_minutes: plan.total_duration,
        total_driving_minutes: plan.total_driving_time,
        estimated_fuel_cost: plan.estimated_fuel_cost,
        route_efficiency: plan.route_efficiency,
        optimization_method: plan.method.as_str().to_string(),
        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        stops: plan
            .optimized_stops
            .iter()
            .map(|s| NewRouteStop {
                id: Uuid::new_v4(),
                stop_order: s.stop_order,
                address: s.location.address.clone(),
                lat: s.location.coordinates.lat,
                lng: s.location.coordinates.lng,
                estimated_arrival: s.estimated_arrival,
                estimated_travel_time_minutes: s.estimated_travel_time,
                estimated_distance_km: s.estimated_distance,
                cumulative_time_minutes: s.cumulative_time,
                cumulative_distance_km: s.cumulative_distance,
                orders: s.orders.clone(),
            })
            .collect(),
    }
}
