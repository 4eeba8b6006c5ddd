//! In-memory route store for tests and local runs
//!
//! One mutex guards all state, so each call is a single critical section.
//! Writes are staged on copies and only swapped in once every step passed,
//! which gives the same all-or-nothing outcome as a transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DispatchError, PersistStep, Result};
use crate::types::{
    append_note, Driver, EligibleOrderFilter, NewRoute, Order, OrderStatus, RouteAssignment, RouteDetail,
    RouteOrderStatus, RouteStatus, RouteStop, StopStatus, StopUpdate, TripAction, TripTransition,
};

use super::store::{check_eligibility, check_out_for_delivery, progress_stop, route_order_links, RouteStore};

#[derive(Default)]
struct State {
    drivers: HashMap<Uuid, Driver>,
    /// Insertion order doubles as listing order
    orders: Vec<Order>,
    routes: HashMap<Uuid, RouteDetail>,
    /// Next write reaching this step fails
    fail_at: Option<PersistStep>,
}

impl State {
    fn trip(&mut self, step: PersistStep) -> Result<()> {
        if self.fail_at == Some(step) {
            self.fail_at = None;
            return Err(DispatchError::persistence(step, "injected failure"));
        }
        Ok(())
    }

    fn is_actively_routed(&self, order_id: Uuid) -> bool {
        self.routes.values().any(|r| {
            !r.route.status.is_terminal() && r.orders.iter().any(|o| o.order_id == order_id)
        })
    }

    /// Move orders in `ids` from `from` to `to` on a staged copy; returns
    /// the copy and the number of orders changed
    fn staged_status_change(&self, ids: &[Uuid], from: OrderStatus, to: OrderStatus) -> (Vec<Order>, u64) {
        let mut orders = self.orders.clone();
        let mut changed = 0;
        for order in orders.iter_mut().filter(|o| ids.contains(&o.id) && o.status == from) {
            order.status = to;
            changed += 1;
        }
        (orders, changed)
    }
}

#[derive(Default)]
pub struct MemoryRouteStore {
    state: Mutex<State>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_driver(&self, driver: Driver) {
        self.state.lock().drivers.insert(driver.id, driver);
    }

    /// Add or replace an order
    pub fn insert_order(&self, order: Order) {
        let mut state = self.state.lock();
        match state.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => state.orders.push(order),
        }
    }

    pub fn order_status(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.state.lock().orders.iter().find(|o| o.id == order_id).map(|o| o.status)
    }

    /// Change an order behind dispatch's back, as the order store would
    pub fn set_order_status(&self, order_id: Uuid, status: OrderStatus) {
        if let Some(order) = self.state.lock().orders.iter_mut().find(|o| o.id == order_id) {
            order.status = status;
        }
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }

    /// Make the next write that reaches `step` fail
    pub fn fail_next(&self, step: PersistStep) {
        self.state.lock().fail_at = Some(step);
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn eligible_orders(&self, filter: &EligibleOrderFilter) -> Result<Vec<Order>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|o| o.is_eligible())
            .filter(|o| filter.order_ids.is_empty() || filter.order_ids.contains(&o.id))
            .cloned()
            .collect())
    }

    async fn get_driver(&self, driver_id: Uuid) -> Result<Option<Driver>> {
        Ok(self.state.lock().drivers.get(&driver_id).cloned())
    }

    async fn insert_route(&self, route: &NewRoute) -> Result<RouteDetail> {
        let mut state = self.state.lock();
        let ids = route.order_ids();

        state.trip(PersistStep::LockOrders)?;
        let found: Vec<Order> = state.orders.iter().filter(|o| ids.contains(&o.id)).cloned().collect();
        let busy: Vec<Uuid> = ids.iter().copied().filter(|id| state.is_actively_routed(*id)).collect();
        check_eligibility(&ids, &found, &busy)?;

        let now = Utc::now();
        state.trip(PersistStep::InsertHeader)?;
        let header = RouteAssignment {
            id: route.id,
            driver_id: route.driver_id,
            driver_name: route.driver_name.clone(),
            route_date: route.route_date,
            departure_time: route.departure_time,
            status: RouteStatus::Assigned,
            total_distance_km: route.total_distance_km,
            total_duration_minutes: route.total_duration_minutes,
            total_driving_minutes: route.total_driving_minutes,
            estimated_fuel_cost: route.estimated_fuel_cost,
            route_efficiency: route.route_efficiency,
            optimization_method: route.optimization_method.clone(),
            notes: route.notes.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
        };

        state.trip(PersistStep::InsertStops)?;
        let stops: Vec<RouteStop> = route
            .stops
            .iter()
            .map(|s| RouteStop {
                id: s.id,
                route_id: route.id,
                stop_order: s.stop_order,
                address: s.address.clone(),
                lat: s.lat,
                lng: s.lng,
                estimated_arrival: s.estimated_arrival,
                actual_arrival: None,
                estimated_travel_time_minutes: s.estimated_travel_time_minutes,
                actual_travel_time_minutes: None,
                estimated_distance_km: s.estimated_distance_km,
                actual_distance_km: None,
                cumulative_time_minutes: s.cumulative_time_minutes,
                cumulative_distance_km: s.cumulative_distance_km,
                status: StopStatus::Pending,
            })
            .collect();

        state.trip(PersistStep::InsertRouteOrders)?;
        let links = route_order_links(route, &found)?;

        state.trip(PersistStep::UpdateOrderStatus)?;
        let (orders, flipped) =
            state.staged_status_change(&ids, OrderStatus::ReadyForDelivery, OrderStatus::OutForDelivery);
        if flipped != ids.len() as u64 {
            return Err(DispatchError::EligibilityConflict { order_ids: ids });
        }

        state.trip(PersistStep::Commit)?;
        let detail = RouteDetail { route: header, stops, orders: links };
        state.orders = orders;
        state.routes.insert(route.id, detail.clone());

        info!(
            "Created route {} for driver {} with {} stops and {} orders",
            route.id,
            route.driver_name,
            route.stops.len(),
            ids.len()
        );

        Ok(detail)
    }

    async fn get_route(&self, route_id: Uuid) -> Result<RouteDetail> {
        self.state
            .lock()
            .routes
            .get(&route_id)
            .cloned()
            .ok_or(DispatchError::RouteNotFound(route_id))
    }

    async fn list_routes(&self, date: NaiveDate) -> Result<Vec<RouteAssignment>> {
        let state = self.state.lock();
        let mut routes: Vec<RouteAssignment> = state
            .routes
            .values()
            .filter(|r| r.route.route_date == date)
            .map(|r| r.route.clone())
            .collect();
        routes.sort_by_key(|r| (r.departure_time, r.created_at));
        Ok(routes)
    }

    async fn apply_transition(&self, route_id: Uuid, transition: &TripTransition) -> Result<RouteDetail> {
        let mut state = self.state.lock();

        state.trip(PersistStep::LoadRoute)?;
        let mut detail = state
            .routes
            .get(&route_id)
            .cloned()
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        let next = detail.route.status.apply(route_id, transition.action())?;
        let order_ids = detail.order_ids();
        let now = Utc::now();
        let mut orders = None;

        match transition {
            TripTransition::Start => {
                for link in detail.orders.iter_mut().filter(|o| o.delivery_status == RouteOrderStatus::Assigned) {
                    link.delivery_status = RouteOrderStatus::OutForDelivery;
                }
            }
            TripTransition::Complete => {
                state.trip(PersistStep::LockOrders)?;
                let found: Vec<Order> =
                    state.orders.iter().filter(|o| order_ids.contains(&o.id)).cloned().collect();
                check_out_for_delivery(&order_ids, &found)?;

                detail.route.completed_at = Some(now);
                for link in detail.orders.iter_mut().filter(|o| {
                    matches!(o.delivery_status, RouteOrderStatus::Assigned | RouteOrderStatus::OutForDelivery)
                }) {
                    link.delivery_status = RouteOrderStatus::Delivered;
                    link.delivered_at = Some(now);
                }
                state.trip(PersistStep::UpdateOrderStatus)?;
                orders = Some(state.staged_status_change(&order_ids, OrderStatus::OutForDelivery, OrderStatus::Delivered).0);
            }
            TripTransition::Cancel { reason } => {
                detail.route.cancelled_at = Some(now);
                if let Some(reason) = reason {
                    detail.route.notes = Some(append_note(detail.route.notes.as_deref(), reason));
                }
                for link in detail.orders.iter_mut().filter(|o| {
                    matches!(o.delivery_status, RouteOrderStatus::Assigned | RouteOrderStatus::OutForDelivery)
                }) {
                    link.delivery_status = RouteOrderStatus::Returned;
                }
                state.trip(PersistStep::UpdateOrderStatus)?;
                let (staged, released) =
                    state.staged_status_change(&order_ids, OrderStatus::OutForDelivery, OrderStatus::ReadyForDelivery);
                if released != order_ids.len() as u64 {
                    warn!(
                        "Route {} cancelled; {} of {} orders had already left OUT_FOR_DELIVERY",
                        route_id,
                        order_ids.len() as u64 - released,
                        order_ids.len()
                    );
                }
                orders = Some(staged);
            }
            TripTransition::Reassign { driver_id, driver_name } => {
                detail.route.driver_id = *driver_id;
                detail.route.driver_name = driver_name.clone();
            }
        }

        state.trip(PersistStep::UpdateRoute)?;
        detail.route.status = next;
        detail.route.updated_at = now;

        state.trip(PersistStep::Commit)?;
        if let Some(orders) = orders {
            state.orders = orders;
        }
        state.routes.insert(route_id, detail.clone());

        debug!("Route {} is now {}", route_id, next);
        Ok(detail)
    }

    async fn update_stop(&self, route_id: Uuid, stop_id: Uuid, update: &StopUpdate) -> Result<RouteStop> {
        let mut state = self.state.lock();

        let detail = state
            .routes
            .get(&route_id)
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        let now = chrono::Local::now().naive_local();
        let stop = progress_stop(&detail.route, &detail.stops, stop_id, update, now)?;

        state.trip(PersistStep::UpdateStop)?;
        if let Some(detail) = state.routes.get_mut(&route_id) {
            detail.route.updated_at = Utc::now();
            if let Some(slot) = detail.stops.iter_mut().find(|s| s.id == stop_id) {
                *slot = stop.clone();
            }
        }

        Ok(stop)
    }

    async fn delete_route(&self, route_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();

        let status = state
            .routes
            .get(&route_id)
            .map(|r| r.route.status)
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        status.apply(route_id, TripAction::Delete)?;

        state.trip(PersistStep::DeleteRoute)?;
        state.routes.remove(&route_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
