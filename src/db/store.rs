//! Route persistence
//!
//! [`RouteStore`] is the seam between dispatch logic and storage. Every
//! method is one critical section: it either applies all of its effects or
//! none of them.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DispatchError, PersistStep, Result};
use crate::types::{
    append_note, Driver, EligibleOrderFilter, NewRoute, Order, OrderStatus, RouteAssignment, RouteDetail,
    RouteOrder, RouteOrderStatus, RouteStop, StopStatus, StopUpdate, TripAction, TripTransition,
};

use super::queries;

#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Orders ready for delivery that need a driver
    async fn eligible_orders(&self, filter: &EligibleOrderFilter) -> Result<Vec<Order>>;

    async fn get_driver(&self, driver_id: Uuid) -> Result<Option<Driver>>;

    /// Persist header, stops and order links and move every order to
    /// OUT_FOR_DELIVERY. Fails with `EligibilityConflict` when any order is
    /// no longer eligible or already on an active route.
    async fn insert_route(&self, route: &NewRoute) -> Result<RouteDetail>;

    async fn get_route(&self, route_id: Uuid) -> Result<RouteDetail>;

    async fn list_routes(&self, date: NaiveDate) -> Result<Vec<RouteAssignment>>;

    /// Check the lifecycle graph and apply the transition with its effects
    /// on order links and orders. Completion fails with
    /// `OrderStateConflict` when a linked order is no longer out for
    /// delivery; cancellation returns the open links and releases the
    /// orders still out for delivery.
    async fn apply_transition(&self, route_id: Uuid, transition: &TripTransition) -> Result<RouteDetail>;

    async fn update_stop(&self, route_id: Uuid, stop_id: Uuid, update: &StopUpdate) -> Result<RouteStop>;

    /// Remove a terminal route with its stops and order links
    async fn delete_route(&self, route_id: Uuid) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Reject the batch unless every requested order was found, is eligible and
/// is not on an active route
pub(crate) fn check_eligibility(requested: &[Uuid], found: &[Order], actively_routed: &[Uuid]) -> Result<()> {
    let eligible: HashSet<Uuid> = found.iter().filter(|o| o.is_eligible()).map(|o| o.id).collect();
    let busy: HashSet<&Uuid> = actively_routed.iter().collect();

    let mut seen = HashSet::new();
    let conflicts: Vec<Uuid> = requested
        .iter()
        .filter(|id| seen.insert(**id))
        .filter(|id| !eligible.contains(id) || busy.contains(id))
        .copied()
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::EligibilityConflict { order_ids: conflicts })
    }
}

/// Reject completion unless every linked order is still out for delivery.
/// An order moved or removed by the order store would otherwise end up
/// with a `delivered` link and a different status of its own.
pub(crate) fn check_out_for_delivery(order_ids: &[Uuid], found: &[Order]) -> Result<()> {
    let out: HashSet<Uuid> = found
        .iter()
        .filter(|o| o.status == OrderStatus::OutForDelivery)
        .map(|o| o.id)
        .collect();
    let drifted: Vec<Uuid> = order_ids.iter().filter(|id| !out.contains(id)).copied().collect();

    if drifted.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::OrderStateConflict { order_ids: drifted })
    }
}

/// Order links for a new route. The plan decides which stop serves which
/// order; number and customer fields are snapshotted from `found`, the rows
/// read inside the write.
pub(crate) fn route_order_links(route: &NewRoute, found: &[Order]) -> Result<Vec<RouteOrder>> {
    let by_id: HashMap<Uuid, &Order> = found.iter().map(|o| (o.id, o)).collect();

    let mut links = Vec::new();
    for stop in &route.stops {
        for planned in &stop.orders {
            let order = by_id
                .get(&planned.order_id)
                .ok_or_else(|| DispatchError::EligibilityConflict { order_ids: vec![planned.order_id] })?;
            links.push(RouteOrder {
                id: Uuid::new_v4(),
                route_id: route.id,
                stop_id: stop.id,
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_name: order.customer_name.clone(),
                customer_phone: order.customer_phone.clone(),
                delivery_status: RouteOrderStatus::Assigned,
                delivered_at: None,
            });
        }
    }
    Ok(links)
}

/// Stop after applying `update`, checking the route state and the stop
/// transition graph. Recording `arrived` stamps the actual arrival (`now`
/// unless given) and the actual travel time since the previous recorded
/// arrival, or since departure for the first stop.
pub(crate) fn progress_stop(
    route: &RouteAssignment,
    stops: &[RouteStop],
    stop_id: Uuid,
    update: &StopUpdate,
    now: NaiveDateTime,
) -> Result<RouteStop> {
    route.status.apply(route.id, TripAction::UpdateStop)?;

    let idx = stops
        .iter()
        .position(|s| s.id == stop_id)
        .ok_or(DispatchError::StopNotFound { route_id: route.id, stop_id })?;

    let mut stop = stops[idx].clone();
    if !stop.status.can_become(update.status) {
        return Err(DispatchError::InvalidStopTransition(format!(
            "stop {} cannot go from {} to {}",
            stop.stop_order,
            stop.status.as_str(),
            update.status.as_str()
        )));
    }

    if update.status == StopStatus::Arrived {
        let arrival = update.actual_arrival.unwrap_or(now);
        let previous = stops[..idx]
            .iter()
            .rev()
            .find_map(|s| s.actual_arrival)
            .unwrap_or_else(|| route.route_date.and_time(route.departure_time));

        stop.actual_arrival = Some(arrival);
        stop.actual_travel_time_minutes = Some((arrival - previous).num_minutes().max(0) as i32);
    }
    if let Some(km) = update.actual_distance_km {
        stop.actual_distance_km = Some(km);
    }
    stop.status = update.status;

    Ok(stop)
}

fn at(step: PersistStep) -> impl FnOnce(anyhow::Error) -> DispatchError {
    move |e| DispatchError::persistence(step, format!("{:#}", e))
}

fn begin_failed(step: PersistStep) -> impl FnOnce(sqlx::Error) -> DispatchError {
    move |e| DispatchError::persistence(step, e)
}

/// PostgreSQL store, one transaction per call
pub struct PgRouteStore {
    pool: PgPool,
}

impl PgRouteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteStore for PgRouteStore {
    async fn eligible_orders(&self, filter: &EligibleOrderFilter) -> Result<Vec<Order>> {
        queries::order::list_eligible(&self.pool, filter)
            .await
            .map_err(at(PersistStep::LoadOrders))
    }

    async fn get_driver(&self, driver_id: Uuid) -> Result<Option<Driver>> {
        queries::driver::get_driver(&self.pool, driver_id)
            .await
            .map_err(at(PersistStep::LoadDriver))
    }

    async fn insert_route(&self, route: &NewRoute) -> Result<RouteDetail> {
        let ids = route.order_ids();
        let mut tx = self.pool.begin().await.map_err(begin_failed(PersistStep::LockOrders))?;

        let locked = queries::order::lock_orders(&mut *tx, &ids)
            .await
            .map_err(at(PersistStep::LockOrders))?;
        let busy = queries::order::actively_routed(&mut *tx, &ids)
            .await
            .map_err(at(PersistStep::LockOrders))?;
        check_eligibility(&ids, &locked, &busy)?;
        let links = route_order_links(route, &locked)?;

        queries::route::insert_header(&mut *tx, route)
            .await
            .map_err(at(PersistStep::InsertHeader))?;

        for stop in &route.stops {
            queries::route::insert_stop(&mut *tx, route.id, stop)
                .await
                .map_err(at(PersistStep::InsertStops))?;
        }

        for link in &links {
            queries::route::insert_route_order(&mut *tx, link)
                .await
                .map_err(at(PersistStep::InsertRouteOrders))?;
        }

        let flipped = queries::order::transition_status(
            &mut *tx,
            &ids,
            OrderStatus::ReadyForDelivery,
            OrderStatus::OutForDelivery,
        )
        .await
        .map_err(at(PersistStep::UpdateOrderStatus))?;

        if flipped != ids.len() as u64 {
            // Dropping tx rolls back everything above
            return Err(DispatchError::EligibilityConflict { order_ids: ids });
        }

        tx.commit().await.map_err(begin_failed(PersistStep::Commit))?;

        info!(
            "Created route {} for driver {} with {} stops and {} orders",
            route.id,
            route.driver_name,
            route.stops.len(),
            ids.len()
        );

        self.get_route(route.id).await
    }

    async fn get_route(&self, route_id: Uuid) -> Result<RouteDetail> {
        let route = queries::route::get_route(&self.pool, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        let stops = queries::route::get_route_stops(&self.pool, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?;
        let orders = queries::route::get_route_orders(&self.pool, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?;

        Ok(RouteDetail { route, stops, orders })
    }

    async fn list_routes(&self, date: NaiveDate) -> Result<Vec<RouteAssignment>> {
        queries::route::list_routes_for_date(&self.pool, date)
            .await
            .map_err(at(PersistStep::LoadRoute))
    }

    async fn apply_transition(&self, route_id: Uuid, transition: &TripTransition) -> Result<RouteDetail> {
        let mut tx = self.pool.begin().await.map_err(begin_failed(PersistStep::LoadRoute))?;

        let route = queries::route::lock_route(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        let next = route.status.apply(route_id, transition.action())?;

        let order_ids: Vec<Uuid> = queries::route::get_route_orders(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?
            .into_iter()
            .map(|o| o.order_id)
            .collect();

        match transition {
            TripTransition::Start => {
                queries::route::set_route_status(&mut *tx, route_id, next, None)
                    .await
                    .map_err(at(PersistStep::UpdateRoute))?;
                queries::route::transition_route_orders(
                    &mut *tx,
                    route_id,
                    &[RouteOrderStatus::Assigned],
                    RouteOrderStatus::OutForDelivery,
                )
                .await
                .map_err(at(PersistStep::UpdateRoute))?;
            }
            TripTransition::Complete => {
                let locked = queries::order::lock_orders(&mut *tx, &order_ids)
                    .await
                    .map_err(at(PersistStep::LockOrders))?;
                check_out_for_delivery(&order_ids, &locked)?;

                queries::route::set_route_status(&mut *tx, route_id, next, None)
                    .await
                    .map_err(at(PersistStep::UpdateRoute))?;
                queries::route::transition_route_orders(
                    &mut *tx,
                    route_id,
                    &[RouteOrderStatus::Assigned, RouteOrderStatus::OutForDelivery],
                    RouteOrderStatus::Delivered,
                )
                .await
                .map_err(at(PersistStep::UpdateRoute))?;
                let delivered = queries::order::transition_status(
                    &mut *tx,
                    &order_ids,
                    OrderStatus::OutForDelivery,
                    OrderStatus::Delivered,
                )
                .await
                .map_err(at(PersistStep::UpdateOrderStatus))?;

                if delivered != order_ids.len() as u64 {
                    return Err(DispatchError::OrderStateConflict { order_ids });
                }
            }
            TripTransition::Cancel { reason } => {
                let notes = reason.as_deref().map(|r| append_note(route.notes.as_deref(), r));
                queries::route::set_route_status(&mut *tx, route_id, next, notes.as_deref())
                    .await
                    .map_err(at(PersistStep::UpdateRoute))?;
                queries::route::transition_route_orders(
                    &mut *tx,
                    route_id,
                    &[RouteOrderStatus::Assigned, RouteOrderStatus::OutForDelivery],
                    RouteOrderStatus::Returned,
                )
                .await
                .map_err(at(PersistStep::UpdateRoute))?;
                let released = queries::order::transition_status(
                    &mut *tx,
                    &order_ids,
                    OrderStatus::OutForDelivery,
                    OrderStatus::ReadyForDelivery,
                )
                .await
                .map_err(at(PersistStep::UpdateOrderStatus))?;

                if released != order_ids.len() as u64 {
                    warn!(
                        "Route {} cancelled; {} of {} orders had already left OUT_FOR_DELIVERY",
                        route_id,
                        order_ids.len() as u64 - released,
                        order_ids.len()
                    );
                }
            }
            TripTransition::Reassign { driver_id, driver_name } => {
                queries::route::set_route_driver(&mut *tx, route_id, *driver_id, driver_name)
                    .await
                    .map_err(at(PersistStep::UpdateRoute))?;
            }
        }

        tx.commit().await.map_err(begin_failed(PersistStep::Commit))?;

        self.get_route(route_id).await
    }

    async fn update_stop(&self, route_id: Uuid, stop_id: Uuid, update: &StopUpdate) -> Result<RouteStop> {
        let mut tx = self.pool.begin().await.map_err(begin_failed(PersistStep::LoadRoute))?;

        let route = queries::route::lock_route(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        let stops = queries::route::get_route_stops(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?;

        let now = chrono::Local::now().naive_local();
        let stop = progress_stop(&route, &stops, stop_id, update, now)?;

        queries::route::update_stop(
            &mut *tx,
            stop.id,
            stop.status,
            stop.actual_arrival,
            stop.actual_travel_time_minutes,
            stop.actual_distance_km,
        )
        .await
        .map_err(at(PersistStep::UpdateStop))?;
        queries::route::touch_route(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::UpdateRoute))?;

        tx.commit().await.map_err(begin_failed(PersistStep::Commit))?;

        Ok(stop)
    }

    async fn delete_route(&self, route_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(begin_failed(PersistStep::LoadRoute))?;

        let route = queries::route::lock_route(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::LoadRoute))?
            .ok_or(DispatchError::RouteNotFound(route_id))?;
        route.status.apply(route_id, TripAction::Delete)?;

        queries::route::delete_route(&mut *tx, route_id)
            .await
            .map_err(at(PersistStep::DeleteRoute))?;

        tx.commit().await.map_err(begin_failed(PersistStep::Commit))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
