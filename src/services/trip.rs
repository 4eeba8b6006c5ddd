//! Trip lifecycle
//!
//! ```text
//! assigned ──start──> in_progress ──complete──> completed
//!    │                    │
//!    └──────cancel────────┴──────────────────> cancelled
//! ```
//! Reassignment is allowed while the trip is active; deletion only once it
//! is completed or cancelled. Invalid requests fail with a lifecycle
//! violation and change nothing.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::db::RouteStore;
use crate::error::{DispatchError, Result};
use crate::types::{RouteDetail, RouteStop, StopUpdate, TripTransition};

pub struct TripManager {
    store: Arc<dyn RouteStore>,
}

impl TripManager {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    pub async fn start_trip(&self, route_id: Uuid) -> Result<RouteDetail> {
        let detail = self.store.apply_transition(route_id, &TripTransition::Start).await?;
        info!("Trip {} started by {}", route_id, detail.route.driver_name);
        Ok(detail)
    }

    /// Mark every order on the route delivered
    pub async fn complete_trip(&self, route_id: Uuid) -> Result<RouteDetail> {
        let detail = self.store.apply_transition(route_id, &TripTransition::Complete).await?;
        info!("Trip {} completed, {} orders delivered", route_id, detail.orders.len());
        Ok(detail)
    }

    /// Cancel and release the route's orders for a future route
    pub async fn cancel_trip(&self, route_id: Uuid, reason: Option<String>) -> Result<RouteDetail> {
        let reason = reason.filter(|r| !r.trim().is_empty());
        let detail = self
            .store
            .apply_transition(route_id, &TripTransition::Cancel { reason: reason.clone() })
            .await?;
        info!(
            "Trip {} cancelled ({}), {} orders released",
            route_id,
            reason.as_deref().unwrap_or("no reason given"),
            detail.orders.len()
        );
        Ok(detail)
    }

    pub async fn reassign_driver(&self, route_id: Uuid, driver_id: Uuid) -> Result<RouteDetail> {
        let driver = self
            .store
            .get_driver(driver_id)
            .await?
            .ok_or(DispatchError::DriverNotFound(driver_id))?;
        if !driver.is_active {
            return Err(DispatchError::DriverInactive(driver_id));
        }

        let transition = TripTransition::Reassign {
            driver_id: driver.id,
            driver_name: driver.name.clone(),
        };
        let detail = self.store.apply_transition(route_id, &transition).await?;
        info!("Trip {} reassigned to {}", route_id, driver.name);
        Ok(detail)
    }

    /// Irreversibly remove a completed or cancelled route
    pub async fn delete_route(&self, route_id: Uuid) -> Result<()> {
        self.store.delete_route(route_id).await?;
        info!("Route {} deleted", route_id);
        Ok(())
    }

    pub async fn update_stop(&self, route_id: Uuid, stop_id: Uuid, update: &StopUpdate) -> Result<RouteStop> {
        let stop = self.store.update_stop(route_id, stop_id, update).await?;
        info!("Route {} stop {} is {}", route_id, stop.stop_order, stop.status.as_str());
        Ok(stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistStep;
    use crate::services::testing::*;
    use crate::types::{
        CreateRouteRequest, OrderStatus, RouteOrderStatus, RouteStatus, StopStatus, TripAction,
    };

    /// Route with 2 stops and 3 orders; returns route id and order ids
    async fn seeded_route(h: &Harness, driver_name: &str, tag: &str) -> (Uuid, Vec<Uuid>) {
        let driver = h.add_driver(driver_name);
        let ids = vec![
            h.add_order(&format!("{}-1", tag), &format!("12 {} St", tag)).id,
            h.add_order(&format!("{}-2", tag), &format!("40 {} Rd", tag)).id,
            h.add_order(&format!("{}-3", tag), &format!("12 {} St", tag)).id,
        ];

        let planned = h.dispatch.plan_route(&plan_request(ids.clone())).await.unwrap();
        let created = h
            .dispatch
            .create_route(&CreateRouteRequest {
                driver_id: driver.id,
                route_date: route_date(),
                departure_time: departure().time(),
                plan: planned.plan,
                notes: Some("fragile".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(created.detail.stops.len(), 2);
        (created.detail.route.id, ids)
    }

    fn arrived() -> StopUpdate {
        StopUpdate { status: StopStatus::Arrived, actual_arrival: None, actual_distance_km: None }
    }

    #[tokio::test]
    async fn test_cancel_reverts_orders_and_allows_reassignment() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;

        let detail = h.trips.cancel_trip(route_id, Some("van broke down".to_string())).await.unwrap();

        assert_eq!(detail.route.status, RouteStatus::Cancelled);
        assert!(detail.route.cancelled_at.is_some());
        assert!(detail.route.completed_at.is_none());
        assert_eq!(detail.route.notes.as_deref(), Some("fragile\nCancelled: van broke down"));
        assert!(detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Returned));
        for id in &ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::ReadyForDelivery));
        }

        // Same orders can go on a new route
        let eli = h.add_driver("Eli");
        let created = h
            .dispatch
            .dispatch_orders(&crate::types::DispatchRouteRequest {
                driver_id: eli.id,
                plan: plan_request(ids.clone()),
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(created.detail.orders.len(), 3);
        assert!(created.detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Assigned));
        assert_eq!(h.store.route_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_after_start_returns_links() {
        let h = Harness::new();
        let (route_id, _) = seeded_route(&h, "Dana", "Oak").await;
        h.trips.start_trip(route_id).await.unwrap();

        let detail = h.trips.cancel_trip(route_id, None).await.unwrap();

        assert!(detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Returned));
        assert!(detail.orders.iter().all(|o| o.delivered_at.is_none()));
    }

    #[tokio::test]
    async fn test_complete_refuses_orders_changed_elsewhere() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;
        h.store.set_order_status(ids[1], OrderStatus::Cancelled);

        let err = h.trips.complete_trip(route_id).await.unwrap_err();

        match err {
            DispatchError::OrderStateConflict { order_ids } => assert_eq!(order_ids, vec![ids[1]]),
            other => panic!("unexpected error: {:?}", other),
        }
        let detail = h.dispatch.get_route(route_id).await.unwrap();
        assert_eq!(detail.route.status, RouteStatus::Assigned);
        assert!(detail.route.completed_at.is_none());
        assert!(detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Assigned));
        assert_eq!(h.store.order_status(ids[0]), Some(OrderStatus::OutForDelivery));
        assert_eq!(h.store.order_status(ids[1]), Some(OrderStatus::Cancelled));

        // Cancelling still works and leaves the changed order alone
        h.trips.cancel_trip(route_id, None).await.unwrap();
        assert_eq!(h.store.order_status(ids[0]), Some(OrderStatus::ReadyForDelivery));
        assert_eq!(h.store.order_status(ids[1]), Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_complete_twice_is_a_violation() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;

        let first = h.trips.complete_trip(route_id).await.unwrap();
        let completed_at = first.route.completed_at;
        assert!(completed_at.is_some());
        assert_eq!(first.route.status, RouteStatus::Completed);
        assert!(first.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Delivered));
        assert!(first.orders.iter().all(|o| o.delivered_at.is_some()));
        for id in &ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::Delivered));
        }

        let err = h.trips.complete_trip(route_id).await.unwrap_err();

        match err {
            DispatchError::LifecycleViolation { status, action, .. } => {
                assert_eq!(status, RouteStatus::Completed);
                assert_eq!(action, TripAction::Complete);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let after = h.dispatch.get_route(route_id).await.unwrap();
        assert_eq!(after.route.completed_at, completed_at);
    }

    #[tokio::test]
    async fn test_complete_touches_only_its_own_orders() {
        let h = Harness::new();
        let (done_route, done_ids) = seeded_route(&h, "Dana", "Oak").await;
        let (other_route, other_ids) = seeded_route(&h, "Eli", "Ash").await;

        h.trips.complete_trip(done_route).await.unwrap();

        for id in &done_ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::Delivered));
        }
        for id in &other_ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::OutForDelivery));
        }
        let other = h.dispatch.get_route(other_route).await.unwrap();
        assert_eq!(other.route.status, RouteStatus::Assigned);
        assert!(other.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Assigned));
    }

    #[tokio::test]
    async fn test_cancel_touches_only_its_own_orders() {
        let h = Harness::new();
        let (cancelled, _) = seeded_route(&h, "Dana", "Oak").await;
        let (_, other_ids) = seeded_route(&h, "Eli", "Ash").await;

        h.trips.cancel_trip(cancelled, None).await.unwrap();

        for id in &other_ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::OutForDelivery));
        }
    }

    #[tokio::test]
    async fn test_start_moves_links_but_not_orders() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;

        let detail = h.trips.start_trip(route_id).await.unwrap();

        assert_eq!(detail.route.status, RouteStatus::InProgress);
        assert!(detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::OutForDelivery));
        for id in &ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::OutForDelivery));
        }

        let again = h.trips.start_trip(route_id).await.unwrap_err();
        assert_eq!(again.code(), "LIFECYCLE_VIOLATION");
    }

    #[tokio::test]
    async fn test_cancelled_route_cannot_be_completed() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;
        h.trips.cancel_trip(route_id, None).await.unwrap();

        let err = h.trips.complete_trip(route_id).await.unwrap_err();

        assert_eq!(err.code(), "LIFECYCLE_VIOLATION");
        let detail = h.dispatch.get_route(route_id).await.unwrap();
        assert_eq!(detail.route.status, RouteStatus::Cancelled);
        assert!(detail.route.completed_at.is_none());
        assert_eq!(h.store.order_status(ids[0]), Some(OrderStatus::ReadyForDelivery));
    }

    #[tokio::test]
    async fn test_reassign_swaps_driver_only_while_active() {
        let h = Harness::new();
        let (route_id, _) = seeded_route(&h, "Dana", "Oak").await;
        let eli = h.add_driver("Eli");
        let before = h.dispatch.get_route(route_id).await.unwrap();

        let detail = h.trips.reassign_driver(route_id, eli.id).await.unwrap();

        assert_eq!(detail.route.driver_id, eli.id);
        assert_eq!(detail.route.driver_name, "Eli");
        assert_eq!(detail.route.status, RouteStatus::Assigned);
        assert_eq!(detail.stops.len(), before.stops.len());
        assert_eq!(detail.orders.len(), before.orders.len());

        h.trips.complete_trip(route_id).await.unwrap();
        let fin = h.add_driver("Fin");
        let err = h.trips.reassign_driver(route_id, fin.id).await.unwrap_err();
        assert_eq!(err.code(), "LIFECYCLE_VIOLATION");
    }

    #[tokio::test]
    async fn test_reassign_requires_active_driver() {
        let h = Harness::new();
        let (route_id, _) = seeded_route(&h, "Dana", "Oak").await;
        let mut parked = driver("Parked");
        parked.is_active = false;
        h.store.insert_driver(parked.clone());

        let err = h.trips.reassign_driver(route_id, parked.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::DriverInactive(_)));

        let err = h.trips.reassign_driver(route_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DispatchError::DriverNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_only_from_terminal_state() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;

        let err = h.trips.delete_route(route_id).await.unwrap_err();
        assert_eq!(err.code(), "LIFECYCLE_VIOLATION");
        assert_eq!(h.store.route_count(), 1);

        h.trips.cancel_trip(route_id, None).await.unwrap();
        h.trips.delete_route(route_id).await.unwrap();

        assert_eq!(h.store.route_count(), 0);
        let gone = h.dispatch.get_route(route_id).await.unwrap_err();
        assert!(matches!(gone, DispatchError::RouteNotFound(_)));
        assert_eq!(h.store.order_status(ids[0]), Some(OrderStatus::ReadyForDelivery));
    }

    #[tokio::test]
    async fn test_failed_completion_changes_nothing() {
        let h = Harness::new();
        let (route_id, ids) = seeded_route(&h, "Dana", "Oak").await;
        h.store.fail_next(PersistStep::Commit);

        let err = h.trips.complete_trip(route_id).await.unwrap_err();

        assert!(matches!(err, DispatchError::Persistence { step: PersistStep::Commit, .. }));
        let detail = h.dispatch.get_route(route_id).await.unwrap();
        assert_eq!(detail.route.status, RouteStatus::Assigned);
        assert!(detail.route.completed_at.is_none());
        assert!(detail.orders.iter().all(|o| o.delivery_status == RouteOrderStatus::Assigned));
        for id in &ids {
            assert_eq!(h.store.order_status(*id), Some(OrderStatus::OutForDelivery));
        }
    }

    #[tokio::test]
    async fn test_stop_progress_during_trip() {
        let h = Harness::new();
        let (route_id, _) = seeded_route(&h, "Dana", "Oak").await;
        let detail = h.dispatch.get_route(route_id).await.unwrap();
        let first = detail.stops[0].id;
        let second = detail.stops[1].id;

        let early = h.trips.update_stop(route_id, first, &arrived()).await.unwrap_err();
        assert_eq!(early.code(), "LIFECYCLE_VIOLATION");

        h.trips.start_trip(route_id).await.unwrap();
        let at_first = h.trips.update_stop(route_id, first, &arrived()).await.unwrap();
        assert_eq!(at_first.status, StopStatus::Arrived);
        assert!(at_first.actual_arrival.is_some());
        assert!(at_first.actual_travel_time_minutes.is_some());

        let done = StopUpdate { status: StopStatus::Completed, actual_arrival: None, actual_distance_km: None };
        h.trips.update_stop(route_id, first, &done).await.unwrap();
        let skip = StopUpdate { status: StopStatus::Skipped, actual_arrival: None, actual_distance_km: None };
        h.trips.update_stop(route_id, second, &skip).await.unwrap();

        let err = h.trips.update_stop(route_id, second, &arrived()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STOP_TRANSITION");

        let stops = h.dispatch.get_route(route_id).await.unwrap().stops;
        assert_eq!(stops[0].status, StopStatus::Completed);
        assert_eq!(stops[1].status, StopStatus::Skipped);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let h = Harness::new();
        let err = h.trips.start_trip(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "ROUTE_NOT_FOUND");
    }
}
