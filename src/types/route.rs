//! Route assignment types (trip header, stops, order links)

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{OptimizeOptions, OptimizedPlan, OrderRef, StopCandidate, VehicleType};
use crate::error::DispatchError;

/// Route assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "route_status", rename_all = "snake_case")]
pub enum RouteStatus {
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteStatus::Assigned => "assigned",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
            RouteStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }

    /// Status after applying `action`, or a lifecycle violation.
    ///
    /// ```text
    /// assigned ──start──> in_progress
    /// assigned | in_progress ──complete──> completed
    /// assigned | in_progress ──cancel────> cancelled
    /// assigned | in_progress ──reassign──> (unchanged)
    /// completed | cancelled ──delete─────> (removed)
    /// ```
    pub fn apply(self, route_id: Uuid, action: TripAction) -> Result<RouteStatus, DispatchError> {
        use RouteStatus::*;

        let next = match (action, self) {
            (TripAction::Start, Assigned) => Some(InProgress),
            (TripAction::Complete, Assigned | InProgress) => Some(Completed),
            (TripAction::Cancel, Assigned | InProgress) => Some(Cancelled),
            (TripAction::Reassign, Assigned | InProgress) => Some(self),
            (TripAction::UpdateStop, InProgress) => Some(self),
            (TripAction::Delete, Completed | Cancelled) => Some(self),
            _ => None,
        };

        next.ok_or(DispatchError::LifecycleViolation {
            route_id,
            status: self,
            action,
        })
    }
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation requested on a persisted route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripAction {
    Start,
    Complete,
    Cancel,
    Reassign,
    UpdateStop,
    Delete,
}

impl TripAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            TripAction::Start => "start",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
            TripAction::Reassign => "reassign",
            TripAction::UpdateStop => "update_stop",
            TripAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for TripAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State change applied by the store inside one critical section
#[derive(Debug, Clone)]
pub enum TripTransition {
    Start,
    Complete,
    Cancel { reason: Option<String> },
    Reassign { driver_id: Uuid, driver_name: String },
}

impl TripTransition {
    pub fn action(&self) -> TripAction {
        match self {
            TripTransition::Start => TripAction::Start,
            TripTransition::Complete => TripAction::Complete,
            TripTransition::Cancel { .. } => TripAction::Cancel,
            TripTransition::Reassign { .. } => TripAction::Reassign,
        }
    }
}

/// Append a cancellation reason to existing notes
pub fn append_note(notes: Option<&str>, reason: &str) -> String {
    let line = format!("Cancelled: {}", reason.trim());
    match notes {
        Some(existing) if !existing.trim().is_empty() => format!("{}\n{}", existing, line),
        _ => line,
    }
}

/// Trip header
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteAssignment {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub route_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub status: RouteStatus,
    pub total_distance_km: f64,
    pub total_duration_minutes: i32,
    pub total_driving_minutes: i32,
    pub estimated_fuel_cost: f64,
    pub route_efficiency: f64,
    pub optimization_method: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Stop status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "stop_status", rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    Arrived,
    Completed,
    Skipped,
}

impl StopStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            StopStatus::Pending => "pending",
            StopStatus::Arrived => "arrived",
            StopStatus::Completed => "completed",
            StopStatus::Skipped => "skipped",
        }
    }

    /// pending → arrived → completed, pending | arrived → skipped
    pub const fn can_become(self, next: StopStatus) -> bool {
        matches!(
            (self, next),
            (StopStatus::Pending, StopStatus::Arrived)
                | (StopStatus::Arrived, StopStatus::Completed)
                | (StopStatus::Pending | StopStatus::Arrived, StopStatus::Skipped)
        )
    }
}

/// A persisted stop
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub stop_order: i32,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub estimated_arrival: NaiveDateTime,
    pub actual_arrival: Option<NaiveDateTime>,
    pub estimated_travel_time_minutes: i32,
    pub actual_travel_time_minutes: Option<i32>,
    pub estimated_distance_km: f64,
    pub actual_distance_km: Option<f64>,
    pub cumulative_time_minutes: i32,
    pub cumulative_distance_km: f64,
    pub status: StopStatus,
}

/// Delivery status of one order on a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "route_order_status", rename_all = "snake_case")]
pub enum RouteOrderStatus {
    Assigned,
    OutForDelivery,
    Delivered,
    Failed,
    Returned,
}

/// Link between an order and the stop that delivers it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteOrder {
    pub id: Uuid,
    pub route_id: Uuid,
    pub stop_id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub delivery_status: RouteOrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Route header with its stops and order links (read model)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetail {
    pub route: RouteAssignment,
    pub stops: Vec<RouteStop>,
    pub orders: Vec<RouteOrder>,
}

impl RouteDetail {
    pub fn order_ids(&self) -> Vec<Uuid> {
        self.orders.iter().map(|o| o.order_id).collect()
    }
}

/// Write model for a new route, built from an optimized plan
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub route_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub total_distance_km: f64,
    pub total_duration_minutes: i32,
    pub total_driving_minutes: i32,
    pub estimated_fuel_cost: f64,
    pub route_efficiency: f64,
    pub optimization_method: String,
    pub notes: Option<String>,
    pub stops: Vec<NewRouteStop>,
}

#[derive(Debug, Clone)]
pub struct NewRouteStop {
    pub id: Uuid,
    pub stop_order: i32,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub estimated_arrival: NaiveDateTime,
    pub estimated_travel_time_minutes: i32,
    pub estimated_distance_km: f64,
    pub cumulative_time_minutes: i32,
    pub cumulative_distance_km: f64,
    pub orders: Vec<OrderRef>,
}

impl NewRoute {
    pub fn order_ids(&self) -> Vec<Uuid> {
        self.stops
            .iter()
            .flat_map(|s| s.orders.iter().map(|o| o.order_id))
            .collect()
    }
}

/// Progress recorded on a stop while the trip runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopUpdate {
    pub status: StopStatus,
    #[serde(default)]
    pub actual_arrival: Option<NaiveDateTime>,
    #[serde(default)]
    pub actual_distance_km: Option<f64>,
}

// ============================================================================
// Requests
// ============================================================================

/// Request to plan a route over eligible orders (no persistence)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRouteRequest {
    pub start_address: String,
    /// Orders to include; all eligible orders when empty
    #[serde(default)]
    pub order_ids: Vec<Uuid>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub consider_traffic: bool,
    pub departure_time: NaiveDateTime,
    #[serde(default)]
    pub max_stops_per_route: Option<usize>,
    #[serde(default)]
    pub service_time_per_stop: Option<u32>,
}

/// Result of planning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub options: OptimizeOptions,
    pub candidates: Vec<StopCandidate>,
    pub plan: OptimizedPlan,
    /// Orders left out because their address could not be resolved
    pub excluded_order_ids: Vec<Uuid>,
}

/// Request to persist an optimized plan as a route assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouteRequest {
    pub driver_id: Uuid,
    pub route_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub plan: OptimizedPlan,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Plan and persist in one call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRouteRequest {
    pub driver_id: Uuid,
    #[serde(flatten)]
    pub plan: PlanRouteRequest,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Response after creating a route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoute {
    pub detail: RouteDetail,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteIdRequest {
    pub route_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRoutesRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTripRequest {
    pub route_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignTripRequest {
    pub route_id: Uuid,
    pub driver_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStopRequest {
    pub route_id: Uuid,
    pub stop_id: Uuid,
    #[serde(flatten)]
    pub update: StopUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::nil()
    }

    #[test]
    fn test_start_only_from_assigned() {
        assert_eq!(
            RouteStatus::Assigned.apply(id(), TripAction::Start).unwrap(),
            RouteStatus::InProgress
        );
        assert!(RouteStatus::InProgress.apply(id(), TripAction::Start).is_err());
        assert!(RouteStatus::Completed.apply(id(), TripAction::Start).is_err());
    }

    #[test]
    fn test_complete_and_cancel_from_active_states() {
        for from in [RouteStatus::Assigned, RouteStatus::InProgress] {
            assert_eq!(from.apply(id(), TripAction::Complete).unwrap(), RouteStatus::Completed);
            assert_eq!(from.apply(id(), TripAction::Cancel).unwrap(), RouteStatus::Cancelled);
        }
    }

    #[test]
    fn test_terminal_states_reject_everything_but_delete() {
        for from in [RouteStatus::Completed, RouteStatus::Cancelled] {
            for action in [
                TripAction::Start,
                TripAction::Complete,
                TripAction::Cancel,
                TripAction::Reassign,
                TripAction::UpdateStop,
            ] {
                let err = from.apply(id(), action).unwrap_err();
                assert!(matches!(err, DispatchError::LifecycleViolation { .. }));
            }
            assert_eq!(from.apply(id(), TripAction::Delete).unwrap(), from);
        }
    }

    #[test]
    fn test_delete_rejected_while_active() {
        assert!(RouteStatus::Assigned.apply(id(), TripAction::Delete).is_err());
        assert!(RouteStatus::InProgress.apply(id(), TripAction::Delete).is_err());
    }

    #[test]
    fn test_stop_updates_only_in_progress() {
        assert!(RouteStatus::Assigned.apply(id(), TripAction::UpdateStop).is_err());
        assert!(RouteStatus::InProgress.apply(id(), TripAction::UpdateStop).is_ok());
    }

    #[test]
    fn test_stop_status_graph() {
        assert!(StopStatus::Pending.can_become(StopStatus::Arrived));
        assert!(StopStatus::Arrived.can_become(StopStatus::Completed));
        assert!(StopStatus::Pending.can_become(StopStatus::Skipped));
        assert!(!StopStatus::Pending.can_become(StopStatus::Completed));
        assert!(!StopStatus::Completed.can_become(StopStatus::Skipped));
        assert!(!StopStatus::Skipped.can_become(StopStatus::Arrived));
    }

    #[test]
    fn test_append_note() {
        assert_eq!(append_note(None, "truck broke down"), "Cancelled: truck broke down");
        assert_eq!(
            append_note(Some("Fragile items"), " weather "),
            "Fragile items\nCancelled: weather"
        );
    }

    #[test]
    fn test_route_status_serializes_snake_case() {
        let json = serde_json::to_string(&RouteStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_dispatch_request_flattens_plan_fields() {
        let json = r#"{
            "driverId": "123e4567-e89b-12d3-a456-426614174000",
            "startAddress": "Depot, 1 Main St",
            "departureTime": "2026-03-02T08:30:00",
            "considerTraffic": true
        }"#;
        let req: DispatchRouteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.plan.start_address, "Depot, 1 Main St");
        assert!(req.plan.consider_traffic);
        assert!(req.plan.order_ids.is_empty());
    }
}
