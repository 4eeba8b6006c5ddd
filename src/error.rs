//! Dispatch domain errors

use thiserror::Error;
use uuid::Uuid;

use crate::types::{RouteStatus, TripAction};

/// Write step that failed while persisting or mutating a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStep {
    LoadOrders,
    LockOrders,
    InsertHeader,
    InsertStops,
    InsertRouteOrders,
    UpdateOrderStatus,
    Commit,
    LoadRoute,
    UpdateRoute,
    UpdateStop,
    DeleteRoute,
    LoadDriver,
}

impl PersistStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            PersistStep::LoadOrders => "load_orders",
            PersistStep::LockOrders => "lock_orders",
            PersistStep::InsertHeader => "insert_header",
            PersistStep::InsertStops => "insert_stops",
            PersistStep::InsertRouteOrders => "insert_route_orders",
            PersistStep::UpdateOrderStatus => "update_order_status",
            PersistStep::Commit => "commit",
            PersistStep::LoadRoute => "load_route",
            PersistStep::UpdateRoute => "update_route",
            PersistStep::UpdateStop => "update_stop",
            PersistStep::DeleteRoute => "delete_route",
            PersistStep::LoadDriver => "load_driver",
        }
    }
}

impl std::fmt::Display for PersistStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order address the geocoder could not resolve.
///
/// Never fails an operation: the order is left out of the route and the
/// error is reported as a plan warning.
#[derive(Debug, Clone, Error)]
#[error("order {order_number}: address '{address}' could not be resolved ({reason})")]
pub struct AddressResolutionError {
    pub order_id: Uuid,
    pub order_number: String,
    pub address: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("optimization provider failed: {0}")]
    OptimizationProvider(String),

    #[error("{count} stops exceed the maximum of {max} per route")]
    TooManyStops { count: usize, max: usize },

    #[error("route has no stops")]
    EmptyRoute,

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("start location '{address}' could not be resolved: {reason}")]
    StartUnresolved { address: String, reason: String },

    #[error("{} order(s) are no longer eligible for dispatch", order_ids.len())]
    EligibilityConflict { order_ids: Vec<Uuid> },

    #[error("{} order(s) left out-for-delivery outside dispatch", order_ids.len())]
    OrderStateConflict { order_ids: Vec<Uuid> },

    #[error("persistence failed at {step}: {message}")]
    Persistence { step: PersistStep, message: String },

    #[error("cannot {action} route {route_id} in status {status}")]
    LifecycleViolation {
        route_id: Uuid,
        status: RouteStatus,
        action: TripAction,
    },

    #[error("route not found: {0}")]
    RouteNotFound(Uuid),

    #[error("stop {stop_id} not found on route {route_id}")]
    StopNotFound { route_id: Uuid, stop_id: Uuid },

    #[error("invalid stop transition: {0}")]
    InvalidStopTransition(String),

    #[error("driver not found: {0}")]
    DriverNotFound(Uuid),

    #[error("driver {0} is inactive")]
    DriverInactive(Uuid),
}

impl DispatchError {
    pub fn persistence(step: PersistStep, err: impl std::fmt::Display) -> Self {
        DispatchError::Persistence {
            step,
            message: err.to_string(),
        }
    }

    /// Stable code for error envelopes
    pub const fn code(&self) -> &'static str {
        match self {
            DispatchError::OptimizationProvider(_) => "OPTIMIZATION_PROVIDER_ERROR",
            DispatchError::TooManyStops { .. } => "TOO_MANY_STOPS",
            DispatchError::EmptyRoute => "EMPTY_ROUTE",
            DispatchError::InvalidPlan(_) => "INVALID_PLAN",
            DispatchError::StartUnresolved { .. } => "START_UNRESOLVED",
            DispatchError::EligibilityConflict { .. } => "ELIGIBILITY_CONFLICT",
            DispatchError::OrderStateConflict { .. } => "ORDER_STATE_CONFLICT",
            DispatchError::Persistence { .. } => "PERSISTENCE_ERROR",
            DispatchError::LifecycleViolation { .. } => "LIFECYCLE_VIOLATION",
            DispatchError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            DispatchError::StopNotFound { .. } => "STOP_NOT_FOUND",
            DispatchError::InvalidStopTransition(_) => "INVALID_STOP_TRANSITION",
            DispatchError::DriverNotFound(_) => "DRIVER_NOT_FOUND",
            DispatchError::DriverInactive(_) => "DRIVER_INACTIVE",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
