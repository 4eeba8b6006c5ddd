//! NATS message handlers

pub mod ping;
pub mod route;
pub mod trip;

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::select;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::services::dispatch::DispatchService;
use crate::services::trip::TripManager;
use crate::types::{ErrorResponse, Request, SuccessResponse};

pub const SUBJECT_PING: &str = "dispatch.ping";
pub const SUBJECT_ORDERS_ELIGIBLE: &str = "dispatch.orders.eligible";
pub const SUBJECT_ROUTE_PLAN: &str = "dispatch.route.plan";
pub const SUBJECT_ROUTE_CREATE: &str = "dispatch.route.create";
pub const SUBJECT_ROUTE_DISPATCH: &str = "dispatch.route.dispatch";
pub const SUBJECT_ROUTE_GET: &str = "dispatch.route.get";
pub const SUBJECT_ROUTE_LIST: &str = "dispatch.route.list";
pub const SUBJECT_TRIP_START: &str = "dispatch.trip.start";
pub const SUBJECT_TRIP_COMPLETE: &str = "dispatch.trip.complete";
pub const SUBJECT_TRIP_CANCEL: &str = "dispatch.trip.cancel";
pub const SUBJECT_TRIP_REASSIGN: &str = "dispatch.trip.reassign";
pub const SUBJECT_TRIP_DELETE: &str = "dispatch.trip.delete";
pub const SUBJECT_STOP_UPDATE: &str = "dispatch.stop.update";

/// Request id from a payload that failed to parse, so the error can still be
/// correlated by the caller
fn extract_request_id(payload: &[u8]) -> Uuid {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).and_then(|s| Uuid::parse_str(s).ok()))
        .unwrap_or_else(Uuid::nil)
}

/// Parse a request envelope. Replies with INVALID_REQUEST and returns
/// `None` when the payload does not match.
pub(crate) async fn parse_request<T: DeserializeOwned>(
    client: &Client,
    reply: &Subject,
    payload: &[u8],
) -> Result<Option<Request<T>>> {
    match serde_json::from_slice(payload) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            error!("Failed to parse request: {}", e);
            let error = ErrorResponse::new(extract_request_id(payload), "INVALID_REQUEST", e.to_string());
            let _ = client.publish(reply.clone(), serde_json::to_vec(&error)?.into()).await;
            Ok(None)
        }
    }
}

/// Publish the outcome of a domain operation as a success or error envelope
pub(crate) async fn respond<T: Serialize>(
    client: &Client,
    reply: Subject,
    request_id: Uuid,
    operation: &str,
    result: crate::error::Result<T>,
) -> Result<()> {
    let bytes = match result {
        Ok(payload) => serde_json::to_vec(&SuccessResponse::new(request_id, payload))?,
        Err(e) => {
            match &e {
                DispatchError::Persistence { .. } => error!("{} failed: {}", operation, e),
                _ => warn!("{} rejected: {}", operation, e),
            }
            serde_json::to_vec(&ErrorResponse::from_dispatch(request_id, &e))?
        }
    };

    let _ = client.publish(reply, bytes.into()).await;
    debug!("Replied to {}", operation);
    Ok(())
}

/// Start all message handlers
pub async fn start_handlers(client: Client, dispatch: Arc<DispatchService>, trips: Arc<TripManager>) -> Result<()> {
    info!("Starting message handlers...");

    let ping_sub = client.subscribe(SUBJECT_PING).await?;
    let eligible_sub = client.subscribe(SUBJECT_ORDERS_ELIGIBLE).await?;
    let plan_sub = client.subscribe(SUBJECT_ROUTE_PLAN).await?;
    let create_sub = client.subscribe(SUBJECT_ROUTE_CREATE).await?;
    let dispatch_sub = client.subscribe(SUBJECT_ROUTE_DISPATCH).await?;
    let get_sub = client.subscribe(SUBJECT_ROUTE_GET).await?;
    let list_sub = client.subscribe(SUBJECT_ROUTE_LIST).await?;

    let start_sub = client.subscribe(SUBJECT_TRIP_START).await?;
    let complete_sub = client.subscribe(SUBJECT_TRIP_COMPLETE).await?;
    let cancel_sub = client.subscribe(SUBJECT_TRIP_CANCEL).await?;
    let reassign_sub = client.subscribe(SUBJECT_TRIP_REASSIGN).await?;
    let delete_sub = client.subscribe(SUBJECT_TRIP_DELETE).await?;
    let stop_update_sub = client.subscribe(SUBJECT_STOP_UPDATE).await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let ping_handle = tokio::spawn(async move { ping::handle_ping(client_ping, ping_sub).await });

    let (client_eligible, dispatch_eligible) = (client.clone(), dispatch.clone());
    let eligible_handle = tokio::spawn(async move {
        route::handle_eligible(client_eligible, eligible_sub, dispatch_eligible).await
    });

    let (client_plan, dispatch_plan) = (client.clone(), dispatch.clone());
    let plan_handle = tokio::spawn(async move { route::handle_plan(client_plan, plan_sub, dispatch_plan).await });

    let (client_create, dispatch_create) = (client.clone(), dispatch.clone());
    let create_handle = tokio::spawn(async move {
        route::handle_create(client_create, create_sub, dispatch_create).await
    });

    let (client_dispatch, dispatch_dispatch) = (client.clone(), dispatch.clone());
    let dispatch_handle = tokio::spawn(async move {
        route::handle_dispatch(client_dispatch, dispatch_sub, dispatch_dispatch).await
    });

    let (client_get, dispatch_get) = (client.clone(), dispatch.clone());
    let get_handle = tokio::spawn(async move { route::handle_get(client_get, get_sub, dispatch_get).await });

    let (client_list, dispatch_list) = (client.clone(), dispatch.clone());
    let list_handle = tokio::spawn(async move { route::handle_list(client_list, list_sub, dispatch_list).await });

    let (client_start, trips_start) = (client.clone(), trips.clone());
    let start_handle = tokio::spawn(async move { trip::handle_start(client_start, start_sub, trips_start).await });

    let (client_complete, trips_complete) = (client.clone(), trips.clone());
    let complete_handle = tokio::spawn(async move {
        trip::handle_complete(client_complete, complete_sub, trips_complete).await
    });

    let (client_cancel, trips_cancel) = (client.clone(), trips.clone());
    let cancel_handle = tokio::spawn(async move {
        trip::handle_cancel(client_cancel, cancel_sub, trips_cancel).await
    });

    let (client_reassign, trips_reassign) = (client.clone(), trips.clone());
    let reassign_handle = tokio::spawn(async move {
        trip::handle_reassign(client_reassign, reassign_sub, trips_reassign).await
    });

    let (client_delete, trips_delete) = (client.clone(), trips.clone());
    let delete_handle = tokio::spawn(async move {
        trip::handle_delete(client_delete, delete_sub, trips_delete).await
    });

    let (client_stop, trips_stop) = (client.clone(), trips);
    let stop_update_handle = tokio::spawn(async move {
        trip::handle_update_stop(client_stop, stop_update_sub, trips_stop).await
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which means an error occurred)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = eligible_handle => {
            error!("Eligible orders handler finished: {:?}", result);
        }
        result = plan_handle => {
            error!("Route plan handler finished: {:?}", result);
        }
        result = create_handle => {
            error!("Route create handler finished: {:?}", result);
        }
        result = dispatch_handle => {
            error!("Route dispatch handler finished: {:?}", result);
        }
        result = get_handle => {
            error!("Route get handler finished: {:?}", result);
        }
        result = list_handle => {
            error!("Route list handler finished: {:?}", result);
        }
        result = start_handle => {
            error!("Trip start handler finished: {:?}", result);
        }
        result = complete_handle => {
            error!("Trip complete handler finished: {:?}", result);
        }
        result = cancel_handle => {
            error!("Trip cancel handler finished: {:?}", result);
        }
        result = reassign_handle => {
            error!("Trip reassign handler finished: {:?}", result);
        }
        result = delete_handle => {
            error!("Trip delete handler finished: {:?}", result);
        }
        result = stop_update_handle => {
            error!("Stop update handler finished: {:?}", result);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_request_id_from_partial_payload() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"id":"{}","payload":{{"routeId":42}}}}"#, id);
        assert_eq!(extract_request_id(payload.as_bytes()), id);
    }

    #[test]
    fn test_extract_request_id_falls_back_to_nil() {
        assert_eq!(extract_request_id(b"not json"), Uuid::nil());
        assert_eq!(extract_request_id(br#"{"id":"nope"}"#), Uuid::nil());
    }

    #[test]
    fn test_subjects_share_prefix() {
        for subject in [
            SUBJECT_PING,
            SUBJECT_ORDERS_ELIGIBLE,
            SUBJECT_ROUTE_PLAN,
            SUBJECT_ROUTE_CREATE,
            SUBJECT_ROUTE_DISPATCH,
            SUBJECT_ROUTE_GET,
            SUBJECT_ROUTE_LIST,
            SUBJECT_TRIP_START,
            SUBJECT_TRIP_COMPLETE,
            SUBJECT_TRIP_CANCEL,
            SUBJECT_TRIP_REASSIGN,
            SUBJECT_TRIP_DELETE,
            SUBJECT_STOP_UPDATE,
        ] {
            assert!(subject.starts_with("dispatch."), "{}", subject);
        }
    }
}
