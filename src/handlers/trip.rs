//! Trip lifecycle message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{parse_request, respond};
use crate::services::trip::TripManager;
use crate::types::{CancelTripRequest, ReassignTripRequest, RouteIdRequest, UpdateStopRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedRoute {
    route_id: Uuid,
    deleted: bool,
}

/// Handle dispatch.trip.start messages
pub async fn handle_start(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received trip.start message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<RouteIdRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = trips.start_trip(request.payload.route_id).await;
        respond(&client, reply, request.id, "trip.start", result).await?;
    }

    Ok(())
}

/// Handle dispatch.trip.complete messages
pub async fn handle_complete(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received trip.complete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<RouteIdRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = trips.complete_trip(request.payload.route_id).await;
        respond(&client, reply, request.id, "trip.complete", result).await?;
    }

    Ok(())
}

/// Handle dispatch.trip.cancel messages
pub async fn handle_cancel(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received trip.cancel message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<CancelTripRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let CancelTripRequest { route_id, reason } = request.payload;
        let result = trips.cancel_trip(route_id, reason).await;
        respond(&client, reply, request.id, "trip.cancel", result).await?;
    }

    Ok(())
}

/// Handle dispatch.trip.reassign messages
pub async fn handle_reassign(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received trip.reassign message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<ReassignTripRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = trips
            .reassign_driver(request.payload.route_id, request.payload.driver_id)
            .await;
        respond(&client, reply, request.id, "trip.reassign", result).await?;
    }

    Ok(())
}

/// Handle dispatch.trip.delete messages
pub async fn handle_delete(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received trip.delete message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<RouteIdRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let route_id = request.payload.route_id;
        let result = trips
            .delete_route(route_id)
            .await
            .map(|()| DeletedRoute { route_id, deleted: true });
        respond(&client, reply, request.id, "trip.delete", result).await?;
    }

    Ok(())
}

/// Handle dispatch.stop.update messages
pub async fn handle_update_stop(client: Client, mut subscriber: Subscriber, trips: Arc<TripManager>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received stop.update message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<UpdateStopRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let UpdateStopRequest { route_id, stop_id, update } = &request.payload;
        let result = trips.update_stop(*route_id, *stop_id, update).await;
        respond(&client, reply, request.id, "stop.update", result).await?;
    }

    Ok(())
}
