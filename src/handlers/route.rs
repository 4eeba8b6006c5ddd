//! Route planning and creation message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{parse_request, respond};
use crate::services::dispatch::DispatchService;
use crate::types::{
    CreateRouteRequest, DispatchRouteRequest, EligibleOrderFilter, ListRoutesRequest, PlanRouteRequest,
    RouteIdRequest,
};

/// Handle dispatch.orders.eligible messages
pub async fn handle_eligible(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received orders.eligible message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<EligibleOrderFilter>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = dispatch.list_eligible_orders(&request.payload).await;
        respond(&client, reply, request.id, "orders.eligible", result).await?;
    }

    Ok(())
}

/// Handle dispatch.route.plan messages
///
/// Aggregates and optimizes without persisting anything.
pub async fn handle_plan(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.plan message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<PlanRouteRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = dispatch.plan_route(&request.payload).await;
        respond(&client, reply, request.id, "route.plan", result).await?;
    }

    Ok(())
}

/// Handle dispatch.route.create messages
pub async fn handle_create(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<CreateRouteRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = dispatch.create_route(&request.payload).await;
        respond(&client, reply, request.id, "route.create", result).await?;
    }

    Ok(())
}

/// Handle dispatch.route.dispatch messages (plan and create in one call)
pub async fn handle_dispatch(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.dispatch message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<DispatchRouteRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = dispatch.dispatch_orders(&request.payload).await;
        respond(&client, reply, request.id, "route.dispatch", result).await?;
    }

    Ok(())
}

/// Handle dispatch.route.get messages
pub async fn handle_get(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.get message");

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

        let result = dispatch.get_route(request.payload.route_id).await;
        respond(&client, reply, request.id, "route.get", result).await?;
    }

    Ok(())
}

/// Handle dispatch.route.list messages
pub async fn handle_list(client: Client, mut subscriber: Subscriber, dispatch: Arc<DispatchService>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let Some(request) = parse_request::<ListRoutesRequest>(&client, &reply, &msg.payload).await? else {
            continue;
        };

        let result = dispatch.list_routes(request.payload.date).await;
        respond(&client, reply, request.id, "route.list", result).await?;
    }

    Ok(())
}
