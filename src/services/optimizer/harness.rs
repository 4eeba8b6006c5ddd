//! Optimize a plain list of addresses, without orders or a database.
//!
//! Backs the `optimize` CLI command so the optimizer can be exercised
//! against real geocoding and routing backends.

use tracing::{info, warn};

use super::RouteOptimizer;
use crate::error::{DispatchError, Result};
use crate::services::resolver::LocationResolver;
use crate::types::{OptimizeOptions, OptimizeRequest, OptimizedPlan, StopCandidate};

pub async fn optimize_addresses(
    resolver: &LocationResolver,
    optimizer: &dyn RouteOptimizer,
    start: &str,
    addresses: &[String],
    options: OptimizeOptions,
) -> Result<OptimizedPlan> {
    let start_location = resolver
        .resolve(start)
        .await
        .map_err(|e| DispatchError::StartUnresolved {
            address: start.to_string(),
            reason: e.to_string(),
        })?;

    let mut stops = Vec::with_capacity(addresses.len());
    let mut skipped = Vec::new();
    for address in addresses {
        match resolver.resolve(address).await {
            Ok(location) => stops.push(StopCandidate {
                id: format!("stop-{}", stops.len() + 1),
                location,
                orders: Vec::new(),
                priority: None,
                time_window: None,
            }),
            Err(reason) => {
                warn!("Skipping '{}': {}", address, reason);
                skipped.push(format!("address '{}' could not be resolved ({})", address, reason));
            }
        }
    }

    info!("Optimizing {} of {} addresses from '{}'", stops.len(), addresses.len(), start);

    let request = OptimizeRequest { start_location, stops, options };
    let mut plan = optimizer.optimize(&request).await?;
    skipped.append(&mut plan.warnings);
    plan.warnings = skipped;

    Ok(plan)
}
