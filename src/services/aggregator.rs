//! Stop aggregator: groups eligible orders by delivery point

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AddressResolutionError;
use crate::services::geo::within_tolerance;
use crate::services::resolver::LocationResolver;
use crate::types::{normalize_address, Location, Order, StopCandidate};

/// Aggregation output
#[derive(Debug, Default)]
pub struct AggregationResult {
    /// Stops in order of first appearance in the input
    pub stops: Vec<StopCandidate>,
    /// Orders left out because their address could not be resolved
    pub unresolved: Vec<AddressResolutionError>,
}

impl AggregationResult {
    pub fn warnings(&self) -> Vec<String> {
        self.unresolved.iter().map(|e| e.to_string()).collect()
    }

    pub fn excluded_order_ids(&self) -> Vec<Uuid> {
        self.unresolved.iter().map(|e| e.order_id).collect()
    }
}

pub struct StopAggregator<'a> {
    resolver: &'a LocationResolver,
    tolerance_meters: f64,
}

impl<'a> StopAggregator<'a> {
    pub fn new(resolver: &'a LocationResolver, tolerance_meters: f64) -> Self {
        Self { resolver, tolerance_meters }
    }

    /// Resolve every order and merge those that share a delivery point.
    ///
    /// Stored coordinates win over geocoding. Two orders share a stop when
    /// their normalized addresses match or their points are within tolerance.
    pub async fn aggregate(&self, orders: &[Order]) -> AggregationResult {
        let mut result = AggregationResult::default();
        // normalized address of each stop, parallel to result.stops
        let mut keys: Vec<String> = Vec::new();

        for order in orders {
            let location = match order.coordinates() {
                Some(coordinates) => Location::new(order.delivery_address.trim(), coordinates),
                None => match self.resolver.resolve(&order.delivery_address).await {
                    Ok(location) => location,
                    Err(reason) => {
                        let err = AddressResolutionError {
                            order_id: order.id,
                            order_number: order.order_number.clone(),
                            address: order.delivery_address.clone(),
                            reason: reason.to_string(),
                        };
                        warn!("Excluding order from route: {}", err);
                        result.unresolved.push(err);
                        continue;
                    }
                },
            };

            let key = normalize_address(&order.delivery_address);
            let existing = result.stops.iter().zip(&keys).position(|(stop, stop_key)| {
                *stop_key == key
                    || within_tolerance(&stop.location.coordinates, &location.coordinates, self.tolerance_meters)
            });

            match existing {
                Some(idx) => {
                    let stop = &mut result.stops[idx];
                    stop.orders.push(order.to_ref());
                    debug!("{} now serves {}", stop.id, stop.order_number());
                }
                None => {
                    result.stops.push(StopCandidate {
                        id: format!("stop-{}", result.stops.len() + 1),
                        location,
                        orders: vec![order.to_ref()],
                        priority: None,
                        time_window: None,
                    });
                    keys.push(key);
                }
            }
        }

        debug!(
            "Aggregated {} orders into {} stops ({} unresolved)",
            orders.len(),
            result.stops.len(),
            result.unresolved.len()
        );

        result
    }
}
