//! Route optimizer
//!
//! Two strategies behind one trait: [`ProviderOptimizer`] uses routing
//! provider matrices, [`FallbackOptimizer`] produces synthetic estimates.
//! [`AdaptiveOptimizer`] tries the provider and degrades to the fallback on
//! provider failure or timeout.

mod config;
mod fallback;
mod harness;
mod provider;
mod timeline;

pub use config::OptimizerSettings;
pub use fallback::{FallbackOptimizer, DEGRADED_NOTICE};
pub use harness::optimize_addresses;
pub use provider::ProviderOptimizer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{DispatchError, Result};
use crate::services::routing::RoutingService;
use crate::types::{OptimizationMethod, OptimizeRequest, OptimizedPlan};

/// Common contract of all optimization strategies
#[async_trait]
pub trait RouteOptimizer: Send + Sync {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizedPlan>;

    /// Method recorded on plans this optimizer produces
    fn method(&self) -> OptimizationMethod;
}

/// Reject requests no strategy may serve
pub fn validate_request(request: &OptimizeRequest) -> Result<()> {
    let count = request.stops.len();
    let max = request.options.max_stops_per_route;
    if count > max {
        return Err(DispatchError::TooManyStops { count, max });
    }
    Ok(())
}

/// Provider first, fallback on provider failure
pub struct AdaptiveOptimizer {
    provider: Arc<dyn RouteOptimizer>,
    fallback: Arc<dyn RouteOptimizer>,
    timeout: Duration,
}

impl AdaptiveOptimizer {
    pub fn new(provider: Arc<dyn RouteOptimizer>, fallback: Arc<dyn RouteOptimizer>, timeout: Duration) -> Self {
        Self { provider, fallback, timeout }
    }

    /// Standard wiring over a routing service
    pub fn with_routing(routing: Arc<dyn RoutingService>, settings: OptimizerSettings) -> Self {
        let timeout = settings.provider_timeout();
        Self::new(
            Arc::new(ProviderOptimizer::new(routing, settings.clone())),
            Arc::new(FallbackOptimizer::new(settings)),
            timeout,
        )
    }

    async fn degrade(&self, request: &OptimizeRequest, reason: String) -> Result<OptimizedPlan> {
        warn!("Route optimization provider failed, using fallback estimates: {}", reason);

        let mut plan = self.fallback.optimize(request).await?;
        plan.warnings.insert(
            0,
            format!("Optimization provider unavailable ({}); route uses degraded estimates", reason),
        );
        Ok(plan)
    }
}

#[async_trait]
impl RouteOptimizer for AdaptiveOptimizer {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizedPlan> {
        validate_request(request)?;

        match tokio::time::timeout(self.timeout, self.provider.optimize(request)).await {
            Ok(Ok(plan)) => Ok(plan),
            Ok(Err(DispatchError::OptimizationProvider(reason))) => self.degrade(request, reason).await,
            Ok(Err(other)) => Err(other),
            Err(_) => {
                let reason = format!("no answer within {}s", self.timeout.as_secs());
                self.degrade(request, reason).await
            }
        }
    }

    fn method(&self) -> OptimizationMethod {
        self.provider.method()
    }
}
