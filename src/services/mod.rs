//! Business logic services

pub mod aggregator;
pub mod dispatch;
pub mod geo;
pub mod geocoding;
pub mod nominatim;
pub mod optimizer;
pub mod resolver;
pub mod routing;
pub mod trip;

#[cfg(test)]
mod testing;
