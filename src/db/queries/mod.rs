//! Database queries

pub mod driver;
pub mod order;
pub mod route;
