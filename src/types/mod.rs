//! Type definitions

pub mod driver;
pub mod location;
pub mod messages;
pub mod order;
pub mod plan;
pub mod route;

pub use driver::*;
pub use location::*;
pub use messages::*;
pub use order::*;
pub use plan::*;
pub use route::*;
