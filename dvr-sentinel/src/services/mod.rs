//! Service layer module.
//!
//! Wires repositories, sinks, the actuator and the tickers together.

pub mod container;

pub use container::ServiceContainer;
