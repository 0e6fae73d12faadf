//! Domain layer for dvr-sentinel.
//!
//! Value objects shared by the scheduler, the persistence layer and the
//! configuration.

pub mod value_objects;

pub use value_objects::*;
