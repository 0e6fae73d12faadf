//! Repository layer for database access.
//!
//! This module implements the Repository Pattern to abstract all database
//! interactions behind traits, so the scheduler can run against in-memory
//! fakes in tests.

pub mod report;
pub mod video;

pub use report::*;
pub use video::*;
