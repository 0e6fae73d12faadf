//! dvr-sentinel library crate.
//!
//! This module exposes the core functionality for integration testing.

pub mod actuator;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod notification;
pub mod panic_hook;
pub mod schedule;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
