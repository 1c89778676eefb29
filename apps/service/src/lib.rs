//! Pulse - recurring health probing of a fixed set of endpoints.
//!
//! The [`engine::PulseEngine`] facade is the entry point: it owns the target
//! registry, the observation store, the background scheduler and the status
//! aggregator.

pub mod config;
pub mod database;
pub mod engine;
pub mod monitoring;
pub mod pool;
pub mod registry;
pub mod status;

pub use config::Config;
pub use engine::PulseEngine;
