//! Shared tracing setup for the pulse binaries.

mod tracing;

pub use self::tracing::{init, try_init};
