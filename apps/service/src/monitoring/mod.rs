/// Probing engine
///
/// This module is responsible for:
/// - Executing HTTP and ICMP reachability checks
/// - Running periodic rounds across every registered target
/// - Handing each observation to the store
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use executor::ProbeExecutor;
pub use scheduler::{MonitoringScheduler, RoundSummary};
pub use types::{Observation, ProbeStatus, StatusSnapshot};
