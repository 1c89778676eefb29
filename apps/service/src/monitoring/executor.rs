use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::checker::{Checker, HttpChecker, IcmpChecker, MockChecker};
use super::types::Observation;
use crate::config::{ProbeConfig, ProbeMode};
use crate::registry::{ProbeMethod, Target};

/// Slack between a checker's own timeout and the executor's hard bound
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Probe executor - runs one bounded reachability check against one target
pub struct ProbeExecutor {
    http_checker: Arc<dyn Checker>,
    icmp_checker: Arc<dyn Checker>,
    timeout: Duration,
}

impl ProbeExecutor {
    /// Create an executor from probe settings
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        // Checkers report their own timeouts first; this only catches hangs
        let bound = timeout + PROBE_GRACE;

        let executor = match config.mode {
            ProbeMode::Live => Self::with_checkers(
                Arc::new(HttpChecker::new(timeout)?),
                Arc::new(IcmpChecker::new(Duration::from_secs(config.ping_wait_secs))),
                bound,
            ),
            ProbeMode::Mock => {
                let mock = Arc::new(MockChecker::default());
                Self::with_checkers(mock.clone(), mock, bound)
            }
        };

        Ok(executor)
    }

    /// Create an executor with explicit checkers; `timeout` is the hard bound
    /// on a whole probe
    pub fn with_checkers(
        http_checker: Arc<dyn Checker>,
        icmp_checker: Arc<dyn Checker>,
        timeout: Duration,
    ) -> Self {
        Self { http_checker, icmp_checker, timeout }
    }

    /// Probe a target. Never fails: every failure is a `Down` observation.
    pub async fn probe(&self, target: &Target) -> Observation {
        let checker: &dyn Checker = match target.method {
            ProbeMethod::Http { .. } => self.http_checker.as_ref(),
            ProbeMethod::Icmp { .. } => self.icmp_checker.as_ref(),
        };

        let observation = match timeout(self.timeout, checker.check(target.method.endpoint())).await {
            Ok(Ok((latency_ms, message))) => Observation::up(&target.name, latency_ms, message),
            Ok(Err(e)) => Observation::down(&target.name, e.to_string()),
            Err(_) => Observation::down(
                &target.name,
                format!("Probe timed out after {}s", self.timeout.as_secs_f64()),
            ),
        };

        tracing::debug!(
            target_name = %observation.target_name,
            status = %observation.status,
            latency_ms = observation.latency_ms,
            "{}",
            observation.message
        );

        observation
    }
}
