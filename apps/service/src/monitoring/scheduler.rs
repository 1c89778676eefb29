use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::executor::ProbeExecutor;
use super::types::{Observation, ProbeStatus};
use crate::database::ObservationStore;
use crate::registry::TargetRegistry;

/// Outcome of one round of probes
#[derive(Debug, Clone)]
pub struct RoundSummary {
    /// One observation per target, in registry order
    pub observations: Vec<Observation>,
    pub up: usize,
    pub down: usize,
    /// Observations that could not be written to the store
    pub persist_failures: usize,
    pub elapsed: Duration,
}

/// Monitoring scheduler - probes every target on a fixed cadence
pub struct MonitoringScheduler {
    registry: TargetRegistry,
    executor: Arc<ProbeExecutor>,
    store: Arc<dyn ObservationStore>,
    interval: Duration,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(
        registry: TargetRegistry,
        executor: Arc<ProbeExecutor>,
        store: Arc<dyn ObservationStore>,
        interval: Duration,
    ) -> Self {
        Self { registry, executor, store, interval }
    }

    /// Probe every target concurrently, persisting each result as soon as it
    /// arrives. Returns once all probes have finished.
    pub async fn run_round(&self) -> RoundSummary {
        let start = Instant::now();

        let handles: Vec<_> = self
            .registry
            .targets()
            .cloned()
            .map(|target| {
                let executor = Arc::clone(&self.executor);
                let store = Arc::clone(&self.store);

                tokio::spawn(async move {
                    let mut observation = executor.probe(&target).await;
                    let persisted = persist(store.as_ref(), &mut observation).await;
                    (observation, persisted)
                })
            })
            .collect();

        let mut summary = RoundSummary {
            observations: Vec::with_capacity(handles.len()),
            up: 0,
            down: 0,
            persist_failures: 0,
            elapsed: Duration::ZERO,
        };

        let joined = join_all(handles).await;
        for (target, result) in self.registry.targets().zip(joined) {
            let (observation, persisted) = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The task died before producing anything; record it as down
                    error!("Probe task for {} failed: {}", target.name, e);
                    let mut observation =
                        Observation::down(&target.name, format!("Probe task failed: {}", e));
                    let persisted = persist(self.store.as_ref(), &mut observation).await;
                    (observation, persisted)
                }
            };

            match observation.status {
                ProbeStatus::Up => summary.up += 1,
                ProbeStatus::Down => summary.down += 1,
            }
            if !persisted {
                summary.persist_failures += 1;
            }
            summary.observations.push(observation);
        }

        summary.elapsed = start.elapsed();
        summary
    }

    /// Spawn the perpetual probing loop. It only ends with the runtime.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Scheduler started: {} targets every {}s",
                self.registry.len(),
                self.interval.as_secs_f64()
            );

            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let summary = self.run_round().await;
                info!(
                    up = summary.up,
                    down = summary.down,
                    persist_failures = summary.persist_failures,
                    "Round completed {} probes in {:.2}s",
                    summary.observations.len(),
                    summary.elapsed.as_secs_f64()
                );
            }
        })
    }
}

/// Append an observation, logging rather than propagating store failures
async fn persist(store: &dyn ObservationStore, observation: &mut Observation) -> bool {
    if observation.status == ProbeStatus::Down {
        warn!("{} is down: {}", observation.target_name, observation.message);
    }

    match store.append(observation).await {
        Ok(id) => {
            observation.id = Some(id);
            debug!("Stored observation {} for {}", id, observation.target_name);
            true
        }
        Err(e) => {
            error!("Failed to store observation for {}: {}", observation.target_name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::tests::{FailingStore, create_test_store};
    use crate::monitoring::executor::tests::{Scripted, ScriptedChecker, here};
    use crate::registry::Target;

    fn registry() -> TargetRegistry {
        TargetRegistry::new(vec![
            Target::http("A", "http://ok.test", here()),
            Target::icmp("B", "10.0.0.9", here()),
            Target::http("C", "http://slow.test", here()),
        ])
        .unwrap()
    }

    fn executor() -> Arc<ProbeExecutor> {
        let checker = Arc::new(ScriptedChecker::new(vec![
            ("http://ok.test", Scripted::Up(120.0, "HTTP 200")),
            ("10.0.0.9", Scripted::Fail("Ping timeout")),
            ("http://slow.test", Scripted::Hang),
        ]));
        Arc::new(ProbeExecutor::with_checkers(checker.clone(), checker, Duration::from_millis(300)))
    }

    #[tokio::test]
    async fn test_round_isolates_failures() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let scheduler =
            MonitoringScheduler::new(registry(), executor(), store.clone(), Duration::from_secs(10));

        let summary = scheduler.run_round().await;

        let names: Vec<&str> = summary.observations.iter().map(|o| o.target_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(summary.up, 1);
        assert_eq!(summary.down, 2);
        assert_eq!(summary.persist_failures, 0);
        assert!(summary.observations.iter().all(|o| o.id.is_some()));

        // Bounded by the slowest timeout, not the sum
        assert!(summary.elapsed < Duration::from_secs(2));

        assert_eq!(store.count().await.unwrap(), 3);
        let latest = store.latest_by_target(&registry().names()).await.unwrap();
        assert_eq!(latest["A"].latency_ms, 120.0);
        assert_eq!(latest["B"].message, "Ping timeout");
        assert_eq!(latest["C"].latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_abort_round() {
        let scheduler = MonitoringScheduler::new(
            registry(),
            executor(),
            Arc::new(FailingStore { fail_reads: true }),
            Duration::from_secs(10),
        );

        let summary = scheduler.run_round().await;
        assert_eq!(summary.observations.len(), 3);
        assert_eq!(summary.persist_failures, 3);
        assert!(summary.observations.iter().all(|o| o.id.is_none()));
    }

    #[tokio::test]
    async fn test_panicking_task_recorded_as_down() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let checker = Arc::new(ScriptedChecker::new(vec![
            ("http://ok.test", Scripted::Up(10.0, "HTTP 200")),
            ("10.0.0.9", Scripted::Panic),
        ]));
        let executor =
            Arc::new(ProbeExecutor::with_checkers(checker.clone(), checker, Duration::from_secs(5)));
        let registry = TargetRegistry::new(vec![
            Target::http("A", "http://ok.test", here()),
            Target::icmp("B", "10.0.0.9", here()),
        ])
        .unwrap();
        let scheduler =
            MonitoringScheduler::new(registry.clone(), executor, store.clone(), Duration::from_secs(10));

        let summary = scheduler.run_round().await;
        assert_eq!((summary.up, summary.down), (1, 1));

        let b = &summary.observations[1];
        assert_eq!(b.target_name, "B");
        assert_eq!(b.status, ProbeStatus::Down);
        assert_eq!(b.latency_ms, 0.0);
        assert!(b.message.starts_with("Probe task failed"));
        assert!(b.id.is_some());

        let latest = store.latest_by_target(&registry.names()).await.unwrap();
        assert_eq!(latest.len(), 2);
    }

    #[tokio::test]
    async fn test_loop_keeps_running() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let scheduler = Arc::new(MonitoringScheduler::new(
            registry(),
            executor(),
            store.clone(),
            Duration::from_millis(50),
        ));

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!handle.is_finished());
        handle.abort();

        // At least two full rounds of three probes
        assert!(store.count().await.unwrap() >= 6);
    }
}
