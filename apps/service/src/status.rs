//! Status aggregation.
//!
//! Answers "what is every target doing right now" from the observation log,
//! falling back to a live probe for targets that have never been observed.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::database::{ObservationStore, StoreError};
use crate::monitoring::{Observation, ProbeExecutor, StatusSnapshot};
use crate::registry::{Target, TargetRegistry};

/// Number of history records returned when the caller gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

pub struct StatusAggregator {
    registry: TargetRegistry,
    executor: Arc<ProbeExecutor>,
    store: Arc<dyn ObservationStore>,
    /// Held while filling in targets that have no stored observation
    on_demand: Mutex<()>,
}

impl StatusAggregator {
    pub fn new(
        registry: TargetRegistry,
        executor: Arc<ProbeExecutor>,
        store: Arc<dyn ObservationStore>,
    ) -> Self {
        Self { registry, executor, store, on_demand: Mutex::new(()) }
    }

    /// One snapshot per registered target, in registry order
    pub async fn current_status(&self) -> Result<Vec<StatusSnapshot>, StoreError> {
        let mut latest = self.store.latest_by_target(&self.registry.names()).await?;
        let mut fresh = HashMap::new();

        if latest.len() < self.registry.len() {
            let _guard = self.on_demand.lock().await;

            // Another query may have filled the gaps while we waited
            let missing_names: Vec<String> = self
                .registry
                .names()
                .into_iter()
                .filter(|name| !latest.contains_key(name))
                .collect();
            latest.extend(self.store.latest_by_target(&missing_names).await?);

            let missing: Vec<&Target> =
                self.registry.targets().filter(|t| !latest.contains_key(&t.name)).collect();
            if !missing.is_empty() {
                debug!("{} targets have no history, probing on demand", missing.len());
            }

            fresh = join_all(missing.into_iter().map(|target| self.probe_and_persist(target)))
                .await
                .into_iter()
                .map(|observation| (observation.target_name.clone(), observation))
                .collect();
        }

        let snapshots = self
            .registry
            .targets()
            .filter_map(|target| {
                if let Some(observation) = latest.remove(&target.name) {
                    Some(StatusSnapshot::from_stored(target, observation))
                } else {
                    fresh
                        .remove(&target.name)
                        .map(|observation| StatusSnapshot::from_probe(target, observation))
                }
            })
            .collect();

        Ok(snapshots)
    }

    /// Most recent observations across all targets, newest first
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<Observation>, StoreError> {
        self.store.recent(limit.unwrap_or(DEFAULT_HISTORY_LIMIT)).await
    }

    /// Live probe for a target with no history. The result is kept in the log
    /// so later history queries see it.
    async fn probe_and_persist(&self, target: &Target) -> Observation {
        let mut observation = self.executor.probe(target).await;

        match self.store.append(&observation).await {
            Ok(id) => observation.id = Some(id),
            Err(e) => warn!("Failed to store on-demand observation for {}: {}", target.name, e),
        }

        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::tests::{FailingStore, create_test_store};
    use crate::monitoring::ProbeStatus;
    use crate::monitoring::executor::tests::{Scripted, ScriptedChecker, here};
    use crate::monitoring::scheduler::MonitoringScheduler;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn aggregator(
        targets: Vec<Target>,
        checker: Arc<ScriptedChecker>,
        store: Arc<dyn ObservationStore>,
    ) -> StatusAggregator {
        let executor =
            Arc::new(ProbeExecutor::with_checkers(checker.clone(), checker, Duration::from_secs(5)));
        StatusAggregator::new(TargetRegistry::new(targets).unwrap(), executor, store)
    }

    #[tokio::test]
    async fn test_latest_observation_wins() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let checker = Arc::new(ScriptedChecker::default());

        let now = Utc::now();
        store.append(&Observation::up("A", 10.0, "HTTP 200").at(now - ChronoDuration::seconds(20))).await.unwrap();
        store.append(&Observation::down("A", "HTTP 500").at(now - ChronoDuration::seconds(10))).await.unwrap();

        let aggregator = aggregator(
            vec![Target::http("A", "http://a.test", here())],
            checker.clone(),
            store.clone(),
        );

        let snapshots = aggregator.current_status().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, ProbeStatus::Down);
        assert_eq!(snapshots[0].latency_ms, 0.0);
        assert!(snapshots[0].message.starts_with("HTTP 500 (checked at "));
        assert_eq!(checker.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_history_probes_once_and_persists() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let checker = Arc::new(ScriptedChecker::new(vec![(
            "http://c.test",
            Scripted::Up(42.0, "HTTP 200"),
        )]));

        let aggregator = aggregator(
            vec![Target::http("C", "http://c.test", here())],
            checker.clone(),
            store.clone(),
        );

        let snapshots = aggregator.current_status().await.unwrap();
        assert_eq!(checker.calls(), 1);
        assert_eq!(snapshots[0].status, ProbeStatus::Up);
        assert_eq!(snapshots[0].latency_ms, 42.0);
        assert_eq!(snapshots[0].message, "HTTP 200");

        let history = aggregator.history(Some(1)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].target_name, "C");
        assert_eq!(history[0].latency_ms, 42.0);

        let latest = store.latest_by_target(&["C".to_string()]).await.unwrap();
        assert_eq!(latest["C"].id, history[0].id);

        // Second query is served from the log
        aggregator.current_status().await.unwrap();
        assert_eq!(checker.calls(), 1);
    }

    #[tokio::test]
    async fn test_only_missing_targets_are_probed() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        store.append(&Observation::up("A", 7.0, "HTTP 200")).await.unwrap();

        let checker = Arc::new(ScriptedChecker::new(vec![
            ("http://a.test", Scripted::Up(1.0, "HTTP 200")),
            ("10.0.0.2", Scripted::Fail("Ping timeout")),
        ]));
        let aggregator = aggregator(
            vec![Target::http("A", "http://a.test", here()), Target::icmp("B", "10.0.0.2", here())],
            checker.clone(),
            store.clone(),
        );

        let snapshots = aggregator.current_status().await.unwrap();
        assert_eq!(checker.calls_for("http://a.test"), 0);
        assert_eq!(checker.calls_for("10.0.0.2"), 1);
        assert_eq!(snapshots[0].name, "A");
        assert_eq!(snapshots[0].latency_ms, 7.0);
        assert_eq!(snapshots[1].name, "B");
        assert_eq!(snapshots[1].status, ProbeStatus::Down);
        assert_eq!(snapshots[1].message, "Ping timeout");
    }

    #[tokio::test]
    async fn test_round_then_status_in_registry_order() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let checker = Arc::new(ScriptedChecker::new(vec![
            ("http://ok.test", Scripted::Up(120.0, "HTTP 200")),
            ("10.0.0.9", Scripted::Fail("Ping timeout")),
        ]));
        let targets =
            vec![Target::http("A", "http://ok.test", here()), Target::icmp("B", "10.0.0.9", here())];
        let executor =
            Arc::new(ProbeExecutor::with_checkers(checker.clone(), checker.clone(), Duration::from_secs(5)));
        let registry = TargetRegistry::new(targets).unwrap();

        let scheduler = MonitoringScheduler::new(
            registry.clone(),
            executor.clone(),
            store.clone(),
            Duration::from_secs(10),
        );
        scheduler.run_round().await;

        let aggregator = StatusAggregator::new(registry, executor, store.clone());
        let snapshots = aggregator.current_status().await.unwrap();

        assert_eq!(checker.calls(), 2);
        assert_eq!(snapshots.len(), 2);
        assert_eq!((snapshots[0].name.as_str(), snapshots[0].status), ("A", ProbeStatus::Up));
        assert_eq!(snapshots[0].latency_ms, 120.0);
        assert!(snapshots[0].message.starts_with("HTTP 200"));
        assert_eq!((snapshots[1].name.as_str(), snapshots[1].status), ("B", ProbeStatus::Down));
        assert_eq!(snapshots[1].latency_ms, 0.0);
        assert!(snapshots[1].message.starts_with("Ping timeout"));
    }

    #[tokio::test]
    async fn test_history_defaults_and_limits() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let base = Utc::now();
        for i in 0..60 {
            store
                .append(&Observation::up("A", 1.0, "ok").at(base + ChronoDuration::milliseconds(i)))
                .await
                .unwrap();
        }

        let aggregator = aggregator(
            vec![Target::http("A", "http://a.test", here())],
            Arc::new(ScriptedChecker::default()),
            store,
        );

        let history = aggregator.history(None).await.unwrap();
        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        assert!(history.windows(2).all(|w| w[0].observed_at > w[1].observed_at));
        assert!(aggregator.history(Some(0)).await.unwrap().is_empty());
        assert_eq!(aggregator.history(Some(3)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_queries_check_once() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);
        let checker = Arc::new(ScriptedChecker::new(vec![(
            "http://c.test",
            Scripted::Slow(Duration::from_millis(200), 15.0, "HTTP 200"),
        )]));
        let aggregator = Arc::new(aggregator(
            vec![Target::http("C", "http://c.test", here())],
            checker.clone(),
            store.clone(),
        ));

        let first = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.current_status().await }
        });
        let second = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.current_status().await }
        });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(checker.calls(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(first[0].status, ProbeStatus::Up);
        assert_eq!(second[0].latency_ms, 15.0);
    }

    #[tokio::test]
    async fn test_store_failure_fails_queries() {
        let checker = Arc::new(ScriptedChecker::default());
        let aggregator = aggregator(
            vec![Target::http("A", "http://a.test", here())],
            checker.clone(),
            Arc::new(FailingStore { fail_reads: true }),
        );

        assert!(matches!(aggregator.current_status().await, Err(StoreError::Pool(_))));
        assert!(aggregator.history(None).await.is_err());
        assert_eq!(checker.calls(), 0);
    }

    #[tokio::test]
    async fn test_unpersisted_live_result_still_returned() {
        let checker = Arc::new(ScriptedChecker::new(vec![(
            "10.0.0.3",
            Scripted::Up(3.5, "Ping OK"),
        )]));
        let aggregator = aggregator(
            vec![Target::icmp("D", "10.0.0.3", here())],
            checker.clone(),
            Arc::new(FailingStore { fail_reads: false }),
        );

        let snapshots = aggregator.current_status().await.unwrap();
        assert_eq!(checker.calls(), 1);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, ProbeStatus::Up);
        assert_eq!(snapshots[0].latency_ms, 3.5);
        assert_eq!(snapshots[0].message, "Ping OK");
    }
}
