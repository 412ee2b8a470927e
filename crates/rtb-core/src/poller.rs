//! Background poller: periodically checks every tracked driver for a new
//! race result and posts it to the driver's channel.
//!
//! Novelty detection is marker-based: the registry stores the last notified
//! race id per driver, and the marker only advances after a successful
//! delivery. A failed delivery is retried on the next tick simply because the
//! marker did not move; there is no separate retry queue.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::Registration,
    ports::{NotificationSink, ResultSource},
    registry::TrackerRegistry,
    Result,
};

pub struct ResultPoller {
    registry: Arc<TrackerRegistry>,
    source: Arc<dyn ResultSource>,
    sink: Arc<dyn NotificationSink>,
}

impl ResultPoller {
    pub fn new(
        registry: Arc<TrackerRegistry>,
        source: Arc<dyn ResultSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            source,
            sink,
        }
    }

    /// Spawn the periodic loop. Ticks never overlap: a tick that overruns the
    /// period makes the missed firing get skipped, not queued.
    pub fn spawn(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self;
        tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                    poller.run_tick().await;
                  }
                }
            }
        })
    }

    /// One polling pass over a snapshot of all registrations.
    ///
    /// Public so tests (and a manual trigger) can drive ticks without a real
    /// clock. A failure for one driver is logged and never aborts the tick.
    pub async fn run_tick(&self) {
        let snapshot = self.registry.list().await;
        if snapshot.is_empty() {
            return;
        }
        debug!(drivers = snapshot.len(), "checking race results");

        for reg in &snapshot {
            if let Err(e) = self.check_driver(reg).await {
                warn!(driver = %reg.display_name, error = %e, "result check failed");
            }
        }
    }

    async fn check_driver(&self, reg: &Registration) -> Result<()> {
        // Destination gone (bot kicked, channel deleted): skip for this tick
        // but keep the registration.
        if !self.sink.resolve_channel(reg.channel_id).await {
            debug!(driver = %reg.display_name, channel = reg.channel_id.0, "channel unresolved, skipping");
            return Ok(());
        }

        let Some(report) = self
            .source
            .latest_result(&reg.driver_id, reg.last_race)
            .await?
        else {
            return Ok(());
        };

        self.sink
            .deliver(reg.channel_id, &reg.display_name, &report)
            .await?;

        // Marker moves only after the delivery succeeded; a driver
        // unregistered mid-tick makes this a no-op.
        self.registry
            .update_marker(&reg.driver_id, report.race_id)
            .await?;

        info!(
            driver = %reg.display_name,
            race_id = report.race_id.0,
            position = report.finish_position,
            "posted race result"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::{ChannelId, DriverId, RaceId, RaceReport};
    use crate::errors::Error;

    fn report(race_id: u64) -> RaceReport {
        RaceReport {
            race_id: RaceId(race_id),
            ..RaceReport::sample()
        }
    }

    #[derive(Default)]
    struct FakeSource {
        // Pending result per driver id; drained semantics are up to the test.
        results: Mutex<HashMap<String, RaceReport>>,
        failing: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn set_result(&self, driver: &str, r: RaceReport) {
            self.results.lock().unwrap().insert(driver.to_string(), r);
        }

        fn fail_for(&self, driver: &str) {
            self.failing.lock().unwrap().push(driver.to_string());
        }
    }

    #[async_trait]
    impl ResultSource for FakeSource {
        async fn latest_result(
            &self,
            driver: &DriverId,
            after: Option<RaceId>,
        ) -> Result<Option<RaceReport>> {
            if self.failing.lock().unwrap().contains(&driver.0) {
                return Err(Error::Upstream("simulated outage".to_string()));
            }
            let results = self.results.lock().unwrap();
            let Some(r) = results.get(&driver.0) else {
                return Ok(None);
            };
            // Contract: only strictly newer results are "new".
            if after.map(|a| r.race_id <= a).unwrap_or(false) {
                return Ok(None);
            }
            Ok(Some(r.clone()))
        }
    }

    #[derive(Default)]
    struct FakeSink {
        delivered: Mutex<Vec<(i64, String, RaceId)>>,
        failing_channels: Mutex<Vec<i64>>,
        dead_channels: Mutex<Vec<i64>>,
        // When set, deliver() unregisters this name first (mid-tick race).
        unregister_on_deliver: Mutex<Option<(Arc<TrackerRegistry>, String)>>,
    }

    #[async_trait]
    impl NotificationSink for FakeSink {
        async fn resolve_channel(&self, channel: ChannelId) -> bool {
            !self.dead_channels.lock().unwrap().contains(&channel.0)
        }

        async fn deliver(
            &self,
            channel: ChannelId,
            display_name: &str,
            report: &RaceReport,
        ) -> Result<()> {
            let hook = self.unregister_on_deliver.lock().unwrap().clone();
            if let Some((registry, name)) = hook {
                registry.unregister(&name).await.unwrap();
            }
            if self.failing_channels.lock().unwrap().contains(&channel.0) {
                return Err(Error::Delivery("simulated send failure".to_string()));
            }
            self.delivered.lock().unwrap().push((
                channel.0,
                display_name.to_string(),
                report.race_id,
            ));
            Ok(())
        }
    }

    fn tmp_store(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/rtb-poller-{}-{name}.json", std::process::id()))
    }

    fn setup(name: &str) -> (PathBuf, Arc<TrackerRegistry>, Arc<FakeSource>, Arc<FakeSink>) {
        let path = tmp_store(name);
        let _ = std::fs::remove_file(&path);
        let registry = Arc::new(TrackerRegistry::load(&path));
        (path, registry, Arc::new(FakeSource::default()), Arc::new(FakeSink::default()))
    }

    fn poller(
        registry: &Arc<TrackerRegistry>,
        source: &Arc<FakeSource>,
        sink: &Arc<FakeSink>,
    ) -> ResultPoller {
        ResultPoller::new(registry.clone(), source.clone(), sink.clone())
    }

    #[tokio::test]
    async fn novel_result_is_delivered_once() {
        let (path, registry, source, sink) = setup("once");
        registry.register("Bob", ChannelId(42)).await.unwrap();
        source.set_result("bob", report(100));

        let p = poller(&registry, &source, &sink);
        p.run_tick().await;

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(delivered, vec![(42, "Bob".to_string(), RaceId(100))]);
        assert_eq!(registry.list().await[0].last_race, Some(RaceId(100)));

        // Same result again on the next tick: nothing new, no duplicate post.
        p.run_tick().await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(registry.list().await[0].last_race, Some(RaceId(100)));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn quiet_tick_leaves_markers_unchanged() {
        let (path, registry, source, sink) = setup("quiet");
        let a = registry.register("a", ChannelId(1)).await.unwrap();
        registry.register("b", ChannelId(2)).await.unwrap();
        registry.update_marker(&a.driver_id, RaceId(5)).await.unwrap();

        poller(&registry, &source, &sink).run_tick().await;

        let all = registry.list().await;
        assert_eq!(all[0].last_race, Some(RaceId(5)));
        assert_eq!(all[1].last_race, None);
        assert!(sink.delivered.lock().unwrap().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_marker_for_retry() {
        let (path, registry, source, sink) = setup("retry");
        registry.register("ok", ChannelId(1)).await.unwrap();
        registry.register("bad", ChannelId(2)).await.unwrap();
        source.set_result("ok", report(10));
        source.set_result("bad", report(11));
        sink.failing_channels.lock().unwrap().push(2);

        let p = poller(&registry, &source, &sink);
        p.run_tick().await;

        let all = registry.list().await;
        assert_eq!(all[0].last_race, Some(RaceId(10)));
        assert_eq!(all[1].last_race, None); // will be retried
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);

        // Channel recovers: next tick re-delivers the same result.
        sink.failing_channels.lock().unwrap().clear();
        p.run_tick().await;
        assert_eq!(registry.list().await[1].last_race, Some(RaceId(11)));
        assert_eq!(sink.delivered.lock().unwrap().len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn upstream_failure_for_one_driver_does_not_abort_the_tick() {
        let (path, registry, source, sink) = setup("contained");
        registry.register("down", ChannelId(1)).await.unwrap();
        registry.register("up", ChannelId(2)).await.unwrap();
        source.fail_for("down");
        source.set_result("up", report(20));

        poller(&registry, &source, &sink).run_tick().await;

        let all = registry.list().await;
        assert_eq!(all[0].last_race, None);
        assert_eq!(all[1].last_race, Some(RaceId(20)));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn unresolved_channel_is_skipped_without_unregistering() {
        let (path, registry, source, sink) = setup("dead-channel");
        registry.register("Bob", ChannelId(42)).await.unwrap();
        source.set_result("bob", report(30));
        sink.dead_channels.lock().unwrap().push(42);

        poller(&registry, &source, &sink).run_tick().await;

        assert!(sink.delivered.lock().unwrap().is_empty());
        let all = registry.list().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_race, None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn driver_unregistered_mid_tick_is_tolerated() {
        let (path, registry, source, sink) = setup("mid-tick");
        registry.register("Bob", ChannelId(42)).await.unwrap();
        source.set_result("bob", report(40));
        *sink.unregister_on_deliver.lock().unwrap() = Some((registry.clone(), "Bob".to_string()));

        // The tick completes; update_marker is a no-op on the vanished entry.
        poller(&registry, &source, &sink).run_tick().await;
        assert!(registry.is_empty().await);

        let _ = std::fs::remove_file(&path);
    }
}
