#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{Pid, bytes_to_mb};
use crate::error::Error;
use crate::inspect::{ProcessInspector, read_metric};
use crate::registry::{self, RegistrySnapshot, ScanFilter};
use crate::sampler::TickReadings;
use config::MemoryMetric;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// What background tasks hand back to the controller's owner.
#[derive(Debug)]
pub enum MonitorEvent {
    Snapshot(RegistrySnapshot),
    Tick(TickReadings),
    ScanFailed(String),
}

/// The pids the sampling worker measures and how.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleTargets {
    pub pids: Vec<Pid>,
    pub metric: MemoryMetric,
}

impl SampleTargets {
    pub fn idle(metric: MemoryMetric) -> Self {
        Self {
            pids: Vec::new(),
            metric,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pids.is_empty()
    }
}

/// Measure every target once. Targets that are gone are left out of both
/// `live` and `readings`.
pub fn collect_readings(
    inspector: &dyn ProcessInspector,
    targets: &SampleTargets,
    at: f64,
) -> Result<TickReadings, Error> {
    let all = inspector.live_pids()?;
    let mut tick = TickReadings {
        at,
        metric: targets.metric,
        ..TickReadings::default()
    };
    for &pid in &targets.pids {
        if !all.contains(&pid) {
            continue;
        }
        tick.live.insert(pid);
        let reading = read_metric(inspector, pid, targets.metric).map(|(_, b)| bytes_to_mb(b));
        tick.readings.insert(pid, reading);
    }
    trace!(at, live = tick.live.len(), "readings collected");
    Ok(tick)
}

/// Periodic sampling loop. Reads the current targets from `targets` every
/// `interval` and posts one [`MonitorEvent::Tick`] per round. Exits once
/// `cancel` fires or the receiving side is gone.
pub async fn run_sampler(
    inspector: Arc<dyn ProcessInspector>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    mut targets: watch::Receiver<SampleTargets>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    cancel: CancellationToken,
) {
    debug!(?interval, "sampler worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let current = targets.borrow_and_update().clone();
        if !current.is_idle() {
            let at = clock.now();
            let inspector = Arc::clone(&inspector);
            let result = tokio::task::spawn_blocking(move || {
                collect_readings(inspector.as_ref(), &current, at)
            })
            .await;
            match result {
                Ok(Ok(tick)) => {
                    if events.send(MonitorEvent::Tick(tick)).is_err() {
                        break;
                    }
                }
                Ok(Err(err)) => warn!(%err, "sampling tick failed"),
                Err(err) => warn!(%err, "sampling task failed"),
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = targets.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = clock.sleep(interval) => {}
        }
    }
    debug!("sampler worker stopped");
}

/// Scan the process table on the blocking pool and post the result.
pub fn spawn_refresh(
    inspector: Arc<dyn ProcessInspector>,
    metric: MemoryMetric,
    filter: ScanFilter,
    now: f64,
    events: mpsc::UnboundedSender<MonitorEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let event = match registry::scan(inspector.as_ref(), metric, &filter, now) {
            Ok(snapshot) => MonitorEvent::Snapshot(snapshot),
            Err(err) => {
                warn!(%err, "process scan failed");
                MonitorEvent::ScanFailed(err.to_string())
            }
        };
        if events.send(event).is_err() {
            trace!("scan result dropped, receiver gone");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::BYTES_PER_MB;
    use crate::inspect::{InspectError, ProcessEntry};
    use std::collections::HashMap;

    struct FakeInspector {
        entries: Vec<ProcessEntry>,
        memory: HashMap<Pid, Result<u64, InspectError>>,
    }

    impl ProcessInspector for FakeInspector {
        fn list_processes(&self) -> Result<Vec<ProcessEntry>, Error> {
            Ok(self.entries.clone())
        }

        fn read_memory(&self, pid: Pid, _metric: MemoryMetric) -> Result<u64, InspectError> {
            self.memory
                .get(&pid)
                .cloned()
                .unwrap_or(Err(InspectError::NotFound(pid)))
        }
    }

    fn fake() -> FakeInspector {
        let mb = BYTES_PER_MB as u64;
        FakeInspector {
            entries: [(10, "a"), (20, "b")]
                .into_iter()
                .map(|(pid, name)| ProcessEntry {
                    pid,
                    name: name.to_string(),
                    parent_pid: 1,
                })
                .collect(),
            memory: HashMap::from([
                (10, Ok(64 * mb)),
                (20, Err(InspectError::AccessDenied(20))),
            ]),
        }
    }

    #[test]
    fn collect_skips_dead_targets() {
        let targets = SampleTargets {
            pids: vec![10, 20, 30],
            metric: MemoryMetric::Resident,
        };
        let tick = collect_readings(&fake(), &targets, 3.0).unwrap();
        assert_eq!(tick.at, 3.0);
        assert!(tick.live.contains(&10) && tick.live.contains(&20));
        assert!(!tick.live.contains(&30));
        assert_eq!(tick.readings.get(&10), Some(&Ok(64.0)));
        assert_eq!(
            tick.readings.get(&20),
            Some(&Err(InspectError::AccessDenied(20)))
        );
        assert!(!tick.readings.contains_key(&30));
    }

    #[tokio::test]
    async fn sampler_posts_ticks_until_cancelled() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (targets_tx, targets_rx) = watch::channel(SampleTargets {
            pids: vec![10],
            metric: MemoryMetric::Resident,
        });
        let cancel = CancellationToken::new();
        let clock = ManualClock::new(100.0);

        let handle = tokio::spawn(run_sampler(
            Arc::new(fake()),
            Arc::new(clock.clone()),
            Duration::from_millis(500),
            targets_rx,
            events_tx,
            cancel.clone(),
        ));

        let mut stamps = Vec::new();
        while stamps.len() < 3 {
            match events_rx.recv().await {
                Some(MonitorEvent::Tick(tick)) => stamps.push(tick.at),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        cancel.cancel();
        handle.await.unwrap();
        drop(targets_tx);
    }

    #[tokio::test]
    async fn idle_targets_post_nothing() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (targets_tx, targets_rx) = watch::channel(SampleTargets::idle(MemoryMetric::Resident));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_sampler(
            Arc::new(fake()),
            Arc::new(ManualClock::new(0.0)),
            Duration::from_millis(500),
            targets_rx,
            events_tx,
            cancel.clone(),
        ));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(events_rx.try_recv().is_err());

        targets_tx
            .send(SampleTargets {
                pids: vec![10],
                metric: MemoryMetric::Resident,
            })
            .unwrap();
        assert!(matches!(
            events_rx.recv().await,
            Some(MonitorEvent::Tick(_))
        ));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn refresh_posts_snapshot() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        spawn_refresh(
            Arc::new(fake()),
            MemoryMetric::Resident,
            ScanFilter::default(),
            7.0,
            events_tx,
        )
        .await
        .unwrap();

        match events_rx.recv().await {
            Some(MonitorEvent::Snapshot(snapshot)) => {
                assert_eq!(snapshot.taken_at, 7.0);
                let pids: Vec<Pid> = snapshot.records.iter().map(|r| r.pid).collect();
                assert_eq!(pids, vec![10]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
