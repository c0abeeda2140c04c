#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::controller::{Controller, Notice};
use crate::domain::Pid;
use crate::error::Error;
use crate::inspect::{ProcessInspector, ProcfsInspector};
use crate::registry;
use crate::worker::{self, MonitorEvent, SampleTargets};
use config::{Config, MemoryMetric};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A user request, applied by [`Monitor::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    SetFilter(String),
    ToggleSelect(Pid),
    SelectVisible,
    DeselectVisible,
    CleanSelection,
    SetMetric(MemoryMetric),
    CycleMetric,
    StartMonitoring,
    StopMonitoring,
    StartRecording(String),
    StopRecording,
    Export,
    Sync,
}

struct SamplerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The controller plus the background tasks feeding it.
///
/// Must be created and driven inside a tokio runtime. Whoever owns the
/// `Monitor` applies commands and events one at a time; background tasks only
/// talk back through the event channel.
pub struct Monitor {
    controller: Controller,
    inspector: Arc<dyn ProcessInspector>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::UnboundedSender<MonitorEvent>,
    events_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    targets_tx: watch::Sender<SampleTargets>,
    sampler: Option<SamplerTask>,
}

impl Monitor {
    pub fn new(
        config: Config,
        inspector: Arc<dyn ProcessInspector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let controller = Controller::new(config);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (targets_tx, _) = watch::channel(controller.sample_targets());
        Self {
            controller,
            inspector,
            clock,
            events_tx,
            events_rx,
            targets_tx,
            sampler: None,
        }
    }

    /// A monitor reading the live system through procfs.
    pub fn system(config: Config) -> Self {
        Self::new(config, Arc::new(ProcfsInspector), Arc::new(SystemClock))
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_some()
    }

    /// Apply `command`. A failure is also posted as an error notice.
    pub async fn dispatch(&mut self, command: Command) -> Result<(), Error> {
        debug!(?command, "dispatch");
        let result = self.apply_command(command).await;
        if let Err(err) = &result {
            self.controller.notify(Notice::error(err.to_string()));
        }
        self.reconcile();
        result
    }

    async fn apply_command(&mut self, command: Command) -> Result<(), Error> {
        let now = self.clock.now();
        match command {
            Command::Refresh => self.controller.request_refresh(),
            Command::SetFilter(keyword) => self.controller.set_filter(&keyword),
            Command::ToggleSelect(pid) => {
                self.controller.toggle(pid)?;
            }
            Command::SelectVisible => self.controller.select_visible(),
            Command::DeselectVisible => self.controller.deselect_visible(),
            Command::CleanSelection => {
                let inspector = Arc::clone(&self.inspector);
                let live = tokio::task::spawn_blocking(move || inspector.live_pids()).await??;
                self.controller.clean_selection(&live);
            }
            Command::SetMetric(metric) => self.controller.set_metric(metric),
            Command::CycleMetric => self.controller.cycle_metric(),
            Command::StartMonitoring => self.controller.start_monitoring()?,
            Command::StopMonitoring => self.controller.stop_monitoring(),
            Command::StartRecording(name) => self.controller.start_recording(&name, now)?,
            Command::StopRecording => self.controller.stop_recording(now)?,
            Command::Export => {
                self.controller.export(now)?;
            }
            Command::Sync => self.controller.sync(),
        }
        Ok(())
    }

    /// Scan the process table and apply the result before returning.
    pub async fn refresh_now(&mut self) -> Result<(), Error> {
        let inspector = Arc::clone(&self.inspector);
        let metric = self.controller.metric();
        let filter = self.controller.scan_filter();
        let now = self.clock.now();
        let snapshot = tokio::task::spawn_blocking(move || {
            registry::scan(inspector.as_ref(), metric, &filter, now)
        })
        .await??;
        self.controller.take_refresh_request();
        self.controller.apply_snapshot(snapshot);
        self.reconcile();
        Ok(())
    }

    /// Apply every event already waiting. Returns how many were applied.
    pub fn poll_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        if applied > 0 {
            self.reconcile();
        }
        applied
    }

    /// Wait for the next event and apply it.
    pub async fn next_event(&mut self) {
        // The monitor holds a sender itself, so the channel never closes.
        if let Some(event) = self.events_rx.recv().await {
            self.apply_event(event);
            self.reconcile();
        }
    }

    fn apply_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Snapshot(snapshot) => self.controller.apply_snapshot(snapshot),
            MonitorEvent::Tick(tick) => {
                self.controller.apply_tick(&tick);
            }
            MonitorEvent::ScanFailed(reason) => self.controller.scan_failed(&reason),
        }
    }

    /// Bring background work in line with the controller: start a scan if one
    /// was requested, publish the sampling targets, and start or stop the
    /// sampling task.
    fn reconcile(&mut self) {
        if self.controller.take_refresh_request() {
            worker::spawn_refresh(
                Arc::clone(&self.inspector),
                self.controller.metric(),
                self.controller.scan_filter(),
                self.clock.now(),
                self.events_tx.clone(),
            );
        }

        let targets = self.controller.sample_targets();
        let idle = targets.is_idle();
        self.targets_tx.send_if_modified(|current| {
            if *current == targets {
                false
            } else {
                *current = targets;
                true
            }
        });

        match (self.sampler.is_some(), idle) {
            (false, false) => self.start_sampler(),
            (true, true) => self.stop_sampler(),
            _ => {}
        }
    }

    fn start_sampler(&mut self) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker::run_sampler(
            Arc::clone(&self.inspector),
            Arc::clone(&self.clock),
            self.controller.config().sampling.interval_ms,
            self.targets_tx.subscribe(),
            self.events_tx.clone(),
            cancel.clone(),
        ));
        self.sampler = Some(SamplerTask { cancel, handle });
    }

    fn stop_sampler(&mut self) {
        if let Some(task) = self.sampler.take() {
            task.cancel.cancel();
        }
    }

    /// Stop background sampling and wait for the task to end.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        if let Some(task) = self.sampler.take() {
            task.cancel.cancel();
            task.handle.await?;
        }
        info!("monitor shut down");
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop_sampler();
    }
}
