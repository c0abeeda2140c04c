#![forbid(unsafe_code)]

use crate::chart::ChartModel;
use crate::clock::to_local;
use crate::domain::{Liveness, Pid, ProcessRecord};
use crate::error::Error;
use crate::export;
use crate::registry::{ProcessRegistry, RegistrySnapshot, ScanFilter};
use crate::sampler::{Sampler, TickOutcome, TickReadings};
use crate::session::{RecordingSession, SessionState};
use crate::worker::SampleTargets;
use config::{Config, MemoryMetric};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_NOTICES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A message for the user, newest last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// One line of the selected-processes summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedProcess {
    pub pid: Pid,
    pub name: String,
    pub memory_mb: Option<f64>,
    pub liveness: Liveness,
}

/// Single owner of the registry, the sampler and the recording session.
///
/// Every mutation happens here, one call at a time, on the thread that owns
/// the controller. Background work only ever reaches it as an immutable
/// [`RegistrySnapshot`] or [`TickReadings`].
#[derive(Debug)]
pub struct Controller {
    config: Config,
    metric: MemoryMetric,
    filter: String,
    registry: ProcessRegistry,
    sampler: Sampler,
    session: RecordingSession,
    notices: VecDeque<Notice>,
    last_export: Option<PathBuf>,
    refresh_requested: bool,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        let metric = config.sampling.metric;
        Self {
            config,
            metric,
            filter: String::new(),
            registry: ProcessRegistry::default(),
            sampler: Sampler::default(),
            session: RecordingSession::default(),
            notices: VecDeque::new(),
            last_export: None,
            refresh_requested: true,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metric(&self) -> MemoryMetric {
        self.metric
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter::new(&self.config.registry)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn filter_keyword(&self) -> &str {
        &self.filter
    }

    pub fn last_export(&self) -> Option<&Path> {
        self.last_export.as_deref()
    }

    /// Registry rows matching the current filter keyword, ordered by pid.
    pub fn visible(&self) -> Vec<&ProcessRecord> {
        self.registry.filter(&self.filter)
    }

    pub fn is_selected(&self, pid: Pid) -> bool {
        self.sampler.selection().contains(pid)
    }

    pub fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => debug!(message = %notice.message, "notice"),
            NoticeLevel::Warn | NoticeLevel::Error => warn!(message = %notice.message, "notice"),
        }
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Whether a registry scan was asked for since the last call.
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    pub fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }

    /// What the sampling worker should measure. Empty while sampling is off.
    pub fn sample_targets(&self) -> SampleTargets {
        if !self.sampler.is_enabled() {
            return SampleTargets::idle(self.metric);
        }
        SampleTargets {
            pids: self.sampler.targets(),
            metric: self.metric,
        }
    }

    pub fn set_filter(&mut self, keyword: &str) {
        self.filter = keyword.to_string();
    }

    /// Switch the metric. Triggers a full refresh; samples already recorded
    /// keep the metric they were taken with.
    pub fn set_metric(&mut self, metric: MemoryMetric) {
        if metric == self.metric {
            return;
        }
        info!(from = %self.metric, to = %metric, "memory metric changed");
        self.metric = metric;
        self.sampler.forget_readings();
        self.refresh_requested = true;
        self.notify(Notice::info(format!("memory metric: {metric}")));
    }

    pub fn cycle_metric(&mut self) {
        self.set_metric(self.metric.next());
    }

    /// Toggle one process in or out of the selection.
    pub fn toggle(&mut self, pid: Pid) -> Result<bool, Error> {
        let record = self
            .registry
            .get(pid)
            .filter(|record| record.is_running())
            .ok_or(Error::UnknownProcess(pid))?;
        Ok(self.sampler.selection_mut().toggle(record))
    }

    /// Select every running process matching the filter.
    pub fn select_visible(&mut self) {
        let keyword = self.filter.clone();
        let visible = self
            .registry
            .filter(&keyword)
            .into_iter()
            .filter(|record| record.is_running());
        self.sampler.selection_mut().select_all(visible);
    }

    /// Deselect every process matching the filter.
    pub fn deselect_visible(&mut self) {
        let visible = self.registry.filter(&self.filter);
        self.sampler.selection_mut().deselect_all(visible);
    }

    /// Drop selected pids that are no longer in `live`. Returns whether
    /// anything was removed.
    pub fn clean_selection(&mut self, live: &FxHashSet<Pid>) -> bool {
        let removed = self.sampler.prune(|pid| live.contains(&pid));
        for pid in &removed {
            self.registry.mark_terminated(*pid);
        }
        self.stop_if_exhausted();
        if removed.is_empty() {
            self.notify(Notice::info("no ended processes in the selection"));
            false
        } else {
            self.notify(Notice::info(format!(
                "removed {} ended process(es) from the selection",
                removed.len()
            )));
            true
        }
    }

    pub fn start_monitoring(&mut self) -> Result<(), Error> {
        if self.sampler.is_enabled() {
            return Ok(());
        }
        self.prune_to_registry();
        if self.session.is_recording() {
            self.sampler.resume()?;
        } else {
            self.sampler.start()?;
        }
        self.notify(Notice::info(format!(
            "monitoring {} process(es)",
            self.sampler.selection().len()
        )));
        Ok(())
    }

    pub fn stop_monitoring(&mut self) {
        if !self.sampler.is_enabled() {
            return;
        }
        self.sampler.stop();
        self.notify(Notice::info("monitoring stopped"));
    }

    /// Open a recording window at `now` over the current selection.
    ///
    /// Each selected process gets a baseline sample at `now` from its latest
    /// reading, or from the registry when it has not been sampled yet.
    pub fn start_recording(&mut self, name: &str, now: f64) -> Result<(), Error> {
        if self.session.is_recording() {
            return Err(Error::AlreadyRecording);
        }
        self.prune_to_registry();
        if self.sampler.selection().is_empty() {
            return Err(Error::EmptySelection);
        }
        self.session.begin(name, now)?;
        if !self.sampler.is_enabled() {
            self.sampler.start()?;
        }
        let registry = &self.registry;
        self.sampler.restart_series(now, |pid| {
            registry
                .get(pid)
                .filter(|record| record.is_running())
                .map(|record| record.memory_mb)
        });
        let message = format!("recording \"{}\"", self.session.name());
        self.notify(Notice::info(message));
        Ok(())
    }

    /// Seal the recording window at `now`. Monitoring keeps running.
    pub fn stop_recording(&mut self, now: f64) -> Result<(), Error> {
        if !self.session.is_recording() {
            return Err(Error::NotRecording);
        }
        let capture = self.sampler.take_series();
        let stats = self.session.seal(now, capture)?;
        let message = format!(
            "recording stopped after {:.2} s, total change {:+.2} MB",
            stats.duration_secs, stats.change_mb
        );
        self.notify(Notice::info(message));
        Ok(())
    }

    /// Write the sealed recording as CSV into the configured directory.
    pub fn export(&mut self, now: f64) -> Result<PathBuf, Error> {
        let at = to_local(now);
        let path = export::export_session(&self.session, &self.config.export.directory, &at)?;
        self.notify(Notice::info(format!("exported {}", path.display())));
        self.last_export = Some(path.clone());
        Ok(path)
    }

    /// Push the latest sampled readings into the process table now instead
    /// of waiting for the next refresh.
    pub fn sync(&mut self) {
        let readings: Vec<(Pid, f64)> = self
            .sampler
            .selection()
            .pids()
            .filter_map(|pid| Some((pid, self.sampler.latest(pid)?)))
            .collect();
        for (pid, memory_mb) in &readings {
            self.registry.update_memory(*pid, *memory_mb);
        }
        self.notify(Notice::info(format!(
            "synced {} reading(s); compare with the system monitor now",
            readings.len()
        )));
    }

    /// Replace the process table with `snapshot` and prune the selection to
    /// it. Snapshots read with a metric other than the current one are stale
    /// and dropped.
    pub fn apply_snapshot(&mut self, snapshot: RegistrySnapshot) {
        if snapshot.metric != self.metric {
            debug!(
                snapshot = %snapshot.metric,
                current = %self.metric,
                "dropping snapshot taken with a previous metric"
            );
            return;
        }
        self.registry.apply(snapshot);
        let removed = self.prune_to_registry();
        if !removed.is_empty() {
            debug!(?removed, "selected processes gone after refresh");
        }
        if !self.sampler.is_enabled() {
            let readings: Vec<(Pid, f64)> = self
                .registry
                .records()
                .map(|record| (record.pid, record.memory_mb))
                .collect();
            for (pid, memory_mb) in readings {
                self.sampler.note_reading(pid, memory_mb);
            }
        }
        debug!(processes = self.registry.len(), "process table refreshed");
    }

    pub fn scan_failed(&mut self, reason: &str) {
        self.notify(Notice::error(format!("process scan failed: {reason}")));
    }

    /// Fold one sampling tick in.
    pub fn apply_tick(&mut self, tick: &TickReadings) -> TickOutcome {
        if tick.metric != self.metric {
            debug!(at = tick.at, "dropping tick read with a previous metric");
            return TickOutcome {
                total_mb: self.sampler.total_mb(),
                ..TickOutcome::default()
            };
        }
        let outcome = self.sampler.apply_tick(tick);
        for pid in &outcome.pruned {
            self.registry.mark_terminated(*pid);
        }
        if !outcome.pruned.is_empty() && !outcome.exhausted {
            let names: Vec<String> = outcome.pruned.iter().map(ToString::to_string).collect();
            self.notify(Notice::warn(format!(
                "process(es) ended: {}",
                names.join(", ")
            )));
        }
        if outcome.exhausted {
            self.notify(Notice::warn(Error::AllSelectedProcessesTerminated.to_string()));
        }
        outcome
    }

    /// Aggregate memory of the still-running selection.
    pub fn total_mb(&self) -> f64 {
        self.sampler.total_mb()
    }

    /// Selected processes plus those that ended since the last refresh.
    pub fn selected_summary(&self) -> Vec<SelectedProcess> {
        let mut summary: Vec<SelectedProcess> = self
            .sampler
            .selection()
            .iter()
            .map(|(pid, name)| SelectedProcess {
                pid,
                name: name.to_string(),
                memory_mb: self
                    .sampler
                    .latest(pid)
                    .or_else(|| self.registry.get(pid).map(|record| record.memory_mb)),
                liveness: Liveness::Running,
            })
            .collect();
        summary.extend(
            self.registry
                .records()
                .filter(|record| !record.is_running())
                .map(|record| SelectedProcess {
                    pid: record.pid,
                    name: record.name.clone(),
                    memory_mb: None,
                    liveness: Liveness::Terminated,
                }),
        );
        summary.sort_by_key(|entry| entry.pid);
        summary
    }

    /// The chart for whatever is most relevant: the sealed recording once
    /// stopped, the live series otherwise.
    pub fn chart(&self) -> Option<ChartModel> {
        match self.session.state() {
            SessionState::Stopped => {
                let title = format!("{} (recorded)", self.session.name());
                ChartModel::build(self.session.capture()?, &title)
            }
            SessionState::Recording => {
                let title = format!("{} (recording)", self.session.name());
                ChartModel::build(self.sampler.series(), &title)
            }
            SessionState::Idle => ChartModel::build(self.sampler.series(), "live"),
        }
    }

    fn prune_to_registry(&mut self) -> Vec<Pid> {
        let registry = &self.registry;
        let removed = self.sampler.prune(|pid| registry.is_running(pid));
        self.stop_if_exhausted();
        removed
    }

    fn stop_if_exhausted(&mut self) {
        if self.sampler.is_enabled() && self.sampler.selection().is_empty() {
            self.sampler.stop();
            self.notify(Notice::warn(Error::AllSelectedProcessesTerminated.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::InspectError;
    use crate::session::SessionState;

    fn record(pid: Pid, name: &str, memory_mb: f64) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            parent_pid: 1,
            memory_mb,
            liveness: Liveness::Running,
            refreshed_at: 0.0,
        }
    }

    fn snapshot(records: Vec<ProcessRecord>) -> RegistrySnapshot {
        RegistrySnapshot {
            taken_at: 0.0,
            metric: MemoryMetric::Resident,
            records,
        }
    }

    fn tick(at: f64, readings: Vec<(Pid, Result<f64, InspectError>)>) -> TickReadings {
        TickReadings {
            at,
            metric: MemoryMetric::Resident,
            live: readings.iter().map(|(pid, _)| *pid).collect(),
            readings: readings.into_iter().collect(),
        }
    }

    fn controller() -> Controller {
        let mut controller = Controller::new(Config::default());
        controller.apply_snapshot(snapshot(vec![
            record(100, "app", 50.0),
            record(200, "helper", 20.0),
            record(300, "shell", 5.0),
        ]));
        controller
    }

    #[test]
    fn recording_needs_selection_before_name() {
        let mut controller = controller();
        assert!(matches!(
            controller.start_recording("", 1.0),
            Err(Error::EmptySelection)
        ));
        controller.toggle(100).unwrap();
        assert!(matches!(
            controller.start_recording("  ", 1.0),
            Err(Error::MissingOperationName)
        ));
        assert_eq!(controller.session().state(), SessionState::Idle);
        assert!(!controller.sampler().is_enabled());
    }

    #[test]
    fn immediate_stop_has_no_change() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.toggle(200).unwrap();
        controller.start_recording("open dialog", 10.0).unwrap();
        assert!(controller.sampler().is_enabled());
        controller.stop_recording(10.0).unwrap();

        let stats = controller.session().stats().unwrap();
        assert_eq!(stats.duration_secs, 0.0);
        assert_eq!(stats.change_mb, 0.0);
        assert_eq!(stats.start_total_mb, 70.0);
        assert!(controller.sampler().is_enabled());
    }

    #[test]
    fn reselected_pid_keeps_recording_under_current_name() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.toggle(200).unwrap();
        controller.start_recording("op", 1.0).unwrap();

        controller.apply_tick(&tick(
            1.5,
            vec![(100, Ok(51.0)), (200, Err(InspectError::AccessDenied(200)))],
        ));
        assert!(!controller.is_selected(200));

        // The pid shows up again, now owned by another program.
        controller.apply_snapshot(snapshot(vec![
            record(100, "app", 51.0),
            record(200, "worker", 25.0),
        ]));
        assert!(controller.toggle(200).unwrap());
        controller.apply_tick(&tick(2.0, vec![(100, Ok(51.0)), (200, Ok(26.0))]));
        controller.apply_tick(&tick(2.5, vec![(100, Ok(51.0)), (200, Ok(27.0))]));
        controller.stop_recording(3.0).unwrap();

        let capture = controller.session().capture().unwrap();
        let series = capture.get(200).unwrap();
        assert_eq!(series.name(), "worker");
        let values: Vec<f64> = series.samples().iter().map(|s| s.memory_mb).collect();
        assert_eq!(values, vec![20.0, 26.0, 27.0]);
        assert_eq!(controller.session().stats().unwrap().end_total_mb, 78.0);

        let mut out = Vec::new();
        crate::export::write_csv(&mut out, capture).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with("worker(pid=200)"));
    }

    #[test]
    fn stop_without_recording_fails() {
        let mut controller = controller();
        assert!(matches!(
            controller.stop_recording(1.0),
            Err(Error::NotRecording)
        ));
    }

    #[test]
    fn second_start_while_recording_is_rejected() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.start_recording("a", 1.0).unwrap();
        assert!(matches!(
            controller.start_recording("b", 2.0),
            Err(Error::AlreadyRecording)
        ));
        assert_eq!(controller.session().name(), "a");
    }

    #[test]
    fn restart_discards_previous_recording() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.start_recording("first", 1.0).unwrap();
        controller.apply_tick(&tick(1.5, vec![(100, Ok(60.0))]));
        controller.stop_recording(2.0).unwrap();

        controller.start_recording("second", 5.0).unwrap();
        controller.apply_tick(&tick(5.5, vec![(100, Ok(61.0))]));
        let series = controller.sampler().series().get(100).unwrap();
        assert_eq!(series.first().unwrap().timestamp, 5.0);
        assert_eq!(series.first().unwrap().memory_mb, 60.0);
        assert!(series.samples().iter().all(|s| s.timestamp >= 5.0));
        assert_eq!(controller.session().state(), SessionState::Recording);
        assert!(controller.session().capture().is_none());
    }

    #[test]
    fn access_denied_exhausts_sampler() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.start_monitoring().unwrap();

        controller.apply_tick(&tick(1.0, vec![(100, Ok(50.0))]));
        let outcome =
            controller.apply_tick(&tick(1.5, vec![(100, Err(InspectError::AccessDenied(100)))]));

        assert!(outcome.exhausted);
        assert_eq!(outcome.pruned, vec![100]);
        assert_eq!(controller.total_mb(), 0.0);
        assert!(!controller.sampler().is_enabled());
        assert_eq!(
            controller.registry().get(100).unwrap().liveness,
            Liveness::Terminated
        );
        let notice = controller.latest_notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warn);
        assert_eq!(
            notice.message,
            Error::AllSelectedProcessesTerminated.to_string()
        );
    }

    #[test]
    fn snapshot_prunes_missing_selection() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.toggle(200).unwrap();
        controller.apply_snapshot(snapshot(vec![record(100, "app", 51.0)]));
        assert!(controller.is_selected(100));
        assert!(!controller.is_selected(200));
    }

    #[test]
    fn stale_metric_snapshot_is_ignored() {
        let mut controller = controller();
        controller.take_refresh_request();
        controller.set_metric(MemoryMetric::Virtual);
        assert!(controller.take_refresh_request());

        controller.apply_snapshot(snapshot(vec![record(999, "late", 1.0)]));
        assert!(controller.registry().get(999).is_none());
        assert_eq!(controller.registry().len(), 3);
    }

    #[test]
    fn toggle_unknown_pid_fails() {
        let mut controller = controller();
        assert!(matches!(
            controller.toggle(42),
            Err(Error::UnknownProcess(42))
        ));
    }

    #[test]
    fn select_visible_follows_filter() {
        let mut controller = controller();
        controller.set_filter("HEL");
        controller.select_visible();
        assert_eq!(controller.sampler().targets(), vec![200]);

        controller.set_filter("");
        controller.select_visible();
        assert_eq!(controller.sampler().selection().len(), 3);

        controller.set_filter("app");
        controller.deselect_visible();
        assert_eq!(controller.sampler().targets(), vec![200, 300]);
    }

    #[test]
    fn clean_selection_reports_removals() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.toggle(200).unwrap();

        let live: FxHashSet<Pid> = [100].into_iter().collect();
        assert!(controller.clean_selection(&live));
        assert_eq!(controller.sampler().targets(), vec![100]);
        assert!(!controller.clean_selection(&live));
    }

    #[test]
    fn summary_lists_ended_processes() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.toggle(200).unwrap();
        controller.start_monitoring().unwrap();
        controller.apply_tick(&tick(1.0, vec![(100, Ok(55.0))]));

        let summary = controller.selected_summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].memory_mb, Some(55.0));
        assert_eq!(summary[1].pid, 200);
        assert_eq!(summary[1].liveness, Liveness::Terminated);
        assert_eq!(controller.total_mb(), 55.0);
    }

    #[test]
    fn sync_copies_latest_readings_into_table() {
        let mut controller = controller();
        controller.toggle(100).unwrap();
        controller.start_monitoring().unwrap();
        controller.apply_tick(&tick(1.0, vec![(100, Ok(75.0))]));
        assert_eq!(controller.registry().get(100).unwrap().memory_mb, 50.0);

        controller.sync();
        assert_eq!(controller.registry().get(100).unwrap().memory_mb, 75.0);
    }

    #[test]
    fn export_writes_sealed_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.export.directory = dir.path().to_path_buf();
        let mut controller = Controller::new(config);
        controller.apply_snapshot(snapshot(vec![record(100, "app", 50.0)]));

        assert!(matches!(
            controller.export(1.0),
            Err(Error::NoSealedSession)
        ));

        controller.toggle(100).unwrap();
        controller.start_recording("load", 1.0).unwrap();
        controller.apply_tick(&tick(1.5, vec![(100, Ok(52.0))]));
        controller.stop_recording(2.0).unwrap();

        let path = controller.export(2.0).unwrap();
        assert!(path.exists());
        assert_eq!(controller.last_export(), Some(path.as_path()));
    }

    #[test]
    fn notices_are_bounded() {
        let mut controller = Controller::new(Config::default());
        for i in 0..(MAX_NOTICES + 5) {
            controller.notify(Notice::info(format!("n{i}")));
        }
        assert_eq!(controller.notices().count(), MAX_NOTICES);
        assert_eq!(
            controller.latest_notice().unwrap().message,
            format!("n{}", MAX_NOTICES + 4)
        );
    }
}
