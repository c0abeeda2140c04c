#![forbid(unsafe_code)]

use crate::domain::{Pid, Sample};
use crate::error::Error;
use crate::inspect::InspectError;
use crate::selection::Selection;
use crate::series::SeriesSet;
use config::MemoryMetric;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Samples kept per process while monitoring outside a recording.
pub const LIVE_WINDOW: usize = 1200;

/// Everything one sampling tick observed, measured off the owning thread.
#[derive(Debug, Clone, Default)]
pub struct TickReadings {
    /// Wall-clock seconds at which the tick started.
    pub at: f64,
    /// Metric the readings were taken with.
    pub metric: MemoryMetric,
    /// Pids alive at `at`.
    pub live: FxHashSet<Pid>,
    /// Memory in MB, or why it could not be read, per targeted pid.
    pub readings: BTreeMap<Pid, Result<f64, InspectError>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Number of samples appended to series.
    pub appended: usize,
    /// Pids dropped from the selection during this tick.
    pub pruned: Vec<Pid>,
    /// Sum of the latest readings of the still-selected pids.
    pub total_mb: f64,
    /// The selection ran empty and the sampler stopped itself.
    pub exhausted: bool,
}

/// Periodic memory sampling over the selected processes.
///
/// The sampler owns the selection and the live series buffers. It does no
/// I/O: the worker measures, [`Sampler::apply_tick`] folds the measurements
/// in.
#[derive(Debug, Default)]
pub struct Sampler {
    selection: Selection,
    enabled: bool,
    series: SeriesSet,
    latest: BTreeMap<Pid, f64>,
    capture_from: f64,
    /// Series are a rolling window of [`LIVE_WINDOW`] samples rather than a
    /// recording.
    rolling: bool,
}

impl Sampler {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Begin sampling the current selection with an empty series per pid.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        self.series.clear();
        for (pid, name) in self.selection.iter() {
            self.series.open(pid, name);
        }
        self.capture_from = f64::NEG_INFINITY;
        self.rolling = true;
        self.enabled = true;
        debug!(targets = self.selection.len(), "sampler started");
        Ok(())
    }

    /// Re-enable sampling without discarding the series collected so far.
    pub fn resume(&mut self) -> Result<(), Error> {
        if self.selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        for (pid, name) in self.selection.iter() {
            self.series.open(pid, name);
        }
        self.enabled = true;
        debug!(targets = self.selection.len(), "sampler resumed");
        Ok(())
    }

    /// Stop sampling. Calling it on a stopped sampler changes nothing.
    pub fn stop(&mut self) {
        if self.enabled {
            debug!("sampler stopped");
        }
        self.enabled = false;
    }

    /// Pids the next tick should measure.
    pub fn targets(&self) -> Vec<Pid> {
        self.selection.pids().collect()
    }

    pub fn series(&self) -> &SeriesSet {
        &self.series
    }

    pub fn latest(&self, pid: Pid) -> Option<f64> {
        self.latest.get(&pid).copied()
    }

    /// Record an out-of-band reading (e.g. from a registry scan) as the
    /// latest value for `pid` without appending a sample.
    pub fn note_reading(&mut self, pid: Pid, memory_mb: f64) {
        if self.selection.contains(pid) {
            self.latest.insert(pid, memory_mb);
        }
    }

    /// Drop every latest reading, e.g. after the metric changed.
    pub fn forget_readings(&mut self) {
        self.latest.clear();
    }

    /// Sum of the latest readings among still-selected pids.
    pub fn total_mb(&self) -> f64 {
        self.selection
            .pids()
            .filter_map(|pid| self.latest.get(&pid))
            .sum()
    }

    /// Discard all series and start fresh ones at `from`, seeding each
    /// selected pid with a baseline sample from `baseline` when available.
    /// Readings older than `from` are ignored afterwards.
    pub fn restart_series(&mut self, from: f64, baseline: impl Fn(Pid) -> Option<f64>) {
        self.series.clear();
        self.capture_from = from;
        self.rolling = false;
        for (pid, name) in self.selection.iter() {
            let series = self.series.open(pid, name);
            let value = self.latest.get(&pid).copied().or_else(|| baseline(pid));
            if let Some(memory_mb) = value {
                series.push(Sample::new(pid, from, memory_mb));
            }
        }
    }

    /// Hand over the current series, leaving fresh empty ones behind for the
    /// still-selected pids. Those keep a rolling window only.
    pub fn take_series(&mut self) -> SeriesSet {
        let taken = std::mem::take(&mut self.series);
        self.rolling = true;
        for (pid, name) in self.selection.iter() {
            self.series.open(pid, name);
        }
        taken
    }

    /// Remove pids that are no longer alive from the selection, closing
    /// their series.
    pub fn prune(&mut self, is_live: impl FnMut(Pid) -> bool) -> Vec<Pid> {
        let removed = self.selection.retain_live(is_live);
        for pid in &removed {
            self.latest.remove(pid);
            self.series.close(*pid);
        }
        removed
    }

    /// Fold one tick of readings into the sampler state.
    pub fn apply_tick(&mut self, tick: &TickReadings) -> TickOutcome {
        if !self.enabled {
            trace!(at = tick.at, "dropping tick while stopped");
            return TickOutcome {
                total_mb: self.total_mb(),
                ..TickOutcome::default()
            };
        }

        let mut outcome = TickOutcome::default();
        let mut dead = FxHashSet::default();
        let capture = tick.at >= self.capture_from;

        for (pid, name) in self.selection.iter() {
            if !tick.live.contains(&pid) {
                dead.insert(pid);
                continue;
            }
            match tick.readings.get(&pid) {
                Some(Ok(memory_mb)) => {
                    self.latest.insert(pid, *memory_mb);
                    if !capture {
                        continue;
                    }
                    let series = self.series.open(pid, name);
                    if series.push(Sample::new(pid, tick.at, *memory_mb)) {
                        outcome.appended += 1;
                    }
                    if self.rolling {
                        series.keep_last(LIVE_WINDOW);
                    }
                }
                Some(Err(err)) => {
                    trace!(pid, %err, "process unreadable, dropping from selection");
                    dead.insert(pid);
                }
                // Selected after this tick's targets were taken.
                None => {}
            }
        }

        outcome.pruned = self.prune(|pid| !dead.contains(&pid));
        outcome.total_mb = self.total_mb();

        if self.selection.is_empty() {
            self.enabled = false;
            outcome.exhausted = true;
            debug!("all sampled processes ended, sampler stopped");
        }

        trace!(
            at = tick.at,
            appended = outcome.appended,
            pruned = outcome.pruned.len(),
            total_mb = outcome.total_mb,
            "tick applied"
        );
        outcome
    }
}
