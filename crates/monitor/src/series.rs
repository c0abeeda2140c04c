#![forbid(unsafe_code)]

use crate::domain::{Pid, Sample};
use std::collections::BTreeMap;

/// Samples of one process, in non-decreasing timestamp order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    name: String,
    samples: Vec<Sample>,
    closed: bool,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// A closed series belongs to a process that left the selection. It
    /// keeps what it has but takes nothing new.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Accept samples again, now on behalf of the process called `name`.
    /// Earlier samples stay.
    pub fn reopen(&mut self, name: &str) {
        if self.name != name {
            self.name = name.to_string();
        }
        self.closed = false;
    }

    /// Drop the oldest samples so that at most `max` remain.
    pub fn keep_last(&mut self, max: usize) {
        let excess = self.samples.len().saturating_sub(max);
        if excess > 0 {
            self.samples.drain(..excess);
        }
    }

    /// Append a sample. Rejected when the series is closed or the sample is
    /// older than the last one.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.closed {
            return false;
        }
        if let Some(last) = self.samples.last()
            && sample.timestamp < last.timestamp
        {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn max_mb(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.memory_mb).reduce(f64::max)
    }

    pub fn min_mb(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.memory_mb).reduce(f64::min)
    }

    /// The sample whose timestamp is closest to `t`. Ties go to the earlier
    /// sample.
    pub fn nearest(&self, t: f64) -> Option<&Sample> {
        let idx = self.samples.partition_point(|s| s.timestamp < t);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let after = self.samples.get(idx);
        match (before, after) {
            (Some(b), Some(a)) => {
                if t - b.timestamp <= a.timestamp - t {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }
}

/// One row of the merged timeline: a distinct timestamp and, per series in
/// [`SeriesSet::recorded`] order, the value of the nearest sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub timestamp: f64,
    pub values: Vec<f64>,
}

impl MergedRow {
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Series for every sampled process, keyed by pid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesSet {
    series: BTreeMap<Pid, Series>,
}

impl SeriesSet {
    /// Get the series for `pid`, creating an empty one named `name` if
    /// absent. A closed series is reopened under `name`, since the pid is
    /// being sampled again and may now belong to a different process.
    pub fn open(&mut self, pid: Pid, name: &str) -> &mut Series {
        let series = self
            .series
            .entry(pid)
            .or_insert_with(|| Series::new(name));
        if series.is_closed() {
            series.reopen(name);
        }
        series
    }

    pub fn get(&self, pid: Pid) -> Option<&Series> {
        self.series.get(&pid)
    }

    pub fn close(&mut self, pid: Pid) {
        if let Some(series) = self.series.get_mut(&pid) {
            series.close();
        }
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pid, &Series)> {
        self.series.iter().map(|(pid, series)| (*pid, series))
    }

    /// Series that hold at least one sample, ordered by pid.
    pub fn recorded(&self) -> impl Iterator<Item = (Pid, &Series)> {
        self.iter().filter(|(_, series)| !series.is_empty())
    }

    /// `true` when no series holds a sample.
    pub fn is_empty(&self) -> bool {
        self.recorded().next().is_none()
    }

    pub fn sample_count(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    pub fn earliest(&self) -> Option<f64> {
        self.recorded()
            .filter_map(|(_, s)| s.first())
            .map(|s| s.timestamp)
            .reduce(f64::min)
    }

    pub fn latest(&self) -> Option<f64> {
        self.recorded()
            .filter_map(|(_, s)| s.last())
            .map(|s| s.timestamp)
            .reduce(f64::max)
    }

    /// Every distinct timestamp across all series, ascending.
    pub fn timeline(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .recorded()
            .flat_map(|(_, s)| s.samples().iter().map(|sample| sample.timestamp))
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// Align all series on the merged timeline using nearest-sample matching.
    pub fn merged_rows(&self) -> Vec<MergedRow> {
        let recorded: Vec<&Series> = self.recorded().map(|(_, s)| s).collect();
        self.timeline()
            .into_iter()
            .map(|timestamp| MergedRow {
                timestamp,
                values: recorded
                    .iter()
                    .filter_map(|series| series.nearest(timestamp))
                    .map(|sample| sample.memory_mb)
                    .collect(),
            })
            .collect()
    }
}
