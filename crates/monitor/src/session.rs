#![forbid(unsafe_code)]

use crate::domain::Pid;
use crate::error::Error;
use crate::series::SeriesSet;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

/// Per-process figures over the recording window.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    pub pid: Pid,
    pub name: String,
    pub first_mb: f64,
    pub last_mb: f64,
    pub max_mb: f64,
    pub min_mb: f64,
    pub samples: usize,
}

impl ProcessStats {
    pub fn change_mb(&self) -> f64 {
        self.last_mb - self.first_mb
    }

    pub fn max_change_mb(&self) -> f64 {
        self.max_mb - self.first_mb
    }
}

/// Summary computed when a recording is sealed.
///
/// Both totals use each process's last known reading, including processes
/// that ended during the window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionStats {
    pub start_total_mb: f64,
    pub end_total_mb: f64,
    pub change_mb: f64,
    pub max_change_mb: f64,
    pub duration_secs: f64,
    pub processes: Vec<ProcessStats>,
}

impl SessionStats {
    pub fn compute(capture: &SeriesSet, start_time: f64, end_time: f64) -> Self {
        let processes: Vec<ProcessStats> = capture
            .recorded()
            .filter_map(|(pid, series)| {
                Some(ProcessStats {
                    pid,
                    name: series.name().to_string(),
                    first_mb: series.first()?.memory_mb,
                    last_mb: series.last()?.memory_mb,
                    max_mb: series.max_mb()?,
                    min_mb: series.min_mb()?,
                    samples: series.len(),
                })
            })
            .collect();

        let start_total_mb = processes.iter().map(|p| p.first_mb).sum();
        let end_total_mb = processes.iter().map(|p| p.last_mb).sum();
        let max_change_mb = processes.iter().map(ProcessStats::max_change_mb).sum();

        Self {
            start_total_mb,
            end_total_mb,
            change_mb: end_total_mb - start_total_mb,
            max_change_mb,
            duration_secs: (end_time - start_time).max(0.0),
            processes,
        }
    }
}

/// The recording window: idle → recording → stopped, and back to recording
/// on a fresh start.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    name: String,
    start_time: f64,
    end_time: Option<f64>,
    state: SessionState,
    capture: SeriesSet,
    stats: Option<SessionStats>,
}

impl RecordingSession {
    /// Enter `Recording`, discarding whatever the previous session held.
    ///
    /// Only the name is validated here; selection checks belong to the
    /// caller, which owns the sampler.
    pub fn begin(&mut self, name: &str, now: f64) -> Result<(), Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingOperationName);
        }
        *self = Self {
            name: name.to_string(),
            start_time: now,
            end_time: None,
            state: SessionState::Recording,
            capture: SeriesSet::default(),
            stats: None,
        };
        info!(operation = %self.name, start_time = now, "recording started");
        Ok(())
    }

    /// Seal the window with `capture` as its data and compute statistics.
    pub fn seal(&mut self, now: f64, capture: SeriesSet) -> Result<&SessionStats, Error> {
        if self.state != SessionState::Recording {
            return Err(Error::NotRecording);
        }
        let end_time = now.max(self.start_time);
        let stats = SessionStats::compute(&capture, self.start_time, end_time);
        info!(
            operation = %self.name,
            duration = stats.duration_secs,
            change_mb = stats.change_mb,
            "recording stopped"
        );
        self.end_time = Some(end_time);
        self.capture = capture;
        self.state = SessionState::Stopped;
        Ok(self.stats.insert(stats))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time(&self) -> Option<f64> {
        (self.state != SessionState::Idle).then_some(self.start_time)
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn stats(&self) -> Option<&SessionStats> {
        self.stats.as_ref()
    }

    /// The sealed series. Only available once stopped.
    pub fn capture(&self) -> Option<&SeriesSet> {
        (self.state == SessionState::Stopped).then_some(&self.capture)
    }
}
