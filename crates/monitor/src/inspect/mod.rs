#![forbid(unsafe_code)]

mod procfs_inspector;

pub use procfs_inspector::ProcfsInspector;

use crate::domain::Pid;
use crate::error::Error;
use config::MemoryMetric;
use rustc_hash::FxHashSet;

/// Identity of a process as listed by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub name: String,
    pub parent_pid: Pid,
}

/// Per-process inspection failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    /// The process exited before or while it was being inspected.
    #[error("process {0} not found")]
    NotFound(Pid),

    #[error("access to process {0} denied")]
    AccessDenied(Pid),

    #[error("failed to inspect process {pid}: {reason}")]
    Other { pid: Pid, reason: String },
}

impl InspectError {
    pub fn from_proc(pid: Pid, err: procfs::ProcError) -> Self {
        match err {
            procfs::ProcError::NotFound(_) => Self::NotFound(pid),
            procfs::ProcError::PermissionDenied(_) => Self::AccessDenied(pid),
            other => Self::Other {
                pid,
                reason: other.to_string(),
            },
        }
    }

    pub fn pid(&self) -> Pid {
        match self {
            Self::NotFound(pid) | Self::AccessDenied(pid) => *pid,
            Self::Other { pid, .. } => *pid,
        }
    }
}

/// The OS process inspection facility.
pub trait ProcessInspector: Send + Sync {
    /// List every process currently visible.
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, Error>;

    /// Read the raw byte count of `metric` for `pid`.
    fn read_memory(&self, pid: Pid, metric: MemoryMetric) -> Result<u64, InspectError>;

    /// Pids of every process currently visible.
    fn live_pids(&self) -> Result<FxHashSet<Pid>, Error> {
        Ok(self
            .list_processes()?
            .into_iter()
            .map(|entry| entry.pid)
            .collect())
    }
}

/// Read `metric` for `pid`, falling back to the resident set when the unique
/// set cannot be read for this one process.
///
/// Returns the metric that was actually read alongside the byte count.
pub fn read_metric(
    inspector: &dyn ProcessInspector,
    pid: Pid,
    metric: MemoryMetric,
) -> Result<(MemoryMetric, u64), InspectError> {
    match inspector.read_memory(pid, metric) {
        Ok(bytes) => Ok((metric, bytes)),
        Err(InspectError::NotFound(pid)) => Err(InspectError::NotFound(pid)),
        Err(err) if metric == MemoryMetric::Unique => {
            tracing::trace!(pid, %err, "unique set unavailable, falling back to resident set");
            inspector
                .read_memory(pid, MemoryMetric::Resident)
                .map(|bytes| (MemoryMetric::Resident, bytes))
        }
        Err(err) => Err(err),
    }
}
