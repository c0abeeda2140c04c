#![forbid(unsafe_code)]

/// Operating system process identifier. The OS may hand the same value to a
/// different process once the original exits.
pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    #[default]
    Running,
    Terminated,
}

/// One row of the process table as of a registry refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: Pid,
    pub name: String,
    pub parent_pid: Pid,
    pub memory_mb: f64,
    pub liveness: Liveness,
    /// Wall-clock seconds of the scan that produced this record. The name is
    /// only trusted as of this instant since pids get reused.
    pub refreshed_at: f64,
}

impl ProcessRecord {
    pub fn is_running(&self) -> bool {
        self.liveness == Liveness::Running
    }

    /// Case-insensitive substring match on the pid or the name. `keyword` is
    /// expected to be lowercased and trimmed already.
    pub fn matches(&self, keyword: &str) -> bool {
        keyword.is_empty()
            || self.pid.to_string().contains(keyword)
            || self.name.to_lowercase().contains(keyword)
    }
}
