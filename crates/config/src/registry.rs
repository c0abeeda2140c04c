use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Registry {
    /// Process names that are never listed. These are placeholder entries
    /// some platforms report for idle CPU time rather than real processes.
    /// Pid 0 is always skipped regardless of this list.
    pub skip_names: Vec<String>,

    /// Whether the monitor should list itself.
    pub include_self: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            skip_names: vec!["System Idle Process".to_string()],
            include_self: true,
        }
    }
}
