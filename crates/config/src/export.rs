use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Export {
    /// Directory the CSV files are written to. Relative paths are resolved
    /// against the working directory of the process.
    pub directory: PathBuf,
}

impl Default for Export {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}
