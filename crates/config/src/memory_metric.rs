use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The per-process memory accounting figure that gets sampled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryMetric {
    /// Resident set size. Physical memory currently mapped by the process.
    #[default]
    #[serde(rename = "rss")]
    Resident,

    /// Virtual memory size. Everything the process has mapped, resident or
    /// not.
    #[serde(rename = "vms")]
    Virtual,

    /// Unique set size. Memory private to the process, i.e. what would be
    /// freed if the process exited. Not always readable; callers fall back
    /// to [`MemoryMetric::Resident`] per process when it is not.
    #[serde(rename = "uss")]
    Unique,
}

impl MemoryMetric {
    pub const ALL: [MemoryMetric; 3] = [Self::Resident, Self::Virtual, Self::Unique];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resident => "rss",
            Self::Virtual => "vms",
            Self::Unique => "uss",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Resident => "physical memory",
            Self::Virtual => "virtual memory",
            Self::Unique => "unique memory",
        }
    }

    /// The next metric in selector order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            Self::Resident => Self::Virtual,
            Self::Virtual => Self::Unique,
            Self::Unique => Self::Resident,
        }
    }
}

impl fmt::Display for MemoryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.description())
    }
}

impl FromStr for MemoryMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" | "resident" => Ok(Self::Resident),
            "vms" | "virtual" => Ok(Self::Virtual),
            "uss" | "unique" => Ok(Self::Unique),
            other => Err(Error::InvalidMemoryMetric(other.to_string())),
        }
    }
}
