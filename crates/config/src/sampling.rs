use crate::MemoryMetric;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Sampling {
    /// Period between two sampling ticks. **Measured in milliseconds**.
    ///
    /// ## Note
    ///
    /// Stopping monitoring is observed at the top of the next tick, so this
    /// is also the worst-case latency of a stop request.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub interval_ms: Duration,

    /// Memory figure to read for every process. Can be switched at runtime;
    /// switching does not convert samples that were already recorded.
    ///
    /// See [`MemoryMetric`] for possible values.
    pub metric: MemoryMetric,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            interval_ms: Duration::from_millis(500),
            metric: MemoryMetric::Resident,
        }
    }
}
