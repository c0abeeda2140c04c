#![forbid(unsafe_code)]

use super::Pid;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a raw byte count to floating-point megabytes.
///
/// Conversion happens once per reading so nothing is rounded across ticks.
#[inline]
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub pid: Pid,
    /// Wall-clock seconds since the Unix epoch.
    pub timestamp: f64,
    pub memory_mb: f64,
}

impl Sample {
    pub fn new(pid: Pid, timestamp: f64, memory_mb: f64) -> Self {
        Self {
            pid,
            timestamp,
            memory_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_mb_divides_by_mebibyte() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(100 * 1024 * 1024), 100.0);
        assert_eq!(bytes_to_mb(512 * 1024), 0.5);
    }
}
