#![forbid(unsafe_code)]

use crate::domain::{Liveness, Pid, ProcessRecord, bytes_to_mb};
use crate::error::Error;
use crate::inspect::{InspectError, ProcessInspector, read_metric};
use config::MemoryMetric;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Which processes a scan leaves out.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    skip_names: Vec<String>,
    skip_pid: Option<Pid>,
}

impl ScanFilter {
    pub fn new(config: &config::Registry) -> Self {
        Self {
            skip_names: config.skip_names.clone(),
            skip_pid: (!config.include_self).then(std::process::id),
        }
    }

    pub fn allows(&self, pid: Pid, name: &str) -> bool {
        pid != 0 && Some(pid) != self.skip_pid && !self.skip_names.iter().any(|n| n == name)
    }
}

/// Immutable result of one scan, handed from the scanning thread to the
/// owner of the [`ProcessRegistry`].
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub taken_at: f64,
    pub metric: MemoryMetric,
    pub records: Vec<ProcessRecord>,
}

/// Enumerate processes and read `metric` for each.
///
/// Processes that vanish or refuse inspection mid-scan are skipped.
pub fn scan(
    inspector: &dyn ProcessInspector,
    metric: MemoryMetric,
    filter: &ScanFilter,
    now: f64,
) -> Result<RegistrySnapshot, Error> {
    let mut records = Vec::new();
    for entry in inspector.list_processes()? {
        if !filter.allows(entry.pid, &entry.name) {
            continue;
        }
        let bytes = match read_metric(inspector, entry.pid, metric) {
            Ok((_, bytes)) => bytes,
            Err(err @ (InspectError::NotFound(_) | InspectError::AccessDenied(_))) => {
                trace!(pid = entry.pid, %err, "skipping process during scan");
                continue;
            }
            Err(err) => {
                debug!(pid = entry.pid, %err, "skipping process during scan");
                continue;
            }
        };
        records.push(ProcessRecord {
            pid: entry.pid,
            name: entry.name,
            parent_pid: entry.parent_pid,
            memory_mb: bytes_to_mb(bytes),
            liveness: Liveness::Running,
            refreshed_at: now,
        });
    }
    debug!(count = records.len(), %metric, "process scan complete");
    Ok(RegistrySnapshot {
        taken_at: now,
        metric,
        records,
    })
}

/// The process table as of the last applied snapshot.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: BTreeMap<Pid, ProcessRecord>,
    metric: MemoryMetric,
    refreshed_at: Option<f64>,
}

impl ProcessRegistry {
    /// Replace the table with `snapshot`. Last applied wins, whatever the
    /// order the scans were started in.
    pub fn apply(&mut self, snapshot: RegistrySnapshot) {
        self.records = snapshot
            .records
            .into_iter()
            .map(|record| (record.pid, record))
            .collect();
        self.metric = snapshot.metric;
        self.refreshed_at = Some(snapshot.taken_at);
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.records.get(&pid).is_some_and(ProcessRecord::is_running)
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metric the memory column of the table was read with.
    pub fn metric(&self) -> MemoryMetric {
        self.metric
    }

    pub fn refreshed_at(&self) -> Option<f64> {
        self.refreshed_at
    }

    /// Records whose pid or name contains `keyword`, case-insensitively.
    pub fn filter(&self, keyword: &str) -> Vec<&ProcessRecord> {
        let keyword = keyword.trim().to_lowercase();
        self.records
            .values()
            .filter(|record| record.matches(&keyword))
            .collect()
    }

    pub fn mark_terminated(&mut self, pid: Pid) {
        if let Some(record) = self.records.get_mut(&pid) {
            record.liveness = Liveness::Terminated;
        }
    }

    pub fn update_memory(&mut self, pid: Pid, memory_mb: f64) {
        if let Some(record) = self.records.get_mut(&pid) {
            record.memory_mb = memory_mb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::ProcessEntry;
    use std::collections::HashMap;

    struct TableInspector {
        entries: Vec<ProcessEntry>,
        memory: HashMap<Pid, Result<u64, InspectError>>,
    }

    impl ProcessInspector for TableInspector {
        fn list_processes(&self) -> Result<Vec<ProcessEntry>, Error> {
            Ok(self.entries.clone())
        }

        fn read_memory(&self, pid: Pid, _metric: MemoryMetric) -> Result<u64, InspectError> {
            self.memory
                .get(&pid)
                .cloned()
                .unwrap_or(Err(InspectError::NotFound(pid)))
        }
    }

    fn entry(pid: Pid, name: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: name.to_string(),
            parent_pid: 1,
        }
    }

    fn inspector() -> TableInspector {
        TableInspector {
            entries: vec![
                entry(0, "System Idle Process"),
                entry(4, "System Idle Process"),
                entry(100, "Firefox"),
                entry(200, "sshd"),
                entry(300, "vanished"),
                entry(400, "locked"),
                entry(1234, "bash"),
            ],
            memory: HashMap::from([
                (0, Ok(1)),
                (4, Ok(1)),
                (100, Ok(200 * 1024 * 1024)),
                (200, Ok(10 * 1024 * 1024)),
                (300, Err(InspectError::NotFound(300))),
                (400, Err(InspectError::AccessDenied(400))),
                (1234, Ok(1024 * 1024)),
            ]),
        }
    }

    #[test]
    fn scan_skips_placeholder_and_failed_processes() {
        let filter = ScanFilter::new(&config::Registry::default());
        let snapshot = scan(&inspector(), MemoryMetric::Resident, &filter, 42.0).unwrap();

        let pids: Vec<_> = snapshot.records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![100, 200, 1234]);
        assert_eq!(snapshot.records[0].memory_mb, 200.0);
        assert!(snapshot.records.iter().all(|r| r.refreshed_at == 42.0));
    }

    #[test]
    fn filter_matches_pid_or_name_case_insensitively() {
        let filter = ScanFilter::new(&config::Registry::default());
        let mut registry = ProcessRegistry::default();
        registry.apply(scan(&inspector(), MemoryMetric::Virtual, &filter, 1.0).unwrap());

        let by_name: Vec<_> = registry.filter("FIRE").iter().map(|r| r.pid).collect();
        assert_eq!(by_name, vec![100]);

        let by_pid: Vec<_> = registry.filter("23").iter().map(|r| r.pid).collect();
        assert_eq!(by_pid, vec![1234]);

        assert_eq!(registry.filter("  ").len(), 3);
        assert!(registry.filter("nothing").is_empty());
        assert_eq!(registry.metric(), MemoryMetric::Virtual);
    }

    #[test]
    fn apply_replaces_previous_snapshot() {
        let mut registry = ProcessRegistry::default();
        registry.apply(RegistrySnapshot {
            taken_at: 1.0,
            metric: MemoryMetric::Resident,
            records: vec![ProcessRecord {
                pid: 7,
                name: "old".into(),
                parent_pid: 1,
                memory_mb: 1.0,
                liveness: Liveness::Running,
                refreshed_at: 1.0,
            }],
        });
        registry.mark_terminated(7);
        assert!(!registry.is_running(7));

        registry.apply(RegistrySnapshot {
            taken_at: 2.0,
            metric: MemoryMetric::Resident,
            records: Vec::new(),
        });
        assert!(!registry.contains(7));
        assert_eq!(registry.refreshed_at(), Some(2.0));
    }
}
