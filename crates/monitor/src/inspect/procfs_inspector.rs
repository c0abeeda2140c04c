#![forbid(unsafe_code)]

use crate::domain::Pid;
use crate::error::Error;
use crate::inspect::{InspectError, ProcessEntry, ProcessInspector};
use config::MemoryMetric;
use procfs::page_size;
use procfs::process::Process;
use rustc_hash::FxHashSet;
use tracing::trace;

const PRIVATE_KEYS: [&str; 2] = ["Private_Clean", "Private_Dirty"];

/// Linux inspector backed by `/proc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsInspector;

impl ProcfsInspector {
    fn open(pid: Pid) -> Result<Process, InspectError> {
        let raw = i32::try_from(pid).map_err(|_| InspectError::NotFound(pid))?;
        Process::new(raw).map_err(|err| InspectError::from_proc(pid, err))
    }

    /// Unique set: private clean + private dirty bytes from `smaps_rollup`.
    fn unique_set(process: &Process, pid: Pid) -> Result<u64, InspectError> {
        let rollup = process
            .smaps_rollup()
            .map_err(|err| InspectError::from_proc(pid, err))?;
        let mut total = 0u64;
        let mut found = false;
        for map in rollup.memory_map_rollup.iter() {
            for key in PRIVATE_KEYS {
                if let Some(bytes) = map.extension.map.get(key) {
                    total = total.saturating_add(*bytes);
                    found = true;
                }
            }
        }
        if found {
            Ok(total)
        } else {
            Err(InspectError::Other {
                pid,
                reason: "smaps_rollup has no private fields".to_string(),
            })
        }
    }
}

impl ProcessInspector for ProcfsInspector {
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        let mut entries = Vec::new();
        for process in procfs::process::all_processes()? {
            let process = match process {
                Ok(p) => p,
                Err(err) => {
                    trace!(?err, "skipping unreadable process entry");
                    continue;
                }
            };
            let stat = match process.stat() {
                Ok(stat) => stat,
                Err(err) => {
                    trace!(pid = process.pid, ?err, "skipping process without stat");
                    continue;
                }
            };
            entries.push(ProcessEntry {
                pid: stat.pid as Pid,
                name: stat.comm,
                parent_pid: stat.ppid as Pid,
            });
        }
        Ok(entries)
    }

    fn read_memory(&self, pid: Pid, metric: MemoryMetric) -> Result<u64, InspectError> {
        let process = Self::open(pid)?;
        match metric {
            MemoryMetric::Resident => {
                let stat = process
                    .stat()
                    .map_err(|err| InspectError::from_proc(pid, err))?;
                Ok(stat.rss.saturating_mul(page_size()))
            }
            MemoryMetric::Virtual => {
                let stat = process
                    .stat()
                    .map_err(|err| InspectError::from_proc(pid, err))?;
                Ok(stat.vsize)
            }
            MemoryMetric::Unique => Self::unique_set(&process, pid),
        }
    }

    fn live_pids(&self) -> Result<FxHashSet<Pid>, Error> {
        Ok(procfs::process::all_processes()?
            .filter_map(Result::ok)
            .map(|process| process.pid as Pid)
            .collect())
    }
}
