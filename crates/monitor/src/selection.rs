#![forbid(unsafe_code)]

use crate::domain::{Pid, ProcessRecord};
use std::collections::BTreeMap;

/// The user-chosen processes, keyed by pid, with the name each had when it
/// was selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pids: BTreeMap<Pid, String>,
}

impl Selection {
    pub fn insert(&mut self, pid: Pid, name: impl Into<String>) -> bool {
        self.pids.insert(pid, name.into()).is_none()
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        self.pids.remove(&pid).is_some()
    }

    /// Add `record` if absent, remove it otherwise. Returns whether it is
    /// selected afterwards.
    pub fn toggle(&mut self, record: &ProcessRecord) -> bool {
        if self.remove(record.pid) {
            false
        } else {
            self.insert(record.pid, record.name.clone());
            true
        }
    }

    pub fn select_all<'a>(&mut self, records: impl IntoIterator<Item = &'a ProcessRecord>) {
        for record in records {
            self.pids
                .entry(record.pid)
                .or_insert_with(|| record.name.clone());
        }
    }

    pub fn deselect_all<'a>(&mut self, records: impl IntoIterator<Item = &'a ProcessRecord>) {
        for record in records {
            self.pids.remove(&record.pid);
        }
    }

    /// Drop every pid for which `is_live` is false. Returns the dropped pids.
    pub fn retain_live(&mut self, mut is_live: impl FnMut(Pid) -> bool) -> Vec<Pid> {
        let mut removed = Vec::new();
        self.pids.retain(|pid, _| {
            let keep = is_live(*pid);
            if !keep {
                removed.push(*pid);
            }
            keep
        });
        removed
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains_key(&pid)
    }

    pub fn name(&self, pid: Pid) -> Option<&str> {
        self.pids.get(&pid).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pid, &str)> {
        self.pids.iter().map(|(pid, name)| (*pid, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Liveness;

    fn record(pid: Pid, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            parent_pid: 1,
            memory_mb: 1.0,
            liveness: Liveness::Running,
            refreshed_at: 0.0,
        }
    }

    #[test]
    fn toggle_flips_membership() {
        let mut selection = Selection::default();
        let r = record(10, "app");
        assert!(selection.toggle(&r));
        assert_eq!(selection.name(10), Some("app"));
        assert!(!selection.toggle(&r));
        assert!(selection.is_empty());
    }

    #[test]
    fn select_all_keeps_original_names() {
        let mut selection = Selection::default();
        selection.insert(1, "first");
        selection.select_all(&[record(1, "renamed"), record(2, "second")]);
        assert_eq!(selection.name(1), Some("first"));
        assert_eq!(selection.len(), 2);

        selection.deselect_all(&[record(2, "second")]);
        assert_eq!(selection.pids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn retain_live_reports_removed() {
        let mut selection = Selection::default();
        for pid in [1, 2, 3] {
            selection.insert(pid, "p");
        }
        let removed = selection.retain_live(|pid| pid != 2);
        assert_eq!(removed, vec![2]);
        assert_eq!(selection.pids().collect::<Vec<_>>(), vec![1, 3]);
    }
}
