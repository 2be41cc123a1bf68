//! Process registry.
//!
//! Every live process has exactly one location. Queues hold the PCBs; this
//! table is the record of where each pid is, so a pid can never be in two
//! places at once.

use crate::error::KernelError;
use core_types::Pid;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Where a live process currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessLocation {
    New,
    Ready,
    Executing,
    Blocked,
    /// Swapped out while its I/O burst runs
    SuspendedBlocked,
    /// Swapped out, I/O done, waiting to be resumed
    SuspendedReady,
}

impl ProcessLocation {
    /// Whether the process holds a multiprogramming slot.
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            ProcessLocation::Ready | ProcessLocation::Executing | ProcessLocation::Blocked
        )
    }
}

impl fmt::Display for ProcessLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessLocation::New => "NEW",
            ProcessLocation::Ready => "READY",
            ProcessLocation::Executing => "EXECUTING",
            ProcessLocation::Blocked => "BLOCKED",
            ProcessLocation::SuspendedBlocked => "SUSPENDED-BLOCKED",
            ProcessLocation::SuspendedReady => "SUSPENDED-READY",
        };
        f.write_str(name)
    }
}

/// Pid → location registry.
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: Mutex<BTreeMap<Pid, ProcessLocation>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<Pid, ProcessLocation>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a new process.
    pub fn insert(&self, pid: Pid, location: ProcessLocation) -> Result<(), KernelError> {
        let mut entries = self.entries();
        if entries.contains_key(&pid) {
            return Err(KernelError::DuplicatePid(pid));
        }
        entries.insert(pid, location);
        Ok(())
    }

    /// Moves a process, returning its previous location.
    pub fn move_to(
        &self,
        pid: Pid,
        location: ProcessLocation,
    ) -> Result<ProcessLocation, KernelError> {
        let mut entries = self.entries();
        let slot = entries.get_mut(&pid).ok_or(KernelError::UnknownPid(pid))?;
        let previous = *slot;
        *slot = location;
        Ok(previous)
    }

    /// Forgets a process. Returns `None` if it was not registered.
    pub fn remove(&self, pid: Pid) -> Option<ProcessLocation> {
        self.entries().remove(&pid)
    }

    pub fn location(&self, pid: Pid) -> Option<ProcessLocation> {
        self.entries().get(&pid).copied()
    }

    /// Pids at `location`, in pid order.
    pub fn pids_at(&self, location: ProcessLocation) -> Vec<Pid> {
        self.entries()
            .iter()
            .filter(|(_, at)| **at == location)
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Number of processes holding a multiprogramming slot.
    pub fn admitted_count(&self) -> usize {
        self.entries()
            .values()
            .filter(|location| location.is_admitted())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_duplicates() {
        let table = ProcessTable::new();
        table.insert(Pid::new(1), ProcessLocation::New).unwrap();
        assert!(matches!(
            table.insert(Pid::new(1), ProcessLocation::Ready),
            Err(KernelError::DuplicatePid(_))
        ));
        assert_eq!(table.location(Pid::new(1)), Some(ProcessLocation::New));
    }

    #[test]
    fn test_move_reports_previous_location() {
        let table = ProcessTable::new();
        table.insert(Pid::new(1), ProcessLocation::New).unwrap();
        let previous = table.move_to(Pid::new(1), ProcessLocation::Ready).unwrap();
        assert_eq!(previous, ProcessLocation::New);
        assert_eq!(table.pids_at(ProcessLocation::Ready), vec![Pid::new(1)]);
        assert!(table.pids_at(ProcessLocation::New).is_empty());
    }

    #[test]
    fn test_move_unknown_pid_fails() {
        let table = ProcessTable::new();
        assert!(matches!(
            table.move_to(Pid::new(9), ProcessLocation::Ready),
            Err(KernelError::UnknownPid(_))
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let table = ProcessTable::new();
        table.insert(Pid::new(1), ProcessLocation::Executing).unwrap();
        assert_eq!(table.remove(Pid::new(1)), Some(ProcessLocation::Executing));
        assert_eq!(table.remove(Pid::new(1)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_admitted_count() {
        let table = ProcessTable::new();
        table.insert(Pid::new(1), ProcessLocation::Ready).unwrap();
        table.insert(Pid::new(2), ProcessLocation::Executing).unwrap();
        table.insert(Pid::new(3), ProcessLocation::New).unwrap();
        table
            .insert(Pid::new(4), ProcessLocation::SuspendedBlocked)
            .unwrap();
        assert_eq!(table.admitted_count(), 2);
        assert_eq!(table.len(), 4);
    }
}
