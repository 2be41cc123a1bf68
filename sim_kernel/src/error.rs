//! Kernel error types.

use core_types::{PcbCodecError, PcbStatus, Pid};
use ipc::WireError;
use thiserror::Error;

/// Errors raised by the Kernel unit.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("PCB stream error: {0}")]
    Pcb(#[from] PcbCodecError),

    #[error("PCB {pid} returned with corrupted status {status}")]
    CorruptedPcb { pid: Pid, status: PcbStatus },

    #[error("Expected {expected} back, got {actual}")]
    PidMismatch { expected: Pid, actual: Pid },

    #[error("Memory unit is not connected")]
    MemoryUnavailable,

    #[error("Unknown process {0}")]
    UnknownPid(Pid),

    #[error("Process {0} already exists")]
    DuplicatePid(Pid),

    #[error("Kernel is shutting down")]
    ShuttingDown,

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
