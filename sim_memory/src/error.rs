//! Memory unit errors

use core_types::{FrameId, PageTableId, Pid, SecondLevelTableId};
use ipc::{RemoteError, RemoteErrorKind};
use std::io;
use thiserror::Error;

/// Errors raised by the paging engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Frame {0} not found in any table")]
    FrameNotFound(FrameId),

    #[error("Page table {table} already holds {held} frames; replacement is unsupported")]
    ReplacementUnsupported { table: PageTableId, held: u32 },

    #[error("No free frame left")]
    OutOfFrames,

    #[error("Index {index} out of bounds for a table of {rows} rows")]
    IndexOutOfBounds { index: u32, rows: u32 },

    #[error("Level-1 table {0} not found")]
    TableNotFound(PageTableId),

    #[error("Level-2 table {0} not found")]
    SecondLevelTableNotFound(SecondLevelTableId),

    #[error("Physical address {0} is out of range")]
    AddressOutOfRange(u32),
}

/// Errors raised by the swap manager
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Swap I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("No swap record for {0}")]
    NotFound(Pid),

    #[error("{0} has never been swapped out")]
    NotSwapped(Pid),

    #[error("Swap image of {pid} is corrupted (checksum {expected:#010x}, found {actual:#010x})")]
    ChecksumMismatch { pid: Pid, expected: u32, actual: u32 },

    #[error("Swap file of {pid} holds {actual} bytes, expected at least {expected}")]
    Truncated { pid: Pid, expected: usize, actual: usize },

    #[error("PCB codec error: {0}")]
    Pcb(#[from] core_types::PcbCodecError),
}

impl From<MemoryError> for RemoteError {
    fn from(err: MemoryError) -> Self {
        let kind = match err {
            MemoryError::FrameNotFound(_) => RemoteErrorKind::FrameNotFound,
            MemoryError::ReplacementUnsupported { .. } => RemoteErrorKind::ReplacementUnsupported,
            MemoryError::OutOfFrames => RemoteErrorKind::OutOfFrames,
            MemoryError::IndexOutOfBounds { .. } => RemoteErrorKind::IndexOutOfBounds,
            MemoryError::TableNotFound(_) | MemoryError::SecondLevelTableNotFound(_) => {
                RemoteErrorKind::TableNotFound
            }
            MemoryError::AddressOutOfRange(_) => RemoteErrorKind::AddressOutOfRange,
        };
        RemoteError::new(kind, err.to_string())
    }
}

impl From<SwapError> for RemoteError {
    fn from(err: SwapError) -> Self {
        let kind = match err {
            SwapError::NotFound(_) | SwapError::NotSwapped(_) => RemoteErrorKind::ProcessNotFound,
            _ => RemoteErrorKind::SwapFailed,
        };
        RemoteError::new(kind, err.to_string())
    }
}

/// Errors raised while starting the Memory unit
#[derive(Debug, Error)]
pub enum MemoryUnitError {
    #[error("Invalid geometry: {0}")]
    Geometry(#[from] core_types::GeometryError),

    #[error("Swap directory unavailable: {0}")]
    Swap(#[from] SwapError),

    #[error("Listener failed: {0}")]
    Io(#[from] io::Error),
}
