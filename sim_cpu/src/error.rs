//! CPU unit errors

use core_types::{GeometryError, Pid};
use ipc::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("Memory request failed: {0}")]
    Wire(#[from] WireError),

    #[error("Segmentation fault: {pid} accessed {address} beyond its {size} bytes")]
    SegmentationFault { pid: Pid, address: u32, size: u32 },

    #[error("{0} has no page table")]
    NoPageTable(Pid),

    #[error("Memory reported an invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Listener failed: {0}")]
    Io(#[from] std::io::Error),
}
