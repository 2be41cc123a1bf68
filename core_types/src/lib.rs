//! # Core Types
//!
//! This crate defines the fundamental types shared by the Kernel, CPU and
//! Memory units of the simulator.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Explicit over implicit**: A frame number can never be passed where a pid is expected.
//! - **One owner at a time**: A PCB moves between units by value, as a byte stream.
//! - **No sentinels**: Absent values are `Option`, failures are `Result`.
//!
//! ## Key Types
//!
//! - [`Pid`]: Unique identifier for processes
//! - [`ProcessControlBlock`]: The unit of schedulable process state
//! - [`Instruction`]: The symbolic instruction set
//! - [`MmuGeometry`]: Page size and entries per table, and the address split they imply

pub mod address;
pub mod ids;
pub mod instruction;
pub mod pcb;

pub use address::{GeometryError, LogicalAddress, MmuGeometry};
pub use ids::{FrameId, PageTableId, Pid, SecondLevelTableId};
pub use instruction::{parse_program, Instruction, ParseInstructionError};
pub use pcb::{PcbCodecError, PcbStatus, ProcessControlBlock};
