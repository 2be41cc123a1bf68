//! Unique identifiers for simulator entities
//!
//! Every identifier that crosses a unit boundary is a 32-bit number on the
//! wire. Wrapping each one in its own type keeps a frame number from being
//! passed where a page table id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a process
///
/// Pids are handed out by the Kernel and never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(u32);

impl Pid {
    /// Creates a pid from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCB#{}", self.0)
    }
}

/// Identifier of a process's Level-1 page table
///
/// Owned by the Memory unit; the Kernel only stores it on the PCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageTableId(u32);

impl PageTableId {
    /// Creates a Level-1 table id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PageTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table1#{}", self.0)
    }
}

/// Identifier of a Level-2 page table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecondLevelTableId(u32);

impl SecondLevelTableId {
    /// Creates a Level-2 table id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SecondLevelTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table2#{}", self.0)
    }
}

/// Physical frame number
///
/// Frame `n` covers physical bytes `n * page_size .. (n + 1) * page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(u32);

impl FrameId {
    /// Creates a frame id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the index of this frame in the frame table
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame#{}", self.0)
    }
}
