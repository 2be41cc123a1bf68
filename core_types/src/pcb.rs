//! Process control block
//!
//! The PCB is the unit of schedulable process state. It is owned by exactly
//! one unit at a time: the Kernel while queued, the CPU for the duration of
//! one execution slice, and the swap file while suspended. Every ownership
//! transfer goes through [`ProcessControlBlock::to_stream`].

use crate::ids::{PageTableId, Pid};
use crate::instruction::Instruction;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcbStatus {
    /// Created but not yet admitted
    New,
    /// Admitted and waiting for the CPU
    Ready,
    /// Currently on the CPU
    Executing,
    /// Waiting for an I/O burst to finish
    Blocked,
    /// Finished; destroyed as soon as the Kernel sees it
    Terminated,
}

impl fmt::Display for PcbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PcbStatus::New => "NEW",
            PcbStatus::Ready => "READY",
            PcbStatus::Executing => "EXECUTING",
            PcbStatus::Blocked => "BLOCKED",
            PcbStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Errors from encoding or decoding a PCB stream
#[derive(Debug, Error)]
pub enum PcbCodecError {
    #[error("PCB stream is empty")]
    Empty,

    #[error("Malformed PCB stream: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Process control block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessControlBlock {
    /// Process id
    pub pid: Pid,
    /// Declared size of the process image in bytes
    pub size: u32,
    /// Program text
    pub instructions: Vec<Instruction>,
    /// Index of the next instruction to fetch
    pub program_counter: u32,
    /// Lifecycle status
    pub status: PcbStatus,
    /// Level-1 page table, once Memory has allocated one
    pub page_table: Option<PageTableId>,
    /// Burst-time estimate used by shortest-remaining-time ordering
    pub estimation_ms: u64,
    /// Measured duration of the last execution slice
    pub real_burst_ms: u64,
    /// Duration requested by the last I/O instruction
    pub io_duration_ms: u32,
}

impl ProcessControlBlock {
    /// Creates a NEW process with no page table
    pub fn new(pid: Pid, size: u32, instructions: Vec<Instruction>, estimation_ms: u64) -> Self {
        Self {
            pid,
            size,
            instructions,
            program_counter: 0,
            status: PcbStatus::New,
            page_table: None,
            estimation_ms,
            real_burst_ms: 0,
            io_duration_ms: 0,
        }
    }

    /// Returns the instruction at the program counter, if any
    pub fn current_instruction(&self) -> Option<Instruction> {
        self.instructions.get(self.program_counter as usize).copied()
    }

    /// Returns the instruction at the program counter and advances it
    pub fn fetch(&mut self) -> Option<Instruction> {
        let instruction = self.current_instruction()?;
        self.program_counter += 1;
        Some(instruction)
    }

    /// Returns true once the program counter has run past the program
    pub fn is_finished(&self) -> bool {
        self.program_counter as usize >= self.instructions.len()
    }

    /// Serializes the PCB to its wire and swap representation
    pub fn to_stream(&self) -> Result<Vec<u8>, PcbCodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Rebuilds a PCB from a stream produced by [`to_stream`](Self::to_stream)
    ///
    /// Trailing zero bytes are ignored; swap files are sized to the process
    /// footprint and are usually longer than the image they hold.
    pub fn from_stream(bytes: &[u8]) -> Result<Self, PcbCodecError> {
        let end = bytes
            .iter()
            .rposition(|byte| *byte != 0)
            .map(|index| index + 1)
            .unwrap_or(0);
        if end == 0 {
            return Err(PcbCodecError::Empty);
        }
        Ok(serde_json::from_slice(&bytes[..end])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProcessControlBlock {
        ProcessControlBlock::new(
            Pid::new(7),
            256,
            vec![
                Instruction::Write {
                    address: 100,
                    value: 42,
                },
                Instruction::Exit,
            ],
            10_000,
        )
    }

    #[test]
    fn test_new_pcb_defaults() {
        let pcb = sample();
        assert_eq!(pcb.status, PcbStatus::New);
        assert_eq!(pcb.program_counter, 0);
        assert!(pcb.page_table.is_none());
    }

    #[test]
    fn test_stream_round_trip() {
        let mut pcb = sample();
        pcb.program_counter = 1;
        pcb.status = PcbStatus::Blocked;
        pcb.page_table = Some(PageTableId::new(0));
        pcb.io_duration_ms = 3000;

        let stream = pcb.to_stream().unwrap();
        let decoded = ProcessControlBlock::from_stream(&stream).unwrap();

        assert_eq!(decoded.pid, pcb.pid);
        assert_eq!(decoded.size, pcb.size);
        assert_eq!(decoded.program_counter, pcb.program_counter);
        assert_eq!(decoded.status, pcb.status);
        assert_eq!(decoded.instructions, pcb.instructions);
        assert_eq!(decoded, pcb);
    }

    #[test]
    fn test_from_stream_ignores_zero_padding() {
        let pcb = sample();
        let mut stream = pcb.to_stream().unwrap();
        stream.resize(stream.len() + 64, 0);
        assert_eq!(ProcessControlBlock::from_stream(&stream).unwrap(), pcb);
    }

    #[test]
    fn test_from_stream_rejects_empty_and_garbage() {
        assert!(matches!(
            ProcessControlBlock::from_stream(&[]),
            Err(PcbCodecError::Empty)
        ));
        assert!(matches!(
            ProcessControlBlock::from_stream(&[0, 0, 0]),
            Err(PcbCodecError::Empty)
        ));
        assert!(matches!(
            ProcessControlBlock::from_stream(b"not a pcb"),
            Err(PcbCodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_fetch_advances_program_counter() {
        let mut pcb = sample();
        assert_eq!(
            pcb.fetch(),
            Some(Instruction::Write {
                address: 100,
                value: 42
            })
        );
        assert_eq!(pcb.fetch(), Some(Instruction::Exit));
        assert_eq!(pcb.fetch(), None);
        assert!(pcb.is_finished());
        assert_eq!(pcb.program_counter, 2);
    }
}
