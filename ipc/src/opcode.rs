//! Operation codes carried in every frame header

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation code of a frame
///
/// The numeric values are part of the wire format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Opcode {
    Disconnect = 0,
    Message = 1,
    Package = 2,
    Syscall = 3,
    Command = 4,
    IoReturn = 5,
    Operands = 6,
    Pcb = 7,
    Read = 8,
    Write = 9,
    SwapPcb = 10,
    RetrieveSwappedPcb = 11,
    RetrievedPcb = 12,
    WriteResult = 13,
    Interrupt = 14,
    PageSize = 15,
    EntriesPerTable = 16,
    Frame = 17,
    SecondLevelPage = 18,
    MemoryInit = 19,
    ProcessTerminated = 20,
}

const ALL: [Opcode; 21] = [
    Opcode::Disconnect,
    Opcode::Message,
    Opcode::Package,
    Opcode::Syscall,
    Opcode::Command,
    Opcode::IoReturn,
    Opcode::Operands,
    Opcode::Pcb,
    Opcode::Read,
    Opcode::Write,
    Opcode::SwapPcb,
    Opcode::RetrieveSwappedPcb,
    Opcode::RetrievedPcb,
    Opcode::WriteResult,
    Opcode::Interrupt,
    Opcode::PageSize,
    Opcode::EntriesPerTable,
    Opcode::Frame,
    Opcode::SecondLevelPage,
    Opcode::MemoryInit,
    Opcode::ProcessTerminated,
];

impl Opcode {
    /// Returns the numeric code written on the wire
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Opcode that a reply to this request carries
    pub fn reply_opcode(self) -> Opcode {
        match self {
            Opcode::Write => Opcode::WriteResult,
            Opcode::RetrieveSwappedPcb => Opcode::RetrievedPcb,
            other => other,
        }
    }

    /// Wire name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Disconnect => "DISCONNECT",
            Opcode::Message => "MESSAGE",
            Opcode::Package => "PACKAGE",
            Opcode::Syscall => "SYSCALL",
            Opcode::Command => "COMMAND",
            Opcode::IoReturn => "IO_RETURN",
            Opcode::Operands => "OPERANDS",
            Opcode::Pcb => "PCB",
            Opcode::Read => "READ",
            Opcode::Write => "WRITE",
            Opcode::SwapPcb => "SWAP_PCB",
            Opcode::RetrieveSwappedPcb => "RETRIEVE_SWAPPED_PCB",
            Opcode::RetrievedPcb => "RETRIEVED_PCB",
            Opcode::WriteResult => "WRITE_RESULT",
            Opcode::Interrupt => "INTERRUPT",
            Opcode::PageSize => "PAGE_SIZE",
            Opcode::EntriesPerTable => "ENTRIES_PER_TABLE",
            Opcode::Frame => "FRAME",
            Opcode::SecondLevelPage => "SECOND_LEVEL_PAGE",
            Opcode::MemoryInit => "MEMORY_INIT",
            Opcode::ProcessTerminated => "PROCESS_TERMINATED",
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = WireError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        ALL.get(raw as usize)
            .copied()
            .ok_or(WireError::UnknownOpcode(raw))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_numbers_are_stable() {
        assert_eq!(Opcode::Disconnect.as_u32(), 0);
        assert_eq!(Opcode::Operands.as_u32(), 6);
        assert_eq!(Opcode::Pcb.as_u32(), 7);
        assert_eq!(Opcode::Interrupt.as_u32(), 14);
        assert_eq!(Opcode::ProcessTerminated.as_u32(), 20);
    }

    #[test]
    fn test_try_from_matches_discriminant() {
        for opcode in ALL {
            assert_eq!(Opcode::try_from(opcode.as_u32()).unwrap(), opcode);
        }
        assert!(matches!(
            Opcode::try_from(21),
            Err(WireError::UnknownOpcode(21))
        ));
    }

    #[test]
    fn test_reply_opcodes() {
        assert_eq!(Opcode::Write.reply_opcode(), Opcode::WriteResult);
        assert_eq!(
            Opcode::RetrieveSwappedPcb.reply_opcode(),
            Opcode::RetrievedPcb
        );
        assert_eq!(Opcode::Read.reply_opcode(), Opcode::Read);
        assert_eq!(Opcode::MemoryInit.reply_opcode(), Opcode::MemoryInit);
    }
}
