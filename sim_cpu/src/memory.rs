//! Client side of the CPU to Memory link

use ipc::{call, decode_value, encode_value, Opcode, Operands, Transport, WireError};
use log::trace;
use std::sync::Mutex;

/// Synchronous requests to the Memory unit
pub struct MemoryClient {
    link: Mutex<Box<dyn Transport>>,
}

impl MemoryClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            link: Mutex::new(transport),
        }
    }

    fn request(&self, opcode: Opcode, body: Vec<u8>) -> Result<Vec<u8>, WireError> {
        let mut link = match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trace!("[Memory-Client] {} request", opcode);
        call(&mut **link, opcode, body)
    }

    fn value(&self, opcode: Opcode, body: Vec<u8>) -> Result<u32, WireError> {
        decode_value(&self.request(opcode, body)?)
    }

    pub fn page_size(&self) -> Result<u32, WireError> {
        self.value(Opcode::PageSize, Vec::new())
    }

    pub fn entries_per_table(&self) -> Result<u32, WireError> {
        self.value(Opcode::EntriesPerTable, Vec::new())
    }

    /// Level-2 table id stored at `index` of a Level-1 table
    pub fn second_level_page(&self, table: u32, index: u32) -> Result<u32, WireError> {
        self.value(Opcode::SecondLevelPage, Operands::new(table, index).encode())
    }

    /// Frame bound at `index` of a Level-2 table
    pub fn frame(&self, table: u32, index: u32) -> Result<u32, WireError> {
        self.value(Opcode::Frame, Operands::new(table, index).encode())
    }

    pub fn read(&self, physical_address: u32) -> Result<u32, WireError> {
        self.value(Opcode::Read, encode_value(physical_address))
    }

    pub fn write(&self, physical_address: u32, value: u32) -> Result<(), WireError> {
        self.request(Opcode::Write, Operands::new(physical_address, value).encode())?;
        Ok(())
    }

    /// Values stored at two physical addresses
    pub fn operands(&self, first: u32, second: u32) -> Result<Operands, WireError> {
        Operands::decode(&self.request(Opcode::Operands, Operands::new(first, second).encode())?)
    }

    pub fn close(&self) {
        let mut link = match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = ipc::disconnect(&mut **link);
    }
}
