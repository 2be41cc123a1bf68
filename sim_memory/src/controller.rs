//! Request controller of the Memory unit
//!
//! One handler serves both peers. The Kernel asks for page tables, swaps
//! and releases; the CPU walks tables and reads or writes physical memory.

use crate::error::{MemoryError, MemoryUnitError, SwapError};
use crate::paging::Paging;
use crate::swap::SwapManager;
use core_types::{MmuGeometry, PageTableId, Pid, SecondLevelTableId};
use ipc::{
    decode_pcb, decode_value, encode_value, Opcode, Operands, RemoteError, Reply,
    RequestHandler,
};
use log::{debug, error, info, trace, warn};
use sim_config::MemoryConfig;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Memory unit state and endpoints
pub struct MemoryController {
    paging: Mutex<Paging>,
    swap: SwapManager,
    tables: Mutex<HashMap<Pid, PageTableId>>,
}

impl MemoryController {
    pub fn new(paging: Paging, swap: SwapManager) -> Self {
        Self {
            paging: Mutex::new(paging),
            swap,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the controller described by `config`
    pub fn from_config(config: &MemoryConfig) -> Result<Self, MemoryUnitError> {
        let geometry = MmuGeometry::new(config.page_size, config.entries_per_table)?;
        let paging = Paging::new(geometry, config.memory_size, config.frames_per_process);
        let swap = SwapManager::new(&config.swap_dir)?;
        info!(
            "[Memory] {} frames of {}B, {} entries per table, swap at {}",
            paging.frame_count(),
            geometry.page_size(),
            geometry.entries_per_table(),
            swap.dir().display()
        );
        Ok(Self::new(paging, swap))
    }

    pub fn geometry(&self) -> MmuGeometry {
        lock(&self.paging).geometry()
    }

    pub fn swap(&self) -> &SwapManager {
        &self.swap
    }

    /// Runs `f` with exclusive access to the paging state
    pub fn with_paging<R>(&self, f: impl FnOnce(&mut Paging) -> R) -> R {
        f(&mut *lock(&self.paging))
    }

    /// Page table assigned to `pid` at admission
    pub fn table_of(&self, pid: Pid) -> Option<PageTableId> {
        lock(&self.tables).get(&pid).copied()
    }

    /// Creates the page table and swap file of a new process
    pub fn init_process(&self, pid: Pid, size: u32) -> Result<PageTableId, RemoteError> {
        debug!("[Server] Initializing {} [{} bytes]", pid, size);
        self.swap.create(pid, size)?;
        let mut paging = lock(&self.paging);
        let table = paging.create_new_process();
        if let Some(previous) = lock(&self.tables).insert(pid, table) {
            warn!("[Server] {} was already live; releasing table {}", pid, previous);
            paging.delete_process(previous);
        }
        drop(paging);
        info!("[Server] Page table {} was obtained for {}", table, pid);
        self.dump_tables();
        Ok(table)
    }

    /// Releases a process's tables and swap file
    ///
    /// Releasing an unknown or already released process does nothing.
    pub fn terminate_process(&self, pid: Pid, table: Option<PageTableId>) {
        let recorded = lock(&self.tables).remove(&pid);
        {
            let mut paging = lock(&self.paging);
            for table in table.into_iter().chain(recorded.filter(|r| Some(*r) != table)) {
                if paging.delete_process(table) {
                    trace!("[Server] Table {} of {} deleted", table, pid);
                }
            }
        }
        match self.swap.delete(pid) {
            Ok(true) => info!("[Server] {} deleted", pid),
            Ok(false) => debug!("[Server] {} had nothing left to release", pid),
            Err(err) => warn!("[Server] Swap file of {} not removed: {}", pid, err),
        }
        self.dump_tables();
    }

    fn dump_tables(&self) {
        let paging = lock(&self.paging);
        debug!("[Server] Current tables ({})", paging.process_count());
        for line in paging.describe_tables() {
            debug!("[Server] {}", line);
        }
    }

    fn second_level_page(&self, body: &[u8]) -> Reply {
        let request = Operands::decode(body)?;
        let table = PageTableId::new(request.first);
        let second = lock(&self.paging).second_level_page(table, request.second)?;
        trace!("[MMU] Table {}[{}] = {}", table, request.second, second);
        Ok(encode_value(second.as_u32()))
    }

    fn frame(&self, body: &[u8]) -> Reply {
        let request = Operands::decode(body)?;
        let table = SecondLevelTableId::new(request.first);
        let frame = lock(&self.paging)
            .frame(table, request.second)
            .map_err(log_access)?;
        trace!("[MMU] Table {}[{}] = frame {}", table, request.second, frame);
        Ok(encode_value(frame.as_u32()))
    }

    fn read(&self, body: &[u8]) -> Reply {
        let address = decode_value(body)?;
        let value = lock(&self.paging).read(address).map_err(log_access)?;
        info!("[Memory] Read value {} from {}", value, address);
        Ok(encode_value(value))
    }

    fn write(&self, body: &[u8]) -> Reply {
        let request = Operands::decode(body)?;
        lock(&self.paging)
            .write(request.first, request.second)
            .map_err(log_access)?;
        info!(
            "[Memory] Value {} was written into {}",
            request.second, request.first
        );
        Ok(Vec::new())
    }

    fn operands(&self, body: &[u8]) -> Reply {
        let request = Operands::decode(body)?;
        let mut paging = lock(&self.paging);
        let first = paging.read(request.first).map_err(log_access)?;
        let second = paging.read(request.second).map_err(log_access)?;
        Ok(Operands::new(first, second).encode())
    }

    fn memory_init(&self, body: &[u8]) -> Reply {
        let request = Operands::decode(body)?;
        let table = self.init_process(Pid::new(request.first), request.second)?;
        Ok(encode_value(table.as_u32()))
    }

    fn swap_pcb(&self, body: &[u8]) -> Reply {
        let pcb = decode_pcb(body)?;
        self.swap
            .write_image(pcb.pid, pcb.size, body)
            .map_err(|err: SwapError| {
                error!("[SWAP] Failed to swap {}: {}", pcb.pid, err);
                RemoteError::from(err)
            })?;
        Ok(Vec::new())
    }

    fn retrieve_swapped_pcb(&self, body: &[u8]) -> Reply {
        let pid = Pid::new(decode_value(body)?);
        let image = self.swap.read_image(pid).map_err(|err| {
            error!("[SWAP] Could not retrieve {}: {}", pid, err);
            RemoteError::from(err)
        })?;
        info!("[SWAP] {} retrieved", pid);
        Ok(image)
    }

    fn process_terminated(&self, body: &[u8]) -> Reply {
        let (pid, table) = if body.len() == Operands::LEN {
            let request = Operands::decode(body)?;
            (Pid::new(request.first), Some(PageTableId::new(request.second)))
        } else {
            (Pid::new(decode_value(body)?), None)
        };
        trace!("[Server] {} requested termination", pid);
        self.terminate_process(pid, table);
        Ok(Vec::new())
    }
}

fn log_access(err: MemoryError) -> RemoteError {
    match err {
        MemoryError::ReplacementUnsupported { .. } => {
            warn!("[Memory] Page replacement is required: {}", err)
        }
        _ => error!("[Memory] {}", err),
    }
    err.into()
}

impl RequestHandler for MemoryController {
    fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply {
        match opcode {
            Opcode::PageSize => Ok(encode_value(self.geometry().page_size())),
            Opcode::EntriesPerTable => Ok(encode_value(self.geometry().entries_per_table())),
            Opcode::SecondLevelPage => self.second_level_page(body),
            Opcode::Frame => self.frame(body),
            Opcode::Read => self.read(body),
            Opcode::Write => self.write(body),
            Opcode::Operands => self.operands(body),
            Opcode::MemoryInit => self.memory_init(body),
            Opcode::SwapPcb => self.swap_pcb(body),
            Opcode::RetrieveSwappedPcb => self.retrieve_swapped_pcb(body),
            Opcode::ProcessTerminated => self.process_terminated(body),
            other => Err(RemoteError::invalid_request(format!(
                "{} is not a Memory endpoint",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Instruction, ProcessControlBlock};
    use ipc::{encode_pcb, RemoteErrorKind};
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> MemoryController {
        let config = MemoryConfig {
            memory_size: 1024,
            swap_dir: dir.path().to_path_buf(),
            ..MemoryConfig::default()
        };
        MemoryController::from_config(&config).unwrap()
    }

    fn value(reply: Reply) -> u32 {
        decode_value(&reply.unwrap()).unwrap()
    }

    fn walk(controller: &MemoryController, table: u32, page: u32) -> u32 {
        let second = value(controller.handle(
            Opcode::SecondLevelPage,
            &Operands::new(table, page / 4).encode(),
        ));
        value(controller.handle(Opcode::Frame, &Operands::new(second, page % 4).encode()))
    }

    #[test]
    fn test_geometry_endpoints() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        assert_eq!(value(controller.handle(Opcode::PageSize, &[])), 64);
        assert_eq!(value(controller.handle(Opcode::EntriesPerTable, &[])), 4);
    }

    #[test]
    fn test_memory_init_creates_table_and_swap_file() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let table = value(controller.handle(Opcode::MemoryInit, &Operands::new(7, 256).encode()));

        assert_eq!(controller.table_of(Pid::new(7)), Some(PageTableId::new(table)));
        assert!(dir.path().join("7.swap").exists());
    }

    #[test]
    fn test_write_read_and_operands() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let table = value(controller.handle(Opcode::MemoryInit, &Operands::new(1, 256).encode()));
        let frame = walk(&controller, table, 1);
        let address = frame * 64 + 36;

        let ack = controller
            .handle(Opcode::Write, &Operands::new(address, 42).encode())
            .unwrap();
        assert!(ack.is_empty());
        assert_eq!(value(controller.handle(Opcode::Read, &encode_value(address))), 42);

        let pair = controller
            .handle(Opcode::Operands, &Operands::new(address, frame * 64).encode())
            .unwrap();
        assert_eq!(Operands::decode(&pair).unwrap(), Operands::new(42, 0));
    }

    #[test]
    fn test_unmapped_frame_is_an_error_reply() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let err = controller
            .handle(Opcode::Read, &encode_value(640))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::FrameNotFound);
    }

    #[test]
    fn test_empty_body_is_rejected() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let err = controller.handle(Opcode::Frame, &[]).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidRequest);
    }

    #[test]
    fn test_swap_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        controller.handle(Opcode::MemoryInit, &Operands::new(4, 128).encode()).unwrap();

        let pcb = ProcessControlBlock::new(Pid::new(4), 128, vec![Instruction::Exit], 100);
        let image = encode_pcb(&pcb).unwrap();
        controller.handle(Opcode::SwapPcb, &image).unwrap();

        let retrieved = controller
            .handle(Opcode::RetrieveSwappedPcb, &encode_value(4))
            .unwrap();
        assert_eq!(retrieved, image);
    }

    #[test]
    fn test_retrieve_unknown_pid_fails() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let err = controller
            .handle(Opcode::RetrieveSwappedPcb, &encode_value(9))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ProcessNotFound);
    }

    #[test]
    fn test_process_terminated_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let table = value(controller.handle(Opcode::MemoryInit, &Operands::new(7, 256).encode()));
        walk(&controller, table, 0);

        let body = Operands::new(7, table).encode();
        controller.handle(Opcode::ProcessTerminated, &body).unwrap();
        controller.handle(Opcode::ProcessTerminated, &body).unwrap();

        assert!(!dir.path().join("7.swap").exists());
        assert_eq!(controller.table_of(Pid::new(7)), None);
        assert_eq!(controller.with_paging(|paging| paging.process_count()), 0);
    }

    #[test]
    fn test_process_terminated_by_pid_only() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        controller.handle(Opcode::MemoryInit, &Operands::new(3, 64).encode()).unwrap();
        controller.handle(Opcode::ProcessTerminated, &encode_value(3)).unwrap();
        assert_eq!(controller.with_paging(|paging| paging.process_count()), 0);
    }

    #[test]
    fn test_terminated_with_other_table_releases_both() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let recorded = value(controller.handle(Opcode::MemoryInit, &Operands::new(5, 64).encode()));
        let other = controller.with_paging(|paging| paging.create_new_process());
        assert_ne!(other.as_u32(), recorded);

        controller
            .handle(
                Opcode::ProcessTerminated,
                &Operands::new(5, other.as_u32()).encode(),
            )
            .unwrap();
        assert_eq!(controller.with_paging(|paging| paging.process_count()), 0);
    }

    #[test]
    fn test_repeated_init_releases_previous_table() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let first = value(controller.handle(Opcode::MemoryInit, &Operands::new(6, 64).encode()));
        let second = value(controller.handle(Opcode::MemoryInit, &Operands::new(6, 64).encode()));

        assert_ne!(first, second);
        assert_eq!(controller.table_of(Pid::new(6)), Some(PageTableId::new(second)));
        assert_eq!(controller.with_paging(|paging| paging.process_count()), 1);
    }

    #[test]
    fn test_kernel_only_opcodes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir);
        let err = controller.handle(Opcode::Interrupt, &[]).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidRequest);
    }
}
