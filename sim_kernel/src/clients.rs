//! Kernel-side links to the CPU and Memory units.
//!
//! Each link serializes its request/reply pairs behind a mutex, so the
//! schedulers can share it without interleaving frames.

use crate::error::KernelError;
use core_types::{PageTableId, Pid, ProcessControlBlock};
use ipc::{
    call, decode_pcb, decode_value, disconnect, encode_pcb, encode_value, AbortHandle, Opcode,
    Operands, Transport, WireError,
};
use log::{debug, error, trace};
use std::sync::{Mutex, MutexGuard};

type Link = Option<Box<dyn Transport>>;

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    match link.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Issues one call, dropping the link if the peer is gone.
fn call_on(
    link: &Mutex<Link>,
    peer: &str,
    opcode: Opcode,
    body: Vec<u8>,
) -> Result<Vec<u8>, KernelError> {
    let mut guard = lock(link);
    let transport = guard.as_mut().ok_or(KernelError::MemoryUnavailable)?;
    match call(transport, opcode, body) {
        Ok(reply) => Ok(reply),
        Err(err) if err.is_connectivity() => {
            error!("{} link lost during {}: {}", peer, opcode, err);
            *guard = None;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn close(link: &Mutex<Link>) {
    if let Some(mut transport) = lock(link).take() {
        let _ = disconnect(&mut transport);
    }
}

/// Link to the Memory unit.
///
/// A kernel without a Memory link still schedules; processes are admitted
/// without page tables.
pub struct MemoryClient {
    link: Mutex<Link>,
}

impl MemoryClient {
    pub fn connected(transport: Box<dyn Transport>) -> Self {
        Self {
            link: Mutex::new(Some(transport)),
        }
    }

    pub fn detached() -> Self {
        Self {
            link: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// MEMORY_INIT: allocates a Level-1 table for a new process.
    pub fn init_process(&self, pid: Pid, size: u32) -> Result<PageTableId, KernelError> {
        trace!("[LTS] Requesting page table for {} ({} bytes)", pid, size);
        let body = Operands::new(pid.as_u32(), size).encode();
        let reply = call_on(&self.link, "Memory", Opcode::MemoryInit, body)?;
        Ok(PageTableId::new(decode_value(&reply)?))
    }

    /// SWAP_PCB: persists the full image of a process.
    pub fn swap_out(&self, pcb: &ProcessControlBlock) -> Result<(), KernelError> {
        debug!("[SWAP] Sending {} to swap", pcb.pid);
        call_on(&self.link, "Memory", Opcode::SwapPcb, encode_pcb(pcb)?)?;
        Ok(())
    }

    /// RETRIEVE_SWAPPED_PCB: reads a process image back.
    pub fn retrieve(&self, pid: Pid) -> Result<ProcessControlBlock, KernelError> {
        debug!("[SWAP] Retrieving {} from swap", pid);
        let reply = call_on(
            &self.link,
            "Memory",
            Opcode::RetrieveSwappedPcb,
            encode_value(pid.as_u32()),
        )?;
        let pcb = decode_pcb(&reply)?;
        if pcb.pid != pid {
            return Err(KernelError::PidMismatch {
                expected: pid,
                actual: pcb.pid,
            });
        }
        Ok(pcb)
    }

    /// PROCESS_TERMINATED: frees the page table and swap record.
    ///
    /// Without a page table only the pid is sent.
    pub fn process_terminated(
        &self,
        pid: Pid,
        page_table: Option<PageTableId>,
    ) -> Result<(), KernelError> {
        let body = match page_table {
            Some(table) => Operands::new(pid.as_u32(), table.as_u32()).encode(),
            None => encode_value(pid.as_u32()),
        };
        call_on(&self.link, "Memory", Opcode::ProcessTerminated, body)?;
        Ok(())
    }

    /// Sends DISCONNECT and drops the link.
    pub fn close(&self) {
        close(&self.link);
    }
}

/// Dispatch channel to the CPU unit.
pub struct CpuClient {
    link: Mutex<Link>,
    abort: Option<AbortHandle>,
}

impl CpuClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            abort: transport.abort_handle(),
            link: Mutex::new(Some(transport)),
        }
    }

    /// Fails a pending [`execute`](Self::execute) without taking the link lock.
    pub fn abort(&self) {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
    }

    /// Sends a PCB and blocks until the CPU returns it.
    pub fn execute(&self, pcb: &ProcessControlBlock) -> Result<ProcessControlBlock, KernelError> {
        let body = encode_pcb(pcb)?;
        let mut guard = lock(&self.link);
        let transport = guard
            .as_mut()
            .ok_or(KernelError::Wire(WireError::Disconnected))?;
        let reply = match call(transport, Opcode::Pcb, body) {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_connectivity() {
                    *guard = None;
                }
                return Err(err.into());
            }
        };
        Ok(decode_pcb(&reply)?)
    }

    pub fn close(&self) {
        close(&self.link);
    }
}

/// Interrupt channel to the CPU unit.
pub struct InterruptClient {
    link: Mutex<Link>,
}

impl InterruptClient {
    pub fn connected(transport: Box<dyn Transport>) -> Self {
        Self {
            link: Mutex::new(Some(transport)),
        }
    }

    pub fn detached() -> Self {
        Self {
            link: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Raises an interrupt on the CPU.
    pub fn interrupt(&self) -> Result<(), KernelError> {
        let mut guard = lock(&self.link);
        let transport = guard
            .as_mut()
            .ok_or(KernelError::Wire(WireError::Disconnected))?;
        match call(transport, Opcode::Interrupt, Vec::new()) {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.is_connectivity() {
                    *guard = None;
                }
                Err(err.into())
            }
        }
    }

    pub fn close(&self) {
        close(&self.link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Instruction;
    use ipc::{serve_connection, ChannelTransport, RemoteError, RemoteErrorKind, Reply, RequestHandler};
    use std::sync::Mutex as StdMutex;
    use std::thread;

    #[derive(Default)]
    struct RecordingMemory {
        requests: StdMutex<Vec<(Opcode, Vec<u8>)>>,
    }

    impl RequestHandler for RecordingMemory {
        fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply {
            self.requests.lock().unwrap().push((opcode, body.to_vec()));
            match opcode {
                Opcode::MemoryInit => Ok(encode_value(0)),
                Opcode::ProcessTerminated => Ok(Vec::new()),
                Opcode::SwapPcb => Err(RemoteError::new(RemoteErrorKind::SwapFailed, "disk full")),
                _ => Err(RemoteError::invalid_request("unexpected")),
            }
        }
    }

    fn memory_pair() -> (MemoryClient, thread::JoinHandle<Vec<(Opcode, Vec<u8>)>>) {
        let (client, mut server) = ChannelTransport::pair();
        let handle = thread::spawn(move || {
            let memory = RecordingMemory::default();
            serve_connection(&mut server, &memory).unwrap();
            memory.requests.into_inner().unwrap()
        });
        (MemoryClient::connected(Box::new(client)), handle)
    }

    #[test]
    fn test_page_table_zero_is_valid() {
        let (memory, handle) = memory_pair();
        let table = memory.init_process(Pid::new(7), 256).unwrap();
        assert_eq!(table, PageTableId::new(0));
        memory.close();

        let requests = handle.join().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, Opcode::MemoryInit);
        assert_eq!(
            Operands::decode(&requests[0].1).unwrap(),
            Operands::new(7, 256)
        );
    }

    #[test]
    fn test_swap_failure_is_reported() {
        let (memory, handle) = memory_pair();
        let pcb = ProcessControlBlock::new(Pid::new(1), 64, vec![Instruction::Exit], 10);
        assert!(matches!(
            memory.swap_out(&pcb),
            Err(KernelError::Wire(WireError::Remote(_)))
        ));
        memory.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_terminated_without_table_sends_pid_only() {
        let (memory, handle) = memory_pair();
        memory.process_terminated(Pid::new(3), None).unwrap();
        memory
            .process_terminated(Pid::new(4), Some(PageTableId::new(2)))
            .unwrap();
        memory.close();

        let requests = handle.join().unwrap();
        assert_eq!(requests[0].1, encode_value(3));
        assert_eq!(
            Operands::decode(&requests[1].1).unwrap(),
            Operands::new(4, 2)
        );
    }

    #[test]
    fn test_detached_memory_is_unavailable() {
        let memory = MemoryClient::detached();
        assert!(!memory.is_connected());
        assert!(matches!(
            memory.init_process(Pid::new(1), 64),
            Err(KernelError::MemoryUnavailable)
        ));
    }

    #[test]
    fn test_lost_peer_detaches_link() {
        let (client, server) = ChannelTransport::pair();
        drop(server);
        let memory = MemoryClient::connected(Box::new(client));
        assert!(memory.init_process(Pid::new(1), 64).is_err());
        assert!(!memory.is_connected());
    }
}
