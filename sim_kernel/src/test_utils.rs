//! Test utilities for scheduler tests
//!
//! Stand-in CPU and Memory endpoints served over in-memory transports, so
//! Kernel behavior can be driven without sockets or real units.

use core_types::{PcbStatus, Pid, ProcessControlBlock};
use ipc::{
    decode_pcb, decode_value, encode_pcb, encode_value, serve_connection, ChannelTransport,
    Opcode, Operands, RemoteError, RemoteErrorKind, Reply, RequestHandler, Transport,
};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Serves `handler` on one end of a fresh channel pair and returns the other end.
pub fn serve_in_memory<H>(handler: Arc<H>) -> (Box<dyn Transport>, JoinHandle<()>)
where
    H: RequestHandler + 'static,
{
    let (client, mut server) = ChannelTransport::pair();
    let handle = thread::spawn(move || {
        let _ = serve_connection(&mut server, &*handler);
    });
    (Box::new(client), handle)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Marks a PCB as having run its whole program.
pub fn run_to_exit(mut pcb: ProcessControlBlock) -> ProcessControlBlock {
    pcb.program_counter = pcb.instructions.len() as u32;
    pcb.status = PcbStatus::Terminated;
    pcb
}

type Script = dyn Fn(ProcessControlBlock, usize) -> ProcessControlBlock + Send + Sync;

/// CPU stand-in that answers each dispatched PCB through a script.
///
/// The script receives the PCB and the number of times that pid has been
/// dispatched before.
pub struct ScriptedCpu {
    script: Box<Script>,
    dispatched: Mutex<Vec<Pid>>,
    gate: Option<Mutex<Receiver<()>>>,
}

impl ScriptedCpu {
    pub fn new(
        script: impl Fn(ProcessControlBlock, usize) -> ProcessControlBlock + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            dispatched: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// A CPU that terminates every process immediately.
    pub fn exiting() -> Self {
        Self::new(|pcb, _| run_to_exit(pcb))
    }

    /// Holds every slice until a token is sent on the returned sender.
    pub fn gated(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Mutex::new(rx));
        (self, tx)
    }

    /// Pids in dispatch order.
    pub fn dispatched(&self) -> Vec<Pid> {
        self.dispatched.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl RequestHandler for ScriptedCpu {
    fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply {
        if opcode != Opcode::Pcb {
            return Err(RemoteError::invalid_request(format!("{} not served", opcode)));
        }
        let pcb = decode_pcb(body)?;
        let previous = match self.dispatched.lock() {
            Ok(mut dispatched) => {
                let previous = dispatched.iter().filter(|pid| **pid == pcb.pid).count();
                dispatched.push(pcb.pid);
                previous
            }
            Err(_) => 0,
        };
        if let Some(gate) = &self.gate {
            if let Ok(gate) = gate.lock() {
                let _ = gate.recv();
            }
        }
        let returned = (self.script)(pcb, previous);
        Ok(encode_pcb(&returned)?)
    }
}

/// Interrupt channel stand-in counting INTERRUPT requests.
#[derive(Default)]
pub struct CountingInterrupts {
    count: Mutex<usize>,
}

impl CountingInterrupts {
    pub fn count(&self) -> usize {
        self.count.lock().map(|c| *c).unwrap_or(0)
    }
}

impl RequestHandler for CountingInterrupts {
    fn handle(&self, opcode: Opcode, _body: &[u8]) -> Reply {
        if opcode != Opcode::Interrupt {
            return Err(RemoteError::invalid_request("only INTERRUPT is served"));
        }
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
        Ok(Vec::new())
    }
}

/// Memory stand-in recording Kernel requests and keeping swapped images.
#[derive(Default)]
pub struct RecordingMemory {
    requests: Mutex<Vec<Opcode>>,
    terminated: Mutex<Vec<(Pid, Option<u32>)>>,
    swap: Mutex<HashMap<Pid, Vec<u8>>>,
    next_table: Mutex<u32>,
    reject_swap: bool,
}

impl RecordingMemory {
    /// A memory whose swap-out always fails.
    pub fn rejecting_swap() -> Self {
        Self {
            reject_swap: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Opcode> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.requests().iter().filter(|op| **op == opcode).count()
    }

    /// PROCESS_TERMINATED requests as (pid, page table).
    pub fn terminated(&self) -> Vec<(Pid, Option<u32>)> {
        self.terminated.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl RequestHandler for RecordingMemory {
    fn handle(&self, opcode: Opcode, body: &[u8]) -> Reply {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(opcode);
        }
        match opcode {
            Opcode::MemoryInit => {
                Operands::decode(body)?;
                let mut next = self
                    .next_table
                    .lock()
                    .map_err(|_| RemoteError::new(RemoteErrorKind::Internal, "poisoned"))?;
                let table = *next;
                *next += 1;
                Ok(encode_value(table))
            }
            Opcode::SwapPcb => {
                if self.reject_swap {
                    return Err(RemoteError::new(RemoteErrorKind::SwapFailed, "swap disabled"));
                }
                let pcb = decode_pcb(body)?;
                if let Ok(mut swap) = self.swap.lock() {
                    swap.insert(pcb.pid, body.to_vec());
                }
                Ok(Vec::new())
            }
            Opcode::RetrieveSwappedPcb => {
                let pid = Pid::new(decode_value(body)?);
                self.swap
                    .lock()
                    .ok()
                    .and_then(|swap| swap.get(&pid).cloned())
                    .ok_or_else(|| {
                        RemoteError::new(RemoteErrorKind::ProcessNotFound, pid.to_string())
                    })
            }
            Opcode::ProcessTerminated => {
                let entry = if body.len() == Operands::LEN {
                    let operands = Operands::decode(body)?;
                    (Pid::new(operands.first), Some(operands.second))
                } else {
                    (Pid::new(decode_value(body)?), None)
                };
                if let Ok(mut swap) = self.swap.lock() {
                    swap.remove(&entry.0);
                }
                if let Ok(mut terminated) = self.terminated.lock() {
                    terminated.push(entry);
                }
                Ok(Vec::new())
            }
            other => Err(RemoteError::invalid_request(format!("{} not served", other))),
        }
    }
}
