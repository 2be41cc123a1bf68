//! Fetch, decode and execute
//!
//! The engine runs one PCB until the slice ends: the process blocks on
//! I/O, exits, faults, or an interrupt is seen at the top of a cycle.
//! Memory round-trips already in flight are never cancelled.

use crate::error::CpuError;
use crate::memory::MemoryClient;
use crate::mmu::Mmu;
use core_types::{Instruction, PcbStatus, ProcessControlBlock};
use log::{debug, error, info, trace, warn};
use sim_config::CpuConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Execution parameters of a CPU
#[derive(Debug, Clone)]
pub struct CpuSettings {
    pub no_op_delay: Duration,
    pub tlb_entries: usize,
}

impl From<&CpuConfig> for CpuSettings {
    fn from(config: &CpuConfig) -> Self {
        Self {
            no_op_delay: Duration::from_millis(config.no_op_delay_ms),
            tlb_entries: config.tlb_entries,
        }
    }
}

impl Default for CpuSettings {
    fn default() -> Self {
        Self::from(&CpuConfig::default())
    }
}

/// How a cycle ended
enum Step {
    Continue,
    EndSlice,
}

/// CPU execution engine
pub struct Engine {
    settings: CpuSettings,
    memory: MemoryClient,
    mmu: Mutex<Mmu>,
    interrupt: Arc<AtomicBool>,
}

impl Engine {
    /// Builds an engine and fetches the MMU geometry from Memory
    pub fn new(settings: CpuSettings, memory: MemoryClient) -> Result<Self, CpuError> {
        let mmu = Mmu::from_memory(&memory, settings.tlb_entries)?;
        Ok(Self {
            settings,
            memory,
            mmu: Mutex::new(mmu),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Raises the interrupt flag; it is honored at the next cycle
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn has_interruption(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryClient {
        &self.memory
    }

    pub fn with_mmu<R>(&self, f: impl FnOnce(&mut Mmu) -> R) -> R {
        let mut mmu = match self.mmu.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *mmu)
    }

    /// Runs one execution slice and returns the updated PCB
    pub fn execute(&self, mut pcb: ProcessControlBlock) -> ProcessControlBlock {
        debug!("[CPU] Executing {}...", pcb.pid);
        pcb.status = PcbStatus::Executing;
        self.with_mmu(|mmu| mmu.flush());

        loop {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                warn!("[CPU] Interruption received; returning {}", pcb.pid);
                pcb.status = PcbStatus::Ready;
                return pcb;
            }
            match self.cycle(&mut pcb) {
                Ok(Step::Continue) => {}
                Ok(Step::EndSlice) => return pcb,
                Err(err) => {
                    error!("[CPU] {} terminated: {}", pcb.pid, err);
                    pcb.status = PcbStatus::Terminated;
                    return pcb;
                }
            }
        }
    }

    fn cycle(&self, pcb: &mut ProcessControlBlock) -> Result<Step, CpuError> {
        trace!("[CPU] Fetching instruction...");
        let Some(instruction) = pcb.fetch() else {
            error!("[CPU] {} ran past its last instruction", pcb.pid);
            pcb.status = PcbStatus::Terminated;
            return Ok(Step::EndSlice);
        };

        match instruction {
            Instruction::NoOp => {
                thread::sleep(self.settings.no_op_delay);
                debug!("[CPU] Executed NO_OP");
                Ok(Step::Continue)
            }
            Instruction::Io { duration_ms } => {
                pcb.status = PcbStatus::Blocked;
                pcb.io_duration_ms = duration_ms;
                info!("[CPU] {} requested I/O for {}ms", pcb.pid, duration_ms);
                Ok(Step::EndSlice)
            }
            Instruction::Exit => {
                pcb.status = PcbStatus::Terminated;
                info!("[CPU] {} exited", pcb.pid);
                Ok(Step::EndSlice)
            }
            Instruction::Read { address } => {
                let physical = self.translate(pcb, address)?;
                let value = self.memory.read(physical)?;
                info!("[CPU] Executed READ {} = {}", address, value);
                Ok(Step::Continue)
            }
            Instruction::Write { address, value } => {
                let physical = self.translate(pcb, address)?;
                self.memory.write(physical, value)?;
                info!("[CPU] Executed WRITE {} {}", address, value);
                Ok(Step::Continue)
            }
            Instruction::Copy {
                destination,
                source,
            } => {
                let source_physical = self.translate(pcb, source)?;
                let destination_physical = self.translate(pcb, destination)?;
                debug!("[CPU] Fetching operands...");
                let operands = self
                    .memory
                    .operands(source_physical, destination_physical)?;
                self.memory.write(destination_physical, operands.first)?;
                info!(
                    "[CPU] Executed COPY {} ([{}] => [{}])",
                    operands.first, source, destination
                );
                Ok(Step::Continue)
            }
        }
    }

    fn translate(&self, pcb: &ProcessControlBlock, address: u32) -> Result<u32, CpuError> {
        if address >= pcb.size {
            return Err(CpuError::SegmentationFault {
                pid: pcb.pid,
                address,
                size: pcb.size,
            });
        }
        let table = pcb.page_table.ok_or(CpuError::NoPageTable(pcb.pid))?;
        self.with_mmu(|mmu| mmu.translate(&self.memory, table, address))
    }
}
