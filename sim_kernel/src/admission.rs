//! Long-term scheduler.
//!
//! Waits for an admission request, then for a free multiprogramming slot,
//! then moves one process into Ready. Suspended processes are resumed
//! ahead of new ones.

use crate::kernel::{lock, Kernel, SuspendedProcess};
use crate::state::ProcessLocation;
use core_types::{PageTableId, PcbStatus, Pid, ProcessControlBlock};
use log::{debug, error, info, trace, warn};

impl Kernel {
    pub(crate) fn run_long_term(&self) {
        trace!("[LTS] Initializing Long Term Scheduler");
        loop {
            debug!("[LTS] Waiting for a process...");
            if self.req_admit.acquire().is_err() {
                break;
            }

            let slots = self.dom.value();
            if slots > 0 {
                debug!("[LTS] Available slots: [{}] -> Admitting...", slots);
            } else {
                debug!("[LTS] No available slots, waiting for one to free");
            }
            if self.dom.acquire().is_err() {
                break;
            }

            if !self.admit() {
                warn!("[LTS] No process to admit; returning the slot");
                self.dom.release();
            }
        }
        trace!("[LTS] Stopped");
    }

    /// Admits one process. Returns false if there was none to admit.
    ///
    /// PCBs left in the New queue by a process terminated before admission
    /// are discarded without asking Memory for a table.
    pub(crate) fn admit(&self) -> bool {
        if let Some(pcb) = self.resume() {
            return self.make_ready(pcb);
        }
        while let Some(pcb) = self.new_queue.pop() {
            if self.table.location(pcb.pid) != Some(ProcessLocation::New) {
                debug!("[LTS] {} was terminated before admission", pcb.pid);
                continue;
            }
            let pcb = self.attach_page_table(pcb);
            let (pid, page_table) = (pcb.pid, pcb.page_table);
            if self.make_ready(pcb) {
                return true;
            }
            // Terminated while its table was being created
            self.release_memory(pid, page_table);
            return false;
        }
        false
    }

    fn release_memory(&self, pid: Pid, page_table: Option<PageTableId>) {
        if !self.memory.is_connected() {
            return;
        }
        if let Err(err) = self.memory.process_terminated(pid, page_table) {
            warn!("[LTS] Memory could not release {}: {}", pid, err);
        }
    }

    /// Brings back the oldest Suspended-Ready process, if any.
    ///
    /// A process whose image cannot be read back is destroyed.
    fn resume(&self) -> Option<ProcessControlBlock> {
        while let Some(SuspendedProcess { pid, page_table }) = self.suspended_ready.pop() {
            match self.memory.retrieve(pid) {
                Ok(pcb) => {
                    info!("[LTS] {} resumed from swap", pid);
                    return Some(pcb);
                }
                Err(err) => {
                    error!("[LTS] Could not resume {}: {}", pid, err);
                    self.terminate(pid, page_table);
                }
            }
        }
        None
    }

    fn attach_page_table(&self, mut pcb: ProcessControlBlock) -> ProcessControlBlock {
        if !self.memory.is_connected() {
            warn!("[LTS] Memory is not connected; {} admitted without page table", pcb.pid);
            return pcb;
        }
        match self.memory.init_process(pcb.pid, pcb.size) {
            Ok(table) => {
                debug!("[LTS] Page table {} received for {}", table, pcb.pid);
                pcb.page_table = Some(table);
            }
            Err(err) => {
                error!("[LTS] Couldn't receive page table for {}: {}", pcb.pid, err);
            }
        }
        pcb
    }

    /// Marks a process READY, raises a preemption if needed and queues it.
    ///
    /// Returns false if the process is no longer registered; the PCB is
    /// dropped.
    pub(crate) fn make_ready(&self, mut pcb: ProcessControlBlock) -> bool {
        let pid = pcb.pid;
        pcb.status = PcbStatus::Ready;
        if let Err(err) = self.table.move_to(pid, ProcessLocation::Ready) {
            error!("[LTS] {}; dropping stray PCB", err);
            return false;
        }
        self.check_interruption(&pcb);
        self.ready.push(pcb);
        info!("[LTS] {} moved to Ready queue", pid);
        true
    }

    /// Interrupts the CPU if `candidate` should run before the current slice.
    fn check_interruption(&self, candidate: &ProcessControlBlock) {
        if !self.interrupt.is_connected() {
            return;
        }
        let remaining = match *lock(&self.executing) {
            Some(slice) => {
                let elapsed = slice.started.elapsed().as_millis() as u64;
                slice.estimation_ms.saturating_sub(elapsed)
            }
            None => return,
        };
        if self
            .settings
            .policy
            .should_preempt(candidate.estimation_ms, remaining)
        {
            info!(
                "[LTS] {} (estimate {}ms) preempts the running slice ({}ms left)",
                candidate.pid, candidate.estimation_ms, remaining
            );
            if let Err(err) = self.interrupt.interrupt() {
                warn!("[LTS] Interrupt could not be delivered: {}", err);
            }
        }
    }
}
