//! I/O device and medium-term scheduler.
//!
//! Blocked processes are served one at a time in arrival order. A burst
//! longer than `max_blocked_ms` suspends the process first: its image goes
//! to swap and its slot is freed until the LTS resumes it.

use crate::kernel::{Kernel, SuspendedProcess};
use crate::state::ProcessLocation;
use core_types::ProcessControlBlock;
use log::{debug, info, trace, warn};
use std::time::Duration;

impl Kernel {
    pub(crate) fn run_io_device(&self) {
        trace!("[IO] Initializing I/O device");
        loop {
            if self.io_ready.acquire().is_err() {
                break;
            }
            let Some(pcb) = self.blocked.pop() else {
                continue;
            };
            self.serve_io(pcb);
        }
        trace!("[IO] Stopped");
    }

    fn serve_io(&self, pcb: ProcessControlBlock) {
        let duration = Duration::from_millis(u64::from(pcb.io_duration_ms));
        if u64::from(pcb.io_duration_ms) > self.settings.max_blocked_ms {
            match self.suspend(pcb) {
                Ok(record) => {
                    self.pause(duration);
                    self.unsuspend(record);
                }
                Err(pcb) => {
                    self.pause(duration);
                    self.finish_io(pcb);
                }
            }
        } else {
            debug!("[IO] {} doing I/O for {:?}", pcb.pid, duration);
            self.pause(duration);
            self.finish_io(pcb);
        }
    }

    /// Swaps a blocked process out. On failure the PCB is handed back.
    fn suspend(&self, pcb: ProcessControlBlock) -> Result<SuspendedProcess, ProcessControlBlock> {
        if let Err(err) = self.memory.swap_out(&pcb) {
            warn!("[SWAP] {} stays resident, swap-out failed: {}", pcb.pid, err);
            return Err(pcb);
        }
        let record = SuspendedProcess {
            pid: pcb.pid,
            page_table: pcb.page_table,
        };
        if let Err(err) = self
            .table
            .move_to(record.pid, ProcessLocation::SuspendedBlocked)
        {
            warn!("[SWAP] {}", err);
            return Err(pcb);
        }
        drop(pcb);
        self.dom.release();
        info!("[SWAP] {} suspended, slot freed", record.pid);
        Ok(record)
    }

    fn unsuspend(&self, record: SuspendedProcess) {
        if self.is_shutting_down() {
            return;
        }
        if let Err(err) = self
            .table
            .move_to(record.pid, ProcessLocation::SuspendedReady)
        {
            warn!("[SWAP] {}", err);
            return;
        }
        self.suspended_ready.push(record);
        self.req_admit.release();
        debug!("[SWAP] {} is Suspended-Ready", record.pid);
    }

    fn finish_io(&self, pcb: ProcessControlBlock) {
        if self.is_shutting_down() {
            return;
        }
        debug!("[IO] {} finished I/O", pcb.pid);
        self.make_ready(pcb);
    }
}
