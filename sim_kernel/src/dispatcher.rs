//! Short-term scheduler.
//!
//! Picks the next Ready process through the configured policy, hands it to
//! the CPU and routes it by the status it comes back with.

use crate::error::KernelError;
use crate::kernel::{lock, ExecutingSlice, Kernel};
use crate::policy::{next_estimate, ReadyPolicy};
use crate::state::ProcessLocation;
use core_types::{PcbStatus, ProcessControlBlock};
use log::{debug, error, info, trace, warn};
use std::time::Instant;

impl Kernel {
    pub(crate) fn run_short_term(&self) {
        trace!("[STS] Initializing Short Term Scheduler");
        while !self.is_shutting_down() {
            match self.ready.wait_non_empty(self.settings.dispatch_backoff) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }
            let policy = self.settings.policy;
            if let Some(pcb) = self.ready.with_items(|items| policy.select_next(items)) {
                self.execute(pcb);
            }
        }
        trace!("[STS] Stopped");
    }

    /// Runs one execution slice and routes the process afterwards.
    pub(crate) fn execute(&self, mut pcb: ProcessControlBlock) {
        let pid = pcb.pid;
        let page_table = pcb.page_table;
        let estimation_ms = pcb.estimation_ms;

        pcb.status = PcbStatus::Executing;
        if let Err(err) = self.table.move_to(pid, ProcessLocation::Executing) {
            error!("[STS] {}; dropping stray PCB", err);
            return;
        }

        let started = Instant::now();
        *lock(&self.executing) = Some(ExecutingSlice {
            pid,
            estimation_ms,
            started,
        });
        info!("[STS] Executing {}", pid);

        let result = self.dispatch.execute(&pcb);
        drop(pcb);

        let real_ms = started.elapsed().as_millis() as u64;
        *lock(&self.executing) = None;

        let mut returned = match result {
            Ok(returned) if returned.pid == pid => returned,
            Ok(returned) => {
                let err = KernelError::PidMismatch {
                    expected: pid,
                    actual: returned.pid,
                };
                error!("[STS] {}; terminating {}", err, pid);
                self.terminate(pid, page_table);
                return;
            }
            Err(err) => {
                error!("[STS] {} could not be executed: {}", pid, err);
                self.terminate(pid, page_table);
                return;
            }
        };
        returned.real_burst_ms = real_ms;

        match returned.status {
            PcbStatus::Blocked => {
                returned.estimation_ms = next_estimate(self.settings.alpha, real_ms, estimation_ms);
                debug!(
                    "[STS] {} blocked for {}ms, next estimate {}ms",
                    pid, returned.io_duration_ms, returned.estimation_ms
                );
                if let Err(err) = self.table.move_to(pid, ProcessLocation::Blocked) {
                    warn!("[STS] {}", err);
                    return;
                }
                self.blocked.push(returned);
                self.io_ready.release();
            }
            PcbStatus::Terminated => {
                self.terminate(pid, returned.page_table.or(page_table));
            }
            PcbStatus::Ready => {
                returned.estimation_ms = estimation_ms.saturating_sub(real_ms);
                debug!(
                    "[STS] {} preempted, {}ms estimated remaining",
                    pid, returned.estimation_ms
                );
                if let Err(err) = self.table.move_to(pid, ProcessLocation::Ready) {
                    warn!("[STS] {}", err);
                    return;
                }
                self.ready.push(returned);
            }
            status => {
                let err = KernelError::CorruptedPcb { pid, status };
                error!("[STS] {}; terminating", err);
                self.terminate(pid, page_table);
            }
        }
    }
}
