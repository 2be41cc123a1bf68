//! Ready-queue ordering policies.
//!
//! Policies are a closed set. Adding one means adding a variant here.

use core_types::ProcessControlBlock;
use sim_config::SchedulingPolicyKind;
use std::collections::VecDeque;

/// Selects the next process to run from the Ready queue.
pub trait ReadyPolicy {
    /// Removes and returns the next process, if any.
    fn select_next(
        &self,
        ready: &mut VecDeque<ProcessControlBlock>,
    ) -> Option<ProcessControlBlock>;

    /// Whether a newly ready process may preempt the running one.
    fn is_preemptive(&self) -> bool;
}

/// The available ordering policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// Arrival order
    Fifo,
    /// Shortest remaining time first
    Srt,
}

impl SchedulingPolicy {
    /// Whether `candidate` should interrupt a process whose remaining
    /// estimate is `executing_remaining_ms`.
    pub fn should_preempt(&self, candidate_estimation_ms: u64, executing_remaining_ms: u64) -> bool {
        self.is_preemptive() && candidate_estimation_ms < executing_remaining_ms
    }
}

impl ReadyPolicy for SchedulingPolicy {
    fn select_next(
        &self,
        ready: &mut VecDeque<ProcessControlBlock>,
    ) -> Option<ProcessControlBlock> {
        match self {
            SchedulingPolicy::Fifo => ready.pop_front(),
            SchedulingPolicy::Srt => {
                // slice::sort_by_key is stable; equal estimates keep arrival order
                ready
                    .make_contiguous()
                    .sort_by_key(|pcb| pcb.estimation_ms);
                ready.pop_front()
            }
        }
    }

    fn is_preemptive(&self) -> bool {
        matches!(self, SchedulingPolicy::Srt)
    }
}

impl From<SchedulingPolicyKind> for SchedulingPolicy {
    fn from(kind: SchedulingPolicyKind) -> Self {
        match kind {
            SchedulingPolicyKind::Fifo => SchedulingPolicy::Fifo,
            SchedulingPolicyKind::Srt => SchedulingPolicy::Srt,
        }
    }
}

/// Exponential average used after a slice that ended in I/O.
pub fn next_estimate(alpha: f64, real_ms: u64, previous_ms: u64) -> u64 {
    let estimate = alpha * real_ms as f64 + (1.0 - alpha) * previous_ms as f64;
    estimate.round().max(0.0) as u64
}
