//! The Kernel context.
//!
//! One [`Kernel`] is shared by reference counting between the admission,
//! dispatch and I/O threads. All of its state is behind its own locks.

use crate::clients::{CpuClient, InterruptClient, MemoryClient};
use crate::error::KernelError;
use crate::policy::SchedulingPolicy;
use crate::state::{ProcessLocation, ProcessTable};
use crate::sync::{SafeQueue, Semaphore};
use core_types::{Instruction, PageTableId, Pid, ProcessControlBlock};
use ipc::Transport;
use log::{debug, info, trace, warn};
use sim_config::KernelConfig;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PAUSE_STEP: Duration = Duration::from_millis(10);

/// Scheduling parameters of a Kernel.
#[derive(Debug, Clone)]
pub struct KernelSettings {
    pub degree_of_multiprogramming: u32,
    pub policy: SchedulingPolicy,
    pub initial_estimation_ms: u64,
    pub alpha: f64,
    pub max_blocked_ms: u64,
    pub dispatch_backoff: Duration,
    /// First pid handed out by the pool
    pub first_pid: u32,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self::from(&KernelConfig::default())
    }
}

impl From<&KernelConfig> for KernelSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            degree_of_multiprogramming: config.degree_of_multiprogramming,
            policy: config.scheduling_policy.into(),
            initial_estimation_ms: config.initial_estimation_ms,
            alpha: config.alpha,
            max_blocked_ms: config.max_blocked_ms,
            dispatch_backoff: Duration::from_millis(config.dispatch_backoff_ms),
            first_pid: 0,
        }
    }
}

/// Connections the Kernel talks through.
pub struct KernelLinks {
    /// Memory unit; `None` runs degraded, without page tables
    pub memory: Option<Box<dyn Transport>>,
    /// CPU dispatch channel
    pub dispatch: Box<dyn Transport>,
    /// CPU interrupt channel; `None` disables preemption signals
    pub interrupt: Option<Box<dyn Transport>>,
}

/// A process that was swapped out to free its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendedProcess {
    pub pid: Pid,
    pub page_table: Option<PageTableId>,
}

/// The slice currently on the CPU.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutingSlice {
    pub pid: Pid,
    pub estimation_ms: u64,
    pub started: Instant,
}

/// Point-in-time view of the scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSnapshot {
    pub new: Vec<Pid>,
    pub ready: Vec<Pid>,
    pub executing: Vec<Pid>,
    pub blocked: Vec<Pid>,
    pub suspended_blocked: Vec<Pid>,
    pub suspended_ready: Vec<Pid>,
    pub free_slots: i64,
    pub terminated: Vec<Pid>,
}

impl KernelSnapshot {
    /// Processes holding a multiprogramming slot.
    pub fn admitted(&self) -> usize {
        self.ready.len() + self.executing.len() + self.blocked.len()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Kernel unit: process lifecycle and scheduling.
pub struct Kernel {
    pub(crate) settings: KernelSettings,
    next_pid: AtomicU32,
    pub(crate) new_queue: SafeQueue<ProcessControlBlock>,
    pub(crate) ready: SafeQueue<ProcessControlBlock>,
    pub(crate) blocked: SafeQueue<ProcessControlBlock>,
    pub(crate) suspended_ready: SafeQueue<SuspendedProcess>,
    /// Free multiprogramming slots
    pub(crate) dom: Semaphore,
    /// Pending admission requests
    pub(crate) req_admit: Semaphore,
    /// Blocked processes waiting for the I/O device
    pub(crate) io_ready: Semaphore,
    pub(crate) table: ProcessTable,
    pub(crate) executing: Mutex<Option<ExecutingSlice>>,
    pub(crate) memory: MemoryClient,
    pub(crate) dispatch: CpuClient,
    pub(crate) interrupt: InterruptClient,
    shutdown: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    terminated: Mutex<Vec<Pid>>,
    terminated_changed: Condvar,
}

impl Kernel {
    /// Builds a Kernel over already established links.
    pub fn new(settings: KernelSettings, links: KernelLinks) -> Arc<Self> {
        let memory = match links.memory {
            Some(transport) => MemoryClient::connected(transport),
            None => {
                warn!("[LTS] Memory is not connected; admitting without page tables");
                MemoryClient::detached()
            }
        };
        let interrupt = match links.interrupt {
            Some(transport) => InterruptClient::connected(transport),
            None => InterruptClient::detached(),
        };

        Arc::new(Self {
            next_pid: AtomicU32::new(settings.first_pid),
            dom: Semaphore::new(settings.degree_of_multiprogramming),
            req_admit: Semaphore::new(0),
            io_ready: Semaphore::new(0),
            new_queue: SafeQueue::new(),
            ready: SafeQueue::new(),
            blocked: SafeQueue::new(),
            suspended_ready: SafeQueue::new(),
            table: ProcessTable::new(),
            executing: Mutex::new(None),
            memory,
            dispatch: CpuClient::new(links.dispatch),
            interrupt,
            shutdown: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            terminated_changed: Condvar::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// Creates a NEW process and raises an admission request.
    pub fn submit(&self, size: u32, instructions: Vec<Instruction>) -> Result<Pid, KernelError> {
        if self.is_shutting_down() {
            return Err(KernelError::ShuttingDown);
        }
        let pid = Pid::new(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let pcb = ProcessControlBlock::new(
            pid,
            size,
            instructions,
            self.settings.initial_estimation_ms,
        );
        self.table.insert(pid, ProcessLocation::New)?;
        self.new_queue.push(pcb);
        self.req_admit.release();
        info!("[LTS] {} created ({} bytes)", pid, size);
        Ok(pid)
    }

    /// Starts the admission, dispatch and I/O threads.
    pub fn start(self: &Arc<Self>) -> Result<(), KernelError> {
        let workers: [(&str, fn(&Kernel)); 3] = [
            ("lts", Kernel::run_long_term),
            ("sts", Kernel::run_short_term),
            ("io", Kernel::run_io_device),
        ];
        let mut threads = lock(&self.threads);
        for (name, worker) in workers {
            let kernel = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("kernel-{}", name))
                .spawn(move || worker(&kernel))?;
            threads.push(handle);
        }
        info!(
            "Kernel started: dom={}, policy={:?}",
            self.settings.degree_of_multiprogramming, self.settings.policy
        );
        Ok(())
    }

    /// Stops every thread and closes the links.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Kernel shutting down");
        self.req_admit.close();
        self.dom.close();
        self.io_ready.close();
        self.new_queue.close();
        self.ready.close();
        self.blocked.close();
        self.suspended_ready.close();
        // Fails a slice still waiting on the CPU so the STS can exit
        self.dispatch.abort();

        let threads = std::mem::take(&mut *lock(&self.threads));
        for handle in threads {
            let _ = handle.join();
        }

        self.dispatch.close();
        self.interrupt.close();
        self.memory.close();
        self.terminated_changed.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, returning early on shutdown.
    pub(crate) fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_shutting_down() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(PAUSE_STEP.min(deadline - now));
        }
    }

    /// Destroys a process and returns its slot.
    ///
    /// A pid that is no longer registered is ignored, so a second request
    /// for the same process changes nothing.
    ///
    /// Only admitted processes hold a slot; a suspended or NEW one is
    /// released without touching the multiprogramming count.
    pub fn terminate(&self, pid: Pid, page_table: Option<PageTableId>) {
        let Some(location) = self.table.remove(pid) else {
            debug!("[STS] {} already terminated", pid);
            return;
        };

        if location == ProcessLocation::New {
            self.withdraw_new(pid);
        }

        if self.memory.is_connected() {
            if let Err(err) = self.memory.process_terminated(pid, page_table) {
                warn!("[STS] Memory could not release {}: {}", pid, err);
            }
        }

        if location.is_admitted() {
            self.dom.release();
        }

        lock(&self.terminated).push(pid);
        self.terminated_changed.notify_all();
        info!("[STS] {} terminated", pid);
    }

    /// Drops a NEW process's PCB and its pending admission request.
    ///
    /// If the LTS already took the request it finds nothing to admit and
    /// returns the slot.
    fn withdraw_new(&self, pid: Pid) {
        let withdrawn = self.new_queue.with_items(|items| {
            let before = items.len();
            items.retain(|pcb| pcb.pid != pid);
            items.len() != before
        });
        if withdrawn && self.req_admit.try_acquire() {
            trace!("[LTS] Admission request of {} withdrawn", pid);
        }
    }

    /// Pids terminated so far, in order.
    pub fn terminated(&self) -> Vec<Pid> {
        lock(&self.terminated).clone()
    }

    /// Waits until at least `count` processes have terminated.
    pub fn wait_terminated(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut terminated = lock(&self.terminated);
        while terminated.len() < count {
            let now = Instant::now();
            if now >= deadline || self.is_shutting_down() {
                return false;
            }
            terminated = match self.terminated_changed.wait_timeout(terminated, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Whether no live process remains.
    pub fn is_idle(&self) -> bool {
        self.table.is_empty()
    }

    /// Location of a process, if it is live.
    pub fn location(&self, pid: Pid) -> Option<ProcessLocation> {
        self.table.location(pid)
    }

    pub fn snapshot(&self) -> KernelSnapshot {
        KernelSnapshot {
            new: self.table.pids_at(ProcessLocation::New),
            ready: self.table.pids_at(ProcessLocation::Ready),
            executing: self.table.pids_at(ProcessLocation::Executing),
            blocked: self.table.pids_at(ProcessLocation::Blocked),
            suspended_blocked: self.table.pids_at(ProcessLocation::SuspendedBlocked),
            suspended_ready: self.table.pids_at(ProcessLocation::SuspendedReady),
            free_slots: self.dom.value(),
            terminated: self.terminated(),
        }
    }
}
