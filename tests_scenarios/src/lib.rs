//! Scenario Test Utilities
//!
//! This crate provides shared utilities for end-to-end tests of the three
//! simulator units.
//!
//! ## Test Philosophy
//!
//! - **Real wire**: Scenarios run Kernel, CPU and Memory over loopback TCP
//! - **Observable invariants**: Assertions use public snapshots, never internals
//! - **Isolated state**: Every cluster gets its own swap directory

use ipc::{TcpTransport, Transport};
use sim_config::MemoryConfig;
use sim_cpu::{CpuSettings, CpuUnit};
use sim_kernel::{Kernel, KernelLinks, KernelSettings};
use sim_memory::MemoryController;
use std::net::TcpListener;
use sim_logger::{LogLevel, Logger, MemoryLog};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

/// Generous upper bound for a scenario to finish
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

/// Captures every log record of this test binary
///
/// The first caller installs the logger; later callers share it.
pub fn capture_logs() -> &'static MemoryLog {
    static LOG: OnceLock<MemoryLog> = OnceLock::new();
    LOG.get_or_init(|| {
        let (logger, log) = Logger::memory("scenario", LogLevel::Debug);
        let _ = sim_logger::install(logger);
        log
    })
}

/// Kernel settings suited to fast tests
pub fn fast_kernel_settings() -> KernelSettings {
    KernelSettings {
        degree_of_multiprogramming: 2,
        initial_estimation_ms: 100,
        max_blocked_ms: 1_000,
        dispatch_backoff: Duration::from_millis(5),
        ..KernelSettings::default()
    }
}

/// CPU settings suited to fast tests
pub fn fast_cpu_settings() -> CpuSettings {
    CpuSettings {
        no_op_delay: Duration::from_millis(1),
        tlb_entries: 4,
    }
}

/// Kernel, CPU and Memory running on loopback
pub struct Cluster {
    pub kernel: Arc<Kernel>,
    pub memory: Arc<MemoryController>,
    pub cpu: CpuUnit,
    memory_server: ipc::Server,
    swap_dir: TempDir,
}

impl Cluster {
    /// Starts all three units and the Kernel threads
    pub fn start(kernel_settings: KernelSettings) -> Cluster {
        let swap_dir = TempDir::new().expect("swap dir");
        let config = MemoryConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            swap_dir: swap_dir.path().to_path_buf(),
            ..MemoryConfig::default()
        };
        let (memory, memory_server) = sim_memory::start(&config).expect("memory unit");

        let cpu_memory = TcpTransport::connect(memory_server.local_addr()).expect("cpu link");
        let cpu = CpuUnit::start_on(
            fast_cpu_settings(),
            Box::new(cpu_memory),
            TcpListener::bind("127.0.0.1:0").expect("dispatch port"),
            TcpListener::bind("127.0.0.1:0").expect("interrupt port"),
        )
        .expect("cpu unit");

        let link = |addr| -> Box<dyn Transport> {
            Box::new(TcpTransport::connect(addr).expect("kernel link"))
        };
        let kernel = Kernel::new(
            kernel_settings,
            KernelLinks {
                memory: Some(link(memory_server.local_addr())),
                dispatch: link(cpu.dispatch_addr()),
                interrupt: Some(link(cpu.interrupt_addr())),
            },
        );
        kernel.start().expect("kernel threads");

        Cluster {
            kernel,
            memory,
            cpu,
            memory_server,
            swap_dir,
        }
    }

    pub fn swap_dir(&self) -> &std::path::Path {
        self.swap_dir.path()
    }

    pub fn memory_addr(&self) -> std::net::SocketAddr {
        self.memory_server.local_addr()
    }

    /// Stops the Kernel first, then the CPU, then Memory
    pub fn shutdown(mut self) {
        self.kernel.shutdown();
        self.cpu.stop();
        self.memory_server.stop();
    }
}
