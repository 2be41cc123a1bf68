//! # Daemon Runtime
//!
//! Loads configuration, installs logging and runs one unit until it is
//! asked to stop.

use crate::args::{DaemonOptions, ModuleKind, ProgramSpec};
use core_types::{parse_program, Instruction, ParseInstructionError};
use ipc::{TcpTransport, Transport, WireError};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use sim_config::{ConfigError, SimConfig};
use sim_cpu::{CpuError, CpuUnit};
use sim_kernel::{Kernel, KernelError, KernelLinks, KernelSettings};
use sim_memory::MemoryUnitError;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not read program {path}: {source}")]
    ProgramRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid program {path}: {source}")]
    ProgramParse {
        path: PathBuf,
        #[source]
        source: ParseInstructionError,
    },

    #[error("Connection failed: {0}")]
    Wire(#[from] WireError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("CPU error: {0}")]
    Cpu(#[from] CpuError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryUnitError),

    #[error("Could not install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Reads and parses one program file
pub fn load_program(spec: &ProgramSpec) -> Result<Vec<Instruction>, DaemonError> {
    let text = fs::read_to_string(&spec.path).map_err(|source| DaemonError::ProgramRead {
        path: spec.path.clone(),
        source,
    })?;
    parse_program(&text).map_err(|source| DaemonError::ProgramParse {
        path: spec.path.clone(),
        source,
    })
}

/// One simulator unit
pub struct Daemon {
    options: DaemonOptions,
    config: SimConfig,
    stop: Arc<AtomicBool>,
}

impl Daemon {
    /// Loads and validates the configuration named by `options`
    pub fn new(options: DaemonOptions) -> Result<Self, DaemonError> {
        let mut config = match &options.config_path {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(level) = options.log_level {
            config.logging.level = level;
        }
        config.validate()?;
        Ok(Self {
            options,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Flag that stops [`run`](Self::run) once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Sets the stop flag on SIGINT or SIGTERM so the unit tears down in order
    pub fn stop_on_signals(&self) -> Result<(), DaemonError> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.stop))
                .map_err(DaemonError::Signal)?;
        }
        Ok(())
    }

    /// Installs the process-wide logger for this unit
    pub fn init_logging(&self) {
        if let Err(err) = sim_logger::init(self.options.module.as_str(), self.config.logging.level)
        {
            eprintln!("Logger not installed: {}", err);
        }
    }

    /// Runs the configured unit until stopped
    pub fn run(&self) -> Result<(), DaemonError> {
        info!("Starting {} unit", self.options.module.as_str());
        match self.options.module {
            ModuleKind::Memory => self.run_memory(),
            ModuleKind::Cpu => self.run_cpu(),
            ModuleKind::Kernel => self.run_kernel(),
        }
    }

    fn wait_for_stop(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            thread::sleep(IDLE_POLL);
        }
        info!("Stop requested, shutting down");
    }

    fn run_memory(&self) -> Result<(), DaemonError> {
        let (_controller, mut server) = sim_memory::start(&self.config.memory)?;
        self.wait_for_stop();
        server.stop();
        Ok(())
    }

    fn run_cpu(&self) -> Result<(), DaemonError> {
        let mut unit = CpuUnit::start(&self.config.cpu)?;
        self.wait_for_stop();
        unit.stop();
        Ok(())
    }

    fn connect(&self, addr: &str) -> Result<Box<dyn Transport>, WireError> {
        let kernel = &self.config.kernel;
        let transport = TcpTransport::connect_with_retry(
            addr,
            Duration::from_millis(kernel.connect_backoff_ms),
            kernel.connect_attempts,
        )?;
        Ok(Box::new(transport))
    }

    fn run_kernel(&self) -> Result<(), DaemonError> {
        let programs = self
            .options
            .programs
            .iter()
            .map(|spec| load_program(spec).map(|program| (spec.size, program)))
            .collect::<Result<Vec<_>, _>>()?;

        let kernel_config = &self.config.kernel;
        let memory = match self.connect(&kernel_config.memory_addr) {
            Ok(link) => Some(link),
            Err(err) => {
                error!("[LTS] Memory unreachable, running degraded: {}", err);
                None
            }
        };
        let dispatch = self.connect(&kernel_config.cpu_dispatch_addr)?;
        let interrupt = match self.connect(&kernel_config.cpu_interrupt_addr) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!("[STS] Interrupt channel unavailable: {}", err);
                None
            }
        };

        let kernel = Kernel::new(
            KernelSettings::from(kernel_config),
            KernelLinks {
                memory,
                dispatch,
                interrupt,
            },
        );
        kernel.start()?;

        for (size, program) in programs {
            kernel.submit(size, program)?;
        }

        while !self.stop.load(Ordering::SeqCst) {
            if self.options.exit_on_idle && kernel.is_idle() {
                info!("All processes finished");
                break;
            }
            thread::sleep(IDLE_POLL);
        }
        kernel.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn options(module: ModuleKind) -> DaemonOptions {
        DaemonOptions {
            module,
            config_path: None,
            log_level: None,
            programs: Vec::new(),
            exit_on_idle: false,
        }
    }

    #[test]
    fn test_load_program() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "NO_OP 2\nWRITE 100 42\nEXIT").unwrap();
        let spec = ProgramSpec {
            size: 256,
            path: file.path().to_path_buf(),
        };
        let program = load_program(&spec).unwrap();
        assert_eq!(program.len(), 4);
    }

    #[test]
    fn test_load_program_errors() {
        let missing = ProgramSpec {
            size: 1,
            path: PathBuf::from("/nonexistent/osim/program.txt"),
        };
        assert!(matches!(
            load_program(&missing),
            Err(DaemonError::ProgramRead { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "JUMP 3").unwrap();
        let bad = ProgramSpec {
            size: 1,
            path: file.path().to_path_buf(),
        };
        assert!(matches!(
            load_program(&bad),
            Err(DaemonError::ProgramParse { .. })
        ));
    }

    #[test]
    fn test_log_level_override() {
        let mut options = options(ModuleKind::Cpu);
        options.log_level = Some(sim_logger::LogLevel::Trace);
        let daemon = Daemon::new(options).unwrap();
        assert_eq!(daemon.config().logging.level, sim_logger::LogLevel::Trace);
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();
        let mut options = options(ModuleKind::Memory);
        options.config_path = Some(file.path().to_path_buf());
        assert!(matches!(Daemon::new(options), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_memory_unit_stops_on_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SimConfig::default();
        config.memory.listen_addr = "127.0.0.1:0".to_string();
        config.memory.swap_dir = dir.path().to_path_buf();
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let mut options = options(ModuleKind::Memory);
        options.config_path = Some(file.path().to_path_buf());
        let daemon = Daemon::new(options).unwrap();
        let stop = daemon.stop_handle();

        let runner = thread::spawn(move || daemon.run());
        thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::SeqCst);
        assert!(runner.join().unwrap().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_termination_signal_stops_unit() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SimConfig::default();
        config.memory.listen_addr = "127.0.0.1:0".to_string();
        config.memory.swap_dir = dir.path().to_path_buf();
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let mut options = options(ModuleKind::Memory);
        options.config_path = Some(file.path().to_path_buf());
        let daemon = Daemon::new(options).unwrap();
        daemon.stop_on_signals().unwrap();
        let stop = daemon.stop_handle();

        let runner = thread::spawn(move || daemon.run());
        thread::sleep(Duration::from_millis(100));
        signal_hook::low_level::raise(SIGTERM).unwrap();

        assert!(runner.join().unwrap().is_ok());
        assert!(stop.load(Ordering::SeqCst));
    }
}
