//! # Simulator Configuration
//!
//! Typed configuration for the Kernel, CPU and Memory units.
//!
//! ## Philosophy
//!
//! - **Typed settings**: Every key has an explicit type, not a string lookup
//! - **Layered**: Read-only defaults, overridden by a JSON document
//! - **Validated**: Impossible geometry is rejected before any unit starts
//! - **Deterministic**: Configuration is serializable and reproducible
//!
//! ## Example
//!
//! ```ignore
//! use sim_config::SimConfig;
//!
//! let config = SimConfig::load("osim.json")?;
//! let geometry = config.memory.frame_count();
//! ```

pub mod persistence;

pub use persistence::{deserialize_config, serialize_config};
pub use sim_logger::LogLevel;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize configuration: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported configuration version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ready-queue ordering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicyKind {
    /// Arrival order
    Fifo,
    /// Shortest remaining time first, preemptive
    Srt,
}

impl FromStr for SchedulingPolicyKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "fifo" => Ok(SchedulingPolicyKind::Fifo),
            "srt" => Ok(SchedulingPolicyKind::Srt),
            other => Err(ConfigError::Invalid(format!(
                "unknown scheduling policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SchedulingPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicyKind::Fifo => f.write_str("FIFO"),
            SchedulingPolicyKind::Srt => f.write_str("SRT"),
        }
    }
}

/// Kernel unit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Memory unit address
    pub memory_addr: String,
    /// CPU dispatch channel address
    pub cpu_dispatch_addr: String,
    /// CPU interrupt channel address
    pub cpu_interrupt_addr: String,
    /// Maximum number of admitted processes
    pub degree_of_multiprogramming: u32,
    /// Ready-queue ordering
    pub scheduling_policy: SchedulingPolicyKind,
    /// Burst estimate given to every new process
    pub initial_estimation_ms: u64,
    /// Weight of the last real burst in the next estimate
    pub alpha: f64,
    /// I/O bursts longer than this suspend the process to swap
    pub max_blocked_ms: u64,
    /// Delay between empty Ready-queue polls
    pub dispatch_backoff_ms: u64,
    /// Delay between connection attempts
    pub connect_backoff_ms: u64,
    /// Connection attempts before giving up; zero retries forever
    pub connect_attempts: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            memory_addr: "127.0.0.1:8002".to_string(),
            cpu_dispatch_addr: "127.0.0.1:8001".to_string(),
            cpu_interrupt_addr: "127.0.0.1:8005".to_string(),
            degree_of_multiprogramming: 4,
            scheduling_policy: SchedulingPolicyKind::Fifo,
            initial_estimation_ms: 10_000,
            alpha: 0.5,
            max_blocked_ms: 100_000,
            dispatch_backoff_ms: 50,
            connect_backoff_ms: 500,
            connect_attempts: 0,
        }
    }
}

/// CPU unit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Address the dispatch channel listens on
    pub dispatch_listen_addr: String,
    /// Address the interrupt channel listens on
    pub interrupt_listen_addr: String,
    /// Memory unit address
    pub memory_addr: String,
    /// Busy-wait per NO_OP
    pub no_op_delay_ms: u64,
    /// Number of TLB entries kept
    pub tlb_entries: usize,
    /// Delay between connection attempts
    pub connect_backoff_ms: u64,
    /// Connection attempts before giving up; zero retries forever
    pub connect_attempts: u32,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            dispatch_listen_addr: "127.0.0.1:8001".to_string(),
            interrupt_listen_addr: "127.0.0.1:8005".to_string(),
            memory_addr: "127.0.0.1:8002".to_string(),
            no_op_delay_ms: 100,
            tlb_entries: 4,
            connect_backoff_ms: 500,
            connect_attempts: 0,
        }
    }
}

/// Memory unit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Address the Memory unit listens on
    pub listen_addr: String,
    /// Physical memory size in bytes
    pub memory_size: u32,
    /// Page and frame size in bytes
    pub page_size: u32,
    /// Entries in every Level-1 and Level-2 table
    pub entries_per_table: u32,
    /// Present frames a process may hold
    pub frames_per_process: u32,
    /// Directory holding one swap file per pid
    pub swap_dir: PathBuf,
}

impl MemoryConfig {
    /// Number of physical frames
    pub fn frame_count(&self) -> u32 {
        self.memory_size / self.page_size.max(1)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8002".to_string(),
            memory_size: 4096,
            page_size: 64,
            entries_per_table: 4,
            frames_per_process: 4,
            swap_dir: std::env::temp_dir().join("osim-swap"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

/// Complete configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Version of the configuration format
    pub version: u32,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub cpu: CpuConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimConfig {
    /// Current version of the configuration format
    pub const CURRENT_VERSION: u32 = 1;

    /// Loads and validates a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        let config = deserialize_config(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let bytes = serialize_config(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Rejects configurations no unit can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != Self::CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }

        let memory = &self.memory;
        if memory.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be non-zero".to_string()));
        }
        if memory.page_size < 4 {
            return Err(ConfigError::Invalid(
                "page_size must hold at least one 4-byte value".to_string(),
            ));
        }
        if memory.memory_size == 0 || memory.memory_size % memory.page_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "memory_size {} is not a non-zero multiple of page_size {}",
                memory.memory_size, memory.page_size
            )));
        }
        if memory.entries_per_table == 0 {
            return Err(ConfigError::Invalid(
                "entries_per_table must be non-zero".to_string(),
            ));
        }
        if memory.frames_per_process == 0 {
            return Err(ConfigError::Invalid(
                "frames_per_process must be non-zero".to_string(),
            ));
        }

        let kernel = &self.kernel;
        if kernel.degree_of_multiprogramming == 0 {
            return Err(ConfigError::Invalid(
                "degree_of_multiprogramming must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&kernel.alpha) {
            return Err(ConfigError::Invalid(format!(
                "alpha {} is outside [0, 1]",
                kernel.alpha
            )));
        }

        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            kernel: KernelConfig::default(),
            cpu: CpuConfig::default(),
            memory: MemoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
