//! # Command Line
//!
//! Arguments accepted by the daemon. Parsing is kept apart from `main` so
//! it can be tested.

use sim_logger::LogLevel;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Argument errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Invalid module: {0} (expected kernel, cpu or memory)")]
    InvalidModule(String),

    #[error("Invalid program '{0}' (expected <size>:<path>)")]
    InvalidProgram(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("--module is required")]
    MissingModule,
}

/// Which unit this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Kernel,
    Cpu,
    Memory,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Kernel => "kernel",
            ModuleKind::Cpu => "cpu",
            ModuleKind::Memory => "memory",
        }
    }
}

impl FromStr for ModuleKind {
    type Err = ArgsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "kernel" => Ok(ModuleKind::Kernel),
            "cpu" => Ok(ModuleKind::Cpu),
            "memory" => Ok(ModuleKind::Memory),
            _ => Err(ArgsError::InvalidModule(raw.to_string())),
        }
    }
}

/// A program to submit at Kernel startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    /// Declared process size in bytes
    pub size: u32,
    /// Instruction file
    pub path: PathBuf,
}

impl FromStr for ProgramSpec {
    type Err = ArgsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ArgsError::InvalidProgram(raw.to_string());
        let (size, path) = raw.split_once(':').ok_or_else(invalid)?;
        if path.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            size: size.parse().map_err(|_| invalid())?,
            path: PathBuf::from(path),
        })
    }
}

/// Daemon options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    pub module: ModuleKind,
    /// JSON configuration file; defaults apply when absent
    pub config_path: Option<PathBuf>,
    /// Overrides the configured log level
    pub log_level: Option<LogLevel>,
    pub programs: Vec<ProgramSpec>,
    /// Kernel only: stop once every submitted program has terminated
    pub exit_on_idle: bool,
}

/// Outcome of parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(DaemonOptions),
    Help,
}

fn value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str, ArgsError> {
    args.get(i)
        .map(String::as_str)
        .ok_or(ArgsError::MissingValue(flag))
}

/// Parses `args`, where `args[0]` is the program name
pub fn parse_args(args: &[String]) -> Result<Command, ArgsError> {
    let mut module = None;
    let mut config_path = None;
    let mut log_level = None;
    let mut programs: Vec<ProgramSpec> = Vec::new();
    let mut exit_on_idle = false;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--module" | "-m" => {
                i += 1;
                module = Some(value(args, i, "--module")?.parse::<ModuleKind>()?);
            }
            "--config" | "-c" => {
                i += 1;
                config_path = Some(PathBuf::from(value(args, i, "--config")?));
            }
            "--program" | "-p" => {
                i += 1;
                programs.push(value(args, i, "--program")?.parse::<ProgramSpec>()?);
            }
            "--log-level" => {
                i += 1;
                let raw = value(args, i, "--log-level")?;
                log_level = Some(
                    raw.parse::<LogLevel>()
                        .map_err(|_| ArgsError::InvalidLogLevel(raw.to_string()))?,
                );
            }
            "--exit-on-idle" => {
                exit_on_idle = true;
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(ArgsError::UnknownOption(other.to_string())),
        }
        i += 1;
    }

    Ok(Command::Run(DaemonOptions {
        module: module.ok_or(ArgsError::MissingModule)?,
        config_path,
        log_level,
        programs,
        exit_on_idle,
    }))
}

/// Usage text
pub fn usage(program: &str) -> String {
    [
        format!("Usage: {} --module <kernel|cpu|memory> [OPTIONS]", program),
        String::new(),
        "Options:".to_string(),
        "  -m, --module <MODULE>     Unit to run: kernel, cpu or memory".to_string(),
        "  -c, --config <FILE>       JSON configuration file".to_string(),
        "  -p, --program <SIZE:FILE> Program to submit (kernel only, repeatable)".to_string(),
        "  --log-level <LEVEL>       trace, debug, info, warn or error".to_string(),
        "  --exit-on-idle            Kernel stops once every program has finished".to_string(),
        "  -h, --help                Show this help message".to_string(),
        String::new(),
        "Examples:".to_string(),
        format!("  {} --module memory --config osim.json", program),
        format!("  {} --module kernel -p 256:programs/demo.txt --exit-on-idle", program),
    ]
    .join("\n")
}
