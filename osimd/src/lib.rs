//! # Simulator Daemon
//!
//! This crate provides the `osimd` binary, which runs one unit of the
//! simulator per process.
//!
//! ## Philosophy
//!
//! - **One unit per process**: Kernel, CPU and Memory only meet on the wire
//! - **Configuration first**: Nothing starts until the configuration validates
//! - **Thin bootstrap**: Wiring only; behavior lives in the unit crates
//!
//! ## Startup Order
//!
//! Memory first, then the CPU (which asks Memory for its geometry), then
//! the Kernel with its programs.

pub mod args;
pub mod runtime;

pub use args::{parse_args, usage, ArgsError, Command, DaemonOptions, ModuleKind, ProgramSpec};
pub use runtime::{load_program, Daemon, DaemonError};
