//! # Simulated Kernel
//!
//! This crate implements the Kernel unit of the simulator: process
//! lifecycle, admission control and dispatch.
//!
//! ## Philosophy
//!
//! - **One owner at a time**: A process is in exactly one of New, Ready,
//!   Executing, Blocked or suspended, and the [`ProcessTable`] records which.
//! - **Mechanism, not policy**: Ready-queue ordering is a [`SchedulingPolicy`]
//!   variant; the dispatcher does not know which one it runs.
//! - **Explicit context**: All state lives in a [`Kernel`] shared by `Arc`,
//!   never in globals.
//!
//! ## Threads
//!
//! - **LTS** waits on pending admissions and free slots, resumes suspended
//!   processes ahead of new ones, and requests page tables from Memory.
//! - **STS** waits for Ready work, sends it to the CPU and routes it back.
//! - **I/O device** serves Blocked processes and suspends long bursts.

mod admission;
pub mod clients;
mod dispatcher;
pub mod error;
mod io;
pub mod kernel;
pub mod policy;
pub mod state;
pub mod sync;
pub mod test_utils;

pub use clients::{CpuClient, InterruptClient, MemoryClient};
pub use error::KernelError;
pub use kernel::{Kernel, KernelLinks, KernelSettings, KernelSnapshot, SuspendedProcess};
pub use policy::{next_estimate, ReadyPolicy, SchedulingPolicy};
pub use state::{ProcessLocation, ProcessTable};
pub use sync::{Closed, SafeQueue, Semaphore};
