//! # Simulated CPU
//!
//! This crate implements the CPU unit: a fetch, decode and execute engine
//! with a two-level MMU that resolves every address through Memory.
//!
//! ## Philosophy
//!
//! - **One slice at a time**: The engine owns a PCB only between receiving
//!   it and returning it.
//! - **Interrupts at cycle boundaries**: An interrupt is honored at the top
//!   of the next cycle; in-flight Memory requests complete.
//! - **Faults end the slice**: A segmentation fault or a failed Memory
//!   request terminates the process instead of the unit.

pub mod engine;
pub mod error;
pub mod memory;
pub mod mmu;
pub mod tlb;
pub mod unit;

pub use engine::{CpuSettings, Engine};
pub use error::CpuError;
pub use memory::MemoryClient;
pub use mmu::Mmu;
pub use tlb::{Tlb, TlbEntry};
pub use unit::{CpuUnit, DispatchHandler, InterruptHandler};
