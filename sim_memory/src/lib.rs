//! # Simulated Memory
//!
//! This crate implements the Memory unit: physical frames, two-level page
//! tables and the swap files of suspended processes.
//!
//! ## Philosophy
//!
//! - **Single source of truth**: Every address mapping lives in [`Paging`],
//!   behind one lock, so concurrent faults are serialized.
//! - **Explicit failures**: A missing frame or an exhausted quota is an
//!   error reply, never a dropped request.
//! - **No invented policy**: There is no victim selection; a full quota
//!   reports [`MemoryError::ReplacementUnsupported`].
//!
//! ## Endpoints
//!
//! The Kernel uses MEMORY_INIT, SWAP_PCB, RETRIEVE_SWAPPED_PCB and
//! PROCESS_TERMINATED. The CPU uses PAGE_SIZE, ENTRIES_PER_TABLE,
//! SECOND_LEVEL_PAGE, FRAME, READ, WRITE and OPERANDS.

pub mod controller;
pub mod error;
pub mod paging;
pub mod swap;

pub use controller::MemoryController;
pub use error::{MemoryError, MemoryUnitError, SwapError};
pub use paging::{PageEntry, Paging, WORD_SIZE};
pub use swap::SwapManager;

use ipc::Server;
use sim_config::MemoryConfig;
use std::sync::Arc;

/// Builds the Memory unit from `config` and starts listening
pub fn start(config: &MemoryConfig) -> Result<(Arc<MemoryController>, Server), MemoryUnitError> {
    let controller = Arc::new(MemoryController::from_config(config)?);
    let server = Server::bind("memory", &config.listen_addr, Arc::clone(&controller))?;
    Ok((controller, server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipc::{call, decode_value, encode_value, Opcode, Operands, TcpTransport};
    use tempfile::TempDir;

    #[test]
    fn test_memory_unit_over_tcp() {
        let dir = TempDir::new().unwrap();
        let config = MemoryConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            swap_dir: dir.path().to_path_buf(),
            ..MemoryConfig::default()
        };
        let (_controller, mut server) = start(&config).unwrap();

        let mut link = TcpTransport::connect(server.local_addr()).unwrap();
        let page_size = call(&mut link, Opcode::PageSize, Vec::new()).unwrap();
        assert_eq!(decode_value(&page_size).unwrap(), 64);

        let table = call(&mut link, Opcode::MemoryInit, Operands::new(7, 256).encode()).unwrap();
        assert_eq!(decode_value(&table).unwrap(), 0);

        let err = call(&mut link, Opcode::Read, encode_value(4000)).unwrap_err();
        assert!(matches!(err, ipc::WireError::Remote(_)));

        ipc::disconnect(&mut link).unwrap();
        server.stop();
    }
}
