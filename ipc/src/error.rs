//! Wire-level errors

use crate::payload::RemoteError;
use crate::opcode::Opcode;
use core_types::PcbCodecError;
use thiserror::Error;

/// Errors raised by framing, transports and reply decoding
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Peer disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty payload where data was expected")]
    EmptyPayload,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Expected {expected} reply, got {actual}")]
    UnexpectedOpcode { expected: Opcode, actual: Opcode },

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("PCB stream error: {0}")]
    Pcb(#[from] PcbCodecError),
}

impl WireError {
    /// Whether the peer is gone and the link must be re-established
    pub fn is_connectivity(&self) -> bool {
        matches!(self, WireError::Disconnected | WireError::Io(_))
    }
}
