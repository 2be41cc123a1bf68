//! Payload codecs
//!
//! Fixed-size bodies are packed little-endian `u32`s. Replies carry a
//! presence tag so that a zero value is never confused with a failure.

use crate::error::WireError;
use core_types::ProcessControlBlock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag byte of a successful reply
pub const REPLY_OK: u8 = 0x01;

/// Tag byte of a failed reply
pub const REPLY_ERR: u8 = 0x00;

/// Two packed 32-bit operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    pub first: u32,
    pub second: u32,
}

impl Operands {
    pub const LEN: usize = 8;

    pub fn new(first: u32, second: u32) -> Self {
        Self { first, second }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN);
        bytes.extend_from_slice(&self.first.to_le_bytes());
        bytes.extend_from_slice(&self.second.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.is_empty() {
            return Err(WireError::EmptyPayload);
        }
        if bytes.len() != Self::LEN {
            return Err(WireError::MalformedPayload(format!(
                "operands need {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            first: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            second: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Encodes a single 32-bit value
pub fn encode_value(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decodes a single 32-bit value
pub fn decode_value(bytes: &[u8]) -> Result<u32, WireError> {
    match bytes.len() {
        0 => Err(WireError::EmptyPayload),
        4 => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        other => Err(WireError::MalformedPayload(format!(
            "value needs 4 bytes, got {}",
            other
        ))),
    }
}

/// Encodes a PCB as a request or reply body
pub fn encode_pcb(pcb: &ProcessControlBlock) -> Result<Vec<u8>, WireError> {
    Ok(pcb.to_stream()?)
}

/// Decodes a PCB body
pub fn decode_pcb(bytes: &[u8]) -> Result<ProcessControlBlock, WireError> {
    if bytes.is_empty() {
        return Err(WireError::EmptyPayload);
    }
    Ok(ProcessControlBlock::from_stream(bytes)?)
}

/// Failure classes reported by a remote unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// The physical address maps to no Level-2 entry
    FrameNotFound,
    /// The owner is at its frame quota and no victim policy exists
    ReplacementUnsupported,
    /// No free physical frame is left
    OutOfFrames,
    /// A table index is beyond the table length
    IndexOutOfBounds,
    /// A table id is unknown
    TableNotFound,
    /// A value access crosses a frame boundary or leaves physical memory
    AddressOutOfRange,
    /// Swap file could not be created, mapped or read
    SwapFailed,
    /// No record exists for the pid
    ProcessNotFound,
    /// The opcode or body is not valid for this endpoint
    InvalidRequest,
    /// Anything else
    Internal,
}

/// Serializable error carried on the failure side of a reply
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidRequest, message)
    }
}

impl From<WireError> for RemoteError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Remote(remote) => remote,
            other => RemoteError::invalid_request(other.to_string()),
        }
    }
}

/// Result returned by a request handler
pub type Reply = Result<Vec<u8>, RemoteError>;

/// Encodes a reply body with its presence tag
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    match reply {
        Ok(body) => {
            let mut bytes = Vec::with_capacity(body.len() + 1);
            bytes.push(REPLY_OK);
            bytes.extend_from_slice(body);
            bytes
        }
        Err(error) => {
            let mut bytes = vec![REPLY_ERR];
            match serde_json::to_vec(error) {
                Ok(encoded) => bytes.extend_from_slice(&encoded),
                Err(_) => bytes.extend_from_slice(
                    br#"{"kind":"Internal","message":"unencodable error"}"#,
                ),
            }
            bytes
        }
    }
}

/// Decodes a tagged reply into its body or the remote error
pub fn decode_reply(bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    let (tag, body) = bytes.split_first().ok_or(WireError::EmptyPayload)?;
    match *tag {
        REPLY_OK => Ok(body.to_vec()),
        REPLY_ERR => {
            let error: RemoteError = serde_json::from_slice(body)
                .map_err(|err| WireError::MalformedPayload(err.to_string()))?;
            Err(WireError::Remote(error))
        }
        other => Err(WireError::MalformedPayload(format!(
            "unknown reply tag {:#04x}",
            other
        ))),
    }
}
