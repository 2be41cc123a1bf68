//! # Inter-Process Communication (IPC)
//!
//! This crate defines the binary protocol spoken between the Kernel, CPU and
//! Memory units.
//!
//! ## Philosophy
//!
//! - **Frames, not streams**: Every message is an opcode-tagged, length-prefixed frame
//! - **One request, one reply**: Callers never wait on a reply that will not come
//! - **No sentinels**: Replies carry an explicit presence tag, so zero is a value
//!
//! ## Architecture
//!
//! A frame contains:
//! - The [`Opcode`] naming the operation
//! - A payload length
//! - The raw payload (PCB stream, packed operands, a single value, or nothing)
//!
//! Reply payloads start with [`REPLY_OK`] followed by the body, or
//! [`REPLY_ERR`] followed by a serialized [`RemoteError`].

pub mod error;
pub mod frame;
pub mod opcode;
pub mod payload;
pub mod server;
pub mod transport;

pub use error::WireError;
pub use frame::{Frame, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use opcode::Opcode;
pub use payload::{
    decode_pcb, decode_reply, decode_value, encode_pcb, encode_reply, encode_value, Operands,
    RemoteError, RemoteErrorKind, Reply, REPLY_ERR, REPLY_OK,
};
pub use server::{serve_connection, RequestHandler, Server};
pub use transport::{call, disconnect, AbortHandle, ChannelTransport, TcpTransport, Transport};
