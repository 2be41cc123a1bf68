//! Length-prefixed frames
//!
//! Layout: `opcode: u32 LE | length: u32 LE | payload[length]`.

use crate::error::WireError;
use crate::opcode::Opcode;
use std::io::{self, Read, Write};

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 8;

/// Largest payload a peer may announce
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// A single message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Creates a frame with no payload
    pub fn empty(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// Encodes header and payload into one buffer
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(WireError::MalformedPayload(format!(
                "payload of {} bytes exceeds limit",
                self.payload.len()
            )));
        }
        let mut buffer = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buffer.extend_from_slice(&self.opcode.as_u32().to_le_bytes());
        buffer.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&self.payload);
        Ok(buffer)
    }

    /// Writes the frame in a single call
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), WireError> {
        let buffer = self.encode()?;
        writer.write_all(&buffer).map_err(map_io)?;
        writer.flush().map_err(map_io)?;
        Ok(())
    }

    /// Reads one frame, blocking until it is complete
    ///
    /// A clean end of stream before the header maps to
    /// [`WireError::Disconnected`].
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Frame, WireError> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).map_err(map_io)?;

        let raw_opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(WireError::MalformedPayload(format!(
                "announced length {} exceeds limit",
                length
            )));
        }

        // The payload is consumed even for an unknown opcode so the next
        // header starts at the right offset.
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).map_err(map_io)?;
        let opcode = Opcode::try_from(raw_opcode)?;
        Ok(Frame { opcode, payload })
    }
}

fn map_io(err: io::Error) -> WireError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => WireError::Disconnected,
        _ => WireError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_layout() {
        let frame = Frame::new(Opcode::Read, vec![0xAA, 0xBB]);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes, vec![8, 0, 0, 0, 2, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_read_back_frames_in_order() {
        let mut buffer = Vec::new();
        Frame::new(Opcode::MemoryInit, vec![1, 2, 3])
            .write_to(&mut buffer)
            .unwrap();
        Frame::empty(Opcode::PageSize).write_to(&mut buffer).unwrap();

        let mut cursor = Cursor::new(buffer);
        let first = Frame::read_from(&mut cursor).unwrap();
        let second = Frame::read_from(&mut cursor).unwrap();
        assert_eq!(first.opcode, Opcode::MemoryInit);
        assert_eq!(first.payload, vec![1, 2, 3]);
        assert_eq!(second, Frame::empty(Opcode::PageSize));
        assert!(matches!(
            Frame::read_from(&mut cursor),
            Err(WireError::Disconnected)
        ));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut cursor = Cursor::new(vec![99, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            Frame::read_from(&mut cursor),
            Err(WireError::UnknownOpcode(99))
        ));
    }

    #[test]
    fn test_unknown_opcode_payload_is_skipped() {
        let mut bytes = vec![42, 0, 0, 0, 3, 0, 0, 0, 7, 7, 7];
        Frame::new(Opcode::Read, vec![1, 0, 0, 0])
            .write_to(&mut bytes)
            .unwrap();

        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Frame::read_from(&mut cursor),
            Err(WireError::UnknownOpcode(42))
        ));
        let next = Frame::read_from(&mut cursor).unwrap();
        assert_eq!(next.opcode, Opcode::Read);
        assert_eq!(next.payload, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut bytes = Opcode::Pcb.as_u32().to_le_bytes().to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Frame::read_from(&mut cursor),
            Err(WireError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_truncated_payload_is_disconnect() {
        let mut bytes = Opcode::Read.as_u32().to_le_bytes().to_vec();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.push(1);
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Frame::read_from(&mut cursor),
            Err(WireError::Disconnected)
        ));
    }
}
