//! Transports carrying frames between units
//!
//! [`TcpTransport`] is what the daemons use. [`ChannelTransport`] is an
//! in-process pair with the same blocking semantics, used to wire units
//! together without sockets.

use crate::error::WireError;
use crate::frame::Frame;
use crate::opcode::Opcode;
use crate::payload::decode_reply;
use log::{debug, warn};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often a channel receiver checks whether it was aborted
const ABORT_POLL: Duration = Duration::from_millis(20);

/// Bidirectional, blocking frame transport
pub trait Transport: Send {
    /// Sends one frame
    fn send(&mut self, frame: Frame) -> Result<(), WireError>;

    /// Blocks until one frame arrives
    fn receive(&mut self) -> Result<Frame, WireError>;

    /// Sends a frame and waits for the next one
    fn request(&mut self, frame: Frame) -> Result<Frame, WireError> {
        self.send(frame)?;
        self.receive()
    }

    /// Handle that fails a blocked `receive` from another thread
    fn abort_handle(&self) -> Option<AbortHandle> {
        None
    }
}

/// Unblocks a transport whose owner is waiting for a frame
///
/// After [`abort`](AbortHandle::abort) every pending and later `receive`
/// fails with [`WireError::Disconnected`] or an I/O error.
#[derive(Debug)]
pub enum AbortHandle {
    Tcp(TcpStream),
    Channel(Arc<AtomicBool>),
}

impl AbortHandle {
    pub fn abort(&self) {
        match self {
            AbortHandle::Tcp(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            AbortHandle::Channel(aborted) => aborted.store(true, Ordering::SeqCst),
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: Frame) -> Result<(), WireError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<Frame, WireError> {
        (**self).receive()
    }
}

/// Issues a request and decodes its tagged reply
///
/// The reply must carry `opcode.reply_opcode()`; anything else is a
/// protocol failure.
pub fn call<T: Transport + ?Sized>(
    transport: &mut T,
    opcode: Opcode,
    body: Vec<u8>,
) -> Result<Vec<u8>, WireError> {
    let reply = transport.request(Frame::new(opcode, body))?;
    let expected = opcode.reply_opcode();
    if reply.opcode != expected {
        return Err(WireError::UnexpectedOpcode {
            expected,
            actual: reply.opcode,
        });
    }
    decode_reply(&reply.payload)
}

/// Tells the peer this link is closing
pub fn disconnect<T: Transport + ?Sized>(transport: &mut T) -> Result<(), WireError> {
    transport.send(Frame::empty(Opcode::Disconnect))
}

/// Frames over a TCP stream
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wraps an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self, WireError> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connects once
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, WireError> {
        Self::from_stream(TcpStream::connect(addr)?)
    }

    /// Connects, retrying with a fixed backoff
    ///
    /// `max_attempts` of zero retries forever.
    pub fn connect_with_retry(
        addr: &str,
        backoff: Duration,
        max_attempts: u32,
    ) -> Result<Self, WireError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Self::connect(addr) {
                Ok(transport) => {
                    debug!("[Server] Connected to {} after {} attempt(s)", addr, attempt);
                    return Ok(transport);
                }
                Err(err) if max_attempts == 0 || attempt < max_attempts => {
                    warn!(
                        "[Server] Connection to {} failed ({}), retrying in {:?}",
                        addr, err, backoff
                    );
                    thread::sleep(backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, WireError> {
        Ok(self.stream.peer_addr()?)
    }

    /// Returns a second handle on the same socket
    pub fn try_clone_stream(&self) -> Result<TcpStream, WireError> {
        Ok(self.stream.try_clone()?)
    }

    /// Closes both directions, waking any blocked reader
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: Frame) -> Result<(), WireError> {
        frame.write_to(&mut self.stream)
    }

    fn receive(&mut self) -> Result<Frame, WireError> {
        Frame::read_from(&mut self.stream)
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        self.stream.try_clone().ok().map(AbortHandle::Tcp)
    }
}

/// One end of an in-process transport pair
pub struct ChannelTransport {
    outgoing: Sender<Frame>,
    incoming: Receiver<Frame>,
    aborted: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Creates two connected ends
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (left_tx, right_rx) = mpsc::channel();
        let (right_tx, left_rx) = mpsc::channel();
        (
            ChannelTransport {
                outgoing: left_tx,
                incoming: left_rx,
                aborted: Arc::new(AtomicBool::new(false)),
            },
            ChannelTransport {
                outgoing: right_tx,
                incoming: right_rx,
                aborted: Arc::new(AtomicBool::new(false)),
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: Frame) -> Result<(), WireError> {
        self.outgoing
            .send(frame)
            .map_err(|_| WireError::Disconnected)
    }

    fn receive(&mut self) -> Result<Frame, WireError> {
        loop {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(WireError::Disconnected);
            }
            match self.incoming.recv_timeout(ABORT_POLL) {
                Ok(frame) => return Ok(frame),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(WireError::Disconnected),
            }
        }
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        Some(AbortHandle::Channel(Arc::clone(&self.aborted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{encode_reply, encode_value, RemoteError, RemoteErrorKind};
    use std::net::TcpListener;

    #[test]
    fn test_channel_pair_is_bidirectional() {
        let (mut left, mut right) = ChannelTransport::pair();
        left.send(Frame::empty(Opcode::PageSize)).unwrap();
        assert_eq!(right.receive().unwrap().opcode, Opcode::PageSize);
        right.send(Frame::empty(Opcode::Interrupt)).unwrap();
        assert_eq!(left.receive().unwrap().opcode, Opcode::Interrupt);
    }

    #[test]
    fn test_dropped_peer_is_disconnect() {
        let (mut left, right) = ChannelTransport::pair();
        drop(right);
        assert!(matches!(
            left.send(Frame::empty(Opcode::Pcb)),
            Err(WireError::Disconnected)
        ));
        assert!(matches!(left.receive(), Err(WireError::Disconnected)));
    }

    #[test]
    fn test_abort_wakes_blocked_channel_receiver() {
        let (mut left, _right) = ChannelTransport::pair();
        let handle = left.abort_handle().unwrap();
        let reader = thread::spawn(move || left.receive());
        thread::sleep(Duration::from_millis(50));
        handle.abort();
        assert!(matches!(reader.join().unwrap(), Err(WireError::Disconnected)));
    }

    #[test]
    fn test_abort_wakes_blocked_tcp_receiver() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpTransport::connect(listener.local_addr().unwrap()).unwrap();
        let (_peer, _) = listener.accept().unwrap();
        let handle = client.abort_handle().unwrap();
        let reader = thread::spawn(move || client.receive());
        thread::sleep(Duration::from_millis(50));
        handle.abort();
        assert!(reader.join().unwrap().is_err());
    }

    #[test]
    fn test_call_decodes_reply() {
        let (mut client, mut server) = ChannelTransport::pair();
        let handle = thread::spawn(move || {
            let request = server.receive().unwrap();
            assert_eq!(request.opcode, Opcode::Write);
            server
                .send(Frame::new(
                    Opcode::WriteResult,
                    encode_reply(&Ok(encode_value(42))),
                ))
                .unwrap();
        });
        let body = call(&mut client, Opcode::Write, Vec::new()).unwrap();
        assert_eq!(body, encode_value(42));
        handle.join().unwrap();
    }

    #[test]
    fn test_call_rejects_wrong_reply_opcode() {
        let (mut client, mut server) = ChannelTransport::pair();
        server
            .send(Frame::new(Opcode::Read, encode_reply(&Ok(Vec::new()))))
            .unwrap();
        assert!(matches!(
            call(&mut client, Opcode::Frame, Vec::new()),
            Err(WireError::UnexpectedOpcode {
                expected: Opcode::Frame,
                actual: Opcode::Read
            })
        ));
    }

    #[test]
    fn test_call_surfaces_remote_error() {
        let (mut client, mut server) = ChannelTransport::pair();
        let error = RemoteError::new(RemoteErrorKind::OutOfFrames, "no frame");
        server
            .send(Frame::new(Opcode::Frame, encode_reply(&Err(error.clone()))))
            .unwrap();
        match call(&mut client, Opcode::Frame, Vec::new()) {
            Err(WireError::Remote(remote)) => assert_eq!(remote, error),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tcp_transport_exchanges_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut server = TcpTransport::from_stream(stream).unwrap();
            let frame = server.receive().unwrap();
            server.send(frame).unwrap();
        });

        let mut client =
            TcpTransport::connect_with_retry(&addr.to_string(), Duration::from_millis(10), 5)
                .unwrap();
        let echoed = client
            .request(Frame::new(Opcode::MemoryInit, vec![1, 2, 3, 4]))
            .unwrap();
        assert_eq!(echoed, Frame::new(Opcode::MemoryInit, vec![1, 2, 3, 4]));
        handle.join().unwrap();
    }

    #[test]
    fn test_connect_with_retry_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let result = TcpTransport::connect_with_retry(&addr, Duration::from_millis(1), 2);
        assert!(result.is_err());
    }
}
